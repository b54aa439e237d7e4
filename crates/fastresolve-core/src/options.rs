//! Resolver options.
//!
//! [`UserResolveOptions`] is the loose, partially-specified form read from
//! config files or built in code. [`create_options`] validates it and fills
//! in defaults, producing the canonical [`ResolveOptions`] the pipeline is
//! wired from.

use crate::fs::{FileSystem, OsFileSystem, SyncAsyncFileSystem, SyncFileSystem};
use crate::resolver::cache::UnsafeCache;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::ResolverPlugin;
use crate::resolver::plugins::pnp::PnpApi;
use crate::resolver::request::ResolveRequest;
use fastresolve_util::path::{get_type, PathType};
use indexmap::{IndexMap, IndexSet};
use regex_lite::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Decides whether a request may use the unsafe cache.
pub type CachePredicate = Arc<dyn Fn(&ResolveRequest) -> bool + Send + Sync>;

/// A field name, or a path into nested objects.
pub type FieldPath = Vec<String>;

/// An alias target as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AliasValue {
    Path(String),
    Paths(Vec<String>),
    /// `false` ignores the request. `true` is rejected.
    Flag(bool),
}

/// An alias entry in list form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasOptionEntry {
    pub name: String,
    pub alias: AliasValue,
    #[serde(default, rename = "onlyModule")]
    pub only_module: bool,
}

/// Aliases as a name-to-target map or as an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AliasOptions {
    Map(IndexMap<String, AliasValue>),
    List(Vec<AliasOptionEntry>),
}

/// A field given by name or as a nested path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Name(String),
    Path(Vec<String>),
}

impl FieldSpec {
    fn into_path(self) -> FieldPath {
        match self {
            Self::Name(name) => vec![name],
            Self::Path(path) => path,
        }
    }
}

/// A main field, optionally controlling whether its value is forced to be
/// relative.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MainFieldOption {
    Field(FieldSpec),
    Spec {
        name: FieldSpec,
        #[serde(rename = "forceRelative")]
        force_relative: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ModulesOption {
    One(String),
    Many(Vec<String>),
}

/// A restriction: a directory prefix or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RestrictionOption {
    Path(String),
    Pattern { regex: String },
}

/// Partially specified resolver options.
///
/// Every field is optional; unset fields take defaults in
/// [`create_options`]. Fields that hold runtime objects (file systems,
/// plugins, predicates) can only be set in code.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserResolveOptions {
    pub alias: Option<AliasOptions>,
    pub fallback: Option<AliasOptions>,
    pub alias_fields: Option<Vec<FieldSpec>>,
    #[serde(skip)]
    pub cache_predicate: Option<CachePredicate>,
    pub cache_with_context: Option<bool>,
    pub condition_names: Option<Vec<String>>,
    pub description_files: Option<Vec<String>>,
    pub enforce_extension: Option<bool>,
    pub exports_fields: Option<Vec<FieldSpec>>,
    pub imports_fields: Option<Vec<FieldSpec>>,
    pub extensions: Option<Vec<String>>,
    #[serde(skip)]
    pub file_system: Option<Arc<dyn FileSystem>>,
    #[serde(skip)]
    pub sync_file_system: Option<Arc<dyn SyncFileSystem>>,
    /// Enable the unsafe cache with a fresh store.
    pub unsafe_cache: Option<bool>,
    /// Use this store for the unsafe cache. Takes precedence over `unsafe_cache`.
    #[serde(skip)]
    pub unsafe_cache_store: Option<Arc<UnsafeCache>>,
    pub symlinks: Option<bool>,
    pub modules: Option<ModulesOption>,
    pub main_fields: Option<Vec<MainFieldOption>>,
    pub main_files: Option<Vec<String>>,
    #[serde(skip)]
    pub plugins: Option<Vec<Arc<dyn ResolverPlugin>>>,
    #[serde(skip)]
    pub pnp_api: Option<Arc<dyn PnpApi>>,
    pub roots: Option<Vec<PathBuf>>,
    pub fully_specified: Option<bool>,
    pub resolve_to_context: Option<bool>,
    pub restrictions: Option<Vec<RestrictionOption>>,
    pub use_sync_file_system_calls: Option<bool>,
    pub prefer_relative: Option<bool>,
    pub prefer_absolute: Option<bool>,
}

impl fmt::Debug for UserResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserResolveOptions")
            .field("alias", &self.alias)
            .field("fallback", &self.fallback)
            .field("extensions", &self.extensions)
            .field("modules", &self.modules)
            .field("main_fields", &self.main_fields)
            .field("condition_names", &self.condition_names)
            .field("fully_specified", &self.fully_specified)
            .field("unsafe_cache", &self.unsafe_cache)
            .field("plugins", &self.plugins.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

macro_rules! merge_fields {
    ($base:ident, $overrides:ident, $($field:ident),* $(,)?) => {
        UserResolveOptions {
            $($field: $overrides.$field.or($base.$field),)*
        }
    };
}

impl UserResolveOptions {
    /// Overlay `overrides` on top of these options; set fields win.
    #[must_use]
    pub fn merge(self, overrides: UserResolveOptions) -> Self {
        let base = self;
        merge_fields!(
            base,
            overrides,
            alias,
            fallback,
            alias_fields,
            cache_predicate,
            cache_with_context,
            condition_names,
            description_files,
            enforce_extension,
            exports_fields,
            imports_fields,
            extensions,
            file_system,
            sync_file_system,
            unsafe_cache,
            unsafe_cache_store,
            symlinks,
            modules,
            main_fields,
            main_files,
            plugins,
            pnp_api,
            roots,
            fully_specified,
            resolve_to_context,
            restrictions,
            use_sync_file_system_calls,
            prefer_relative,
            prefer_absolute,
        )
    }

    /// Set the file system.
    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Add a plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn ResolverPlugin>) -> Self {
        self.plugins.get_or_insert_with(Vec::new).push(plugin);
        self
    }

    /// Set the unsafe cache predicate.
    #[must_use]
    pub fn with_cache_predicate(
        mut self,
        predicate: impl Fn(&ResolveRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.cache_predicate = Some(Arc::new(predicate));
        self
    }
}

/// What an alias maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// Resolve to the ignored marker.
    Ignore,
    /// Try each replacement in order.
    Requests(Vec<String>),
}

/// A normalized alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub name: String,
    /// Match the name exactly, never as a path prefix.
    pub only_module: bool,
    pub target: AliasTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainField {
    pub name: FieldPath,
    pub force_relative: bool,
}

/// A group of module directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulesEntry {
    /// Directory names searched in every ancestor of the context.
    Hierarchical(Vec<String>),
    /// An absolute directory searched directly.
    Root(PathBuf),
}

#[derive(Debug, Clone)]
pub enum Restriction {
    /// The resolved path must lie inside this directory.
    Path(PathBuf),
    /// The resolved path must match this expression.
    Pattern(Regex),
}

/// Validated resolver options with defaults applied.
#[derive(Clone)]
pub struct ResolveOptions {
    pub alias: Vec<AliasEntry>,
    pub fallback: Vec<AliasEntry>,
    pub alias_fields: Vec<FieldPath>,
    pub cache_predicate: CachePredicate,
    pub cache_with_context: bool,
    pub condition_names: IndexSet<String>,
    pub description_files: Vec<String>,
    pub enforce_extension: bool,
    pub exports_fields: Vec<FieldPath>,
    pub imports_fields: Vec<FieldPath>,
    pub extensions: IndexSet<String>,
    pub file_system: Arc<dyn FileSystem>,
    pub unsafe_cache: Option<Arc<UnsafeCache>>,
    pub symlinks: bool,
    pub modules: Vec<ModulesEntry>,
    pub main_fields: Vec<MainField>,
    pub main_files: IndexSet<String>,
    pub plugins: Vec<Arc<dyn ResolverPlugin>>,
    pub pnp_api: Option<Arc<dyn PnpApi>>,
    pub roots: IndexSet<PathBuf>,
    pub fully_specified: bool,
    pub resolve_to_context: bool,
    pub restrictions: Vec<Restriction>,
    pub prefer_relative: bool,
    pub prefer_absolute: bool,
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("alias", &self.alias)
            .field("fallback", &self.fallback)
            .field("alias_fields", &self.alias_fields)
            .field("cache_with_context", &self.cache_with_context)
            .field("condition_names", &self.condition_names)
            .field("description_files", &self.description_files)
            .field("enforce_extension", &self.enforce_extension)
            .field("exports_fields", &self.exports_fields)
            .field("imports_fields", &self.imports_fields)
            .field("extensions", &self.extensions)
            .field("file_system", &self.file_system)
            .field("unsafe_cache", &self.unsafe_cache.is_some())
            .field("symlinks", &self.symlinks)
            .field("modules", &self.modules)
            .field("main_fields", &self.main_fields)
            .field("main_files", &self.main_files)
            .field("plugins", &self.plugins.len())
            .field("pnp_api", &self.pnp_api.is_some())
            .field("roots", &self.roots)
            .field("fully_specified", &self.fully_specified)
            .field("resolve_to_context", &self.resolve_to_context)
            .field("restrictions", &self.restrictions)
            .field("prefer_relative", &self.prefer_relative)
            .field("prefer_absolute", &self.prefer_absolute)
            .finish()
    }
}

/// Validate user options and apply defaults.
///
/// # Errors
/// Returns `InvalidConfig` for an alias set to `true`, an invalid
/// restriction pattern, or sync calls requested without a sync file system.
pub fn create_options(user: UserResolveOptions) -> Result<ResolveOptions, ResolveError> {
    let file_system: Arc<dyn FileSystem> = if user.use_sync_file_system_calls.unwrap_or(false) {
        let Some(sync) = user.sync_file_system else {
            return Err(ResolveError::InvalidConfig(
                "useSyncFileSystemCalls requires a sync file system".to_string(),
            ));
        };
        Arc::new(SyncAsyncFileSystem::new(sync))
    } else {
        user.file_system.unwrap_or_else(|| Arc::new(OsFileSystem))
    };

    let extensions: IndexSet<String> = user
        .extensions
        .unwrap_or_else(|| strings(&[".js", ".json", ".node"]))
        .into_iter()
        .collect();
    let enforce_extension = user
        .enforce_extension
        .unwrap_or_else(|| extensions.contains(""));

    let unsafe_cache = match (user.unsafe_cache_store, user.unsafe_cache) {
        (Some(store), _) => Some(store),
        (None, Some(true)) => Some(Arc::new(UnsafeCache::new())),
        _ => None,
    };

    Ok(ResolveOptions {
        alias: normalize_alias(user.alias)?,
        fallback: normalize_alias(user.fallback)?,
        alias_fields: field_paths(user.alias_fields, &[]),
        cache_predicate: user
            .cache_predicate
            .unwrap_or_else(|| Arc::new(|_: &ResolveRequest| true)),
        cache_with_context: user.cache_with_context.unwrap_or(true),
        condition_names: user.condition_names.unwrap_or_default().into_iter().collect(),
        description_files: user
            .description_files
            .unwrap_or_else(|| strings(&["package.json"])),
        enforce_extension,
        exports_fields: field_paths(user.exports_fields, &["exports"]),
        imports_fields: field_paths(user.imports_fields, &["imports"]),
        extensions,
        file_system,
        unsafe_cache,
        symlinks: user.symlinks.unwrap_or(true),
        modules: normalize_modules(user.modules),
        main_fields: normalize_main_fields(user.main_fields),
        main_files: user
            .main_files
            .unwrap_or_else(|| strings(&["index"]))
            .into_iter()
            .collect(),
        plugins: user.plugins.unwrap_or_default(),
        pnp_api: user.pnp_api,
        roots: user.roots.unwrap_or_default().into_iter().collect(),
        fully_specified: user.fully_specified.unwrap_or(false),
        resolve_to_context: user.resolve_to_context.unwrap_or(false),
        restrictions: normalize_restrictions(user.restrictions)?,
        prefer_relative: user.prefer_relative.unwrap_or(false),
        prefer_absolute: user.prefer_absolute.unwrap_or(false),
    })
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn field_paths(fields: Option<Vec<FieldSpec>>, default: &[&str]) -> Vec<FieldPath> {
    match fields {
        Some(fields) => fields.into_iter().map(FieldSpec::into_path).collect(),
        None => default.iter().map(|name| vec![(*name).to_string()]).collect(),
    }
}

fn normalize_alias(alias: Option<AliasOptions>) -> Result<Vec<AliasEntry>, ResolveError> {
    let entries: Vec<(String, AliasValue, bool)> = match alias {
        None => return Ok(Vec::new()),
        Some(AliasOptions::List(list)) => list
            .into_iter()
            .map(|entry| (entry.name, entry.alias, entry.only_module))
            .collect(),
        Some(AliasOptions::Map(map)) => map
            .into_iter()
            .map(|(key, value)| match key.strip_suffix('$') {
                Some(name) => (name.to_string(), value, true),
                None => (key, value, false),
            })
            .collect(),
    };

    entries
        .into_iter()
        .map(|(name, value, only_module)| {
            let target = match value {
                AliasValue::Flag(false) => AliasTarget::Ignore,
                AliasValue::Flag(true) => {
                    return Err(ResolveError::InvalidConfig(format!(
                        "alias '{name}' cannot be set to true"
                    )));
                }
                AliasValue::Path(path) => AliasTarget::Requests(vec![path]),
                AliasValue::Paths(paths) => AliasTarget::Requests(paths),
            };
            Ok(AliasEntry {
                name,
                only_module,
                target,
            })
        })
        .collect()
}

fn normalize_main_fields(fields: Option<Vec<MainFieldOption>>) -> Vec<MainField> {
    let Some(fields) = fields else {
        return vec![MainField {
            name: vec!["main".to_string()],
            force_relative: true,
        }];
    };

    let mut seen = IndexSet::new();
    fields
        .into_iter()
        .map(|field| match field {
            MainFieldOption::Field(name) => MainField {
                name: name.into_path(),
                force_relative: true,
            },
            MainFieldOption::Spec {
                name,
                force_relative,
            } => MainField {
                name: name.into_path(),
                force_relative,
            },
        })
        .filter(|field| seen.insert(field.name.clone()))
        .collect()
}

/// Deduplicate, then group consecutive relative or bare names into one
/// hierarchical entry. Absolute paths stand alone.
fn normalize_modules(modules: Option<ModulesOption>) -> Vec<ModulesEntry> {
    let list = match modules {
        None => strings(&["node_modules"]),
        Some(ModulesOption::One(one)) => vec![one],
        Some(ModulesOption::Many(many)) => many,
    };

    let mut seen = IndexSet::new();
    let mut entries: Vec<ModulesEntry> = Vec::new();
    for item in list {
        if !seen.insert(item.clone()) {
            continue;
        }
        match get_type(&item) {
            PathType::Normal | PathType::Relative => {
                if let Some(ModulesEntry::Hierarchical(group)) = entries.last_mut() {
                    group.push(item);
                } else {
                    entries.push(ModulesEntry::Hierarchical(vec![item]));
                }
            }
            _ => entries.push(ModulesEntry::Root(PathBuf::from(item))),
        }
    }
    entries
}

fn normalize_restrictions(
    restrictions: Option<Vec<RestrictionOption>>,
) -> Result<Vec<Restriction>, ResolveError> {
    restrictions
        .unwrap_or_default()
        .into_iter()
        .map(|restriction| match restriction {
            RestrictionOption::Path(path) if get_type(&path).is_absolute() => {
                Ok(Restriction::Path(PathBuf::from(path)))
            }
            RestrictionOption::Path(path) => Err(ResolveError::InvalidConfig(format!(
                "restriction '{path}' must be an absolute path"
            ))),
            RestrictionOption::Pattern { regex } => Regex::new(&regex)
                .map(Restriction::Pattern)
                .map_err(|e| {
                    ResolveError::InvalidConfig(format!("invalid restriction '{regex}': {e}"))
                }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> UserResolveOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = create_options(UserResolveOptions::default()).unwrap();
        assert_eq!(
            options.extensions.iter().collect::<Vec<_>>(),
            vec![".js", ".json", ".node"]
        );
        assert!(!options.enforce_extension);
        assert_eq!(options.description_files, vec!["package.json"]);
        assert_eq!(
            options.main_fields,
            vec![MainField {
                name: vec!["main".into()],
                force_relative: true
            }]
        );
        assert_eq!(options.main_files.iter().collect::<Vec<_>>(), vec!["index"]);
        assert_eq!(
            options.modules,
            vec![ModulesEntry::Hierarchical(vec!["node_modules".into()])]
        );
        assert_eq!(options.exports_fields, vec![vec!["exports".to_string()]]);
        assert_eq!(options.imports_fields, vec![vec!["imports".to_string()]]);
        assert!(options.alias_fields.is_empty());
        assert!(options.symlinks);
        assert!(options.cache_with_context);
        assert!(options.unsafe_cache.is_none());
        assert!(options.condition_names.is_empty());
    }

    #[test]
    fn test_alias_map_only_module_suffix() {
        let user = parse(json!({
            "alias": { "foo$": "./exact.js", "bar": ["./a", "./b"], "ignored": false }
        }));
        let options = create_options(user).unwrap();
        assert_eq!(
            options.alias,
            vec![
                AliasEntry {
                    name: "foo".into(),
                    only_module: true,
                    target: AliasTarget::Requests(vec!["./exact.js".into()]),
                },
                AliasEntry {
                    name: "bar".into(),
                    only_module: false,
                    target: AliasTarget::Requests(vec!["./a".into(), "./b".into()]),
                },
                AliasEntry {
                    name: "ignored".into(),
                    only_module: false,
                    target: AliasTarget::Ignore,
                },
            ]
        );
    }

    #[test]
    fn test_alias_list_form() {
        let user = parse(json!({
            "fallback": [{ "name": "x", "alias": "./y", "onlyModule": true }]
        }));
        let options = create_options(user).unwrap();
        assert_eq!(options.fallback.len(), 1);
        assert!(options.fallback[0].only_module);
    }

    #[test]
    fn test_alias_true_is_invalid() {
        let user = parse(json!({ "alias": { "x": true } }));
        let err = create_options(user).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConfig(_)));
    }

    #[test]
    fn test_modules_grouping() {
        let user = parse(json!({
            "modules": ["node_modules", "web_modules", "/abs/lib", "node_modules", "./local", "/abs/lib"]
        }));
        let options = create_options(user).unwrap();
        assert_eq!(
            options.modules,
            vec![
                ModulesEntry::Hierarchical(vec!["node_modules".into(), "web_modules".into()]),
                ModulesEntry::Root(PathBuf::from("/abs/lib")),
                ModulesEntry::Hierarchical(vec!["./local".into()]),
            ]
        );
    }

    #[test]
    fn test_enforce_extension_follows_empty_extension() {
        let user = parse(json!({ "extensions": ["", ".js"] }));
        assert!(create_options(user).unwrap().enforce_extension);

        let user = parse(json!({ "extensions": ["", ".js"], "enforceExtension": false }));
        assert!(!create_options(user).unwrap().enforce_extension);
    }

    #[test]
    fn test_extensions_dedupe_keeps_order() {
        let user = parse(json!({ "extensions": [".ts", ".js", ".ts"] }));
        let options = create_options(user).unwrap();
        assert_eq!(options.extensions.iter().collect::<Vec<_>>(), vec![".ts", ".js"]);
    }

    #[test]
    fn test_main_fields_forms() {
        let user = parse(json!({
            "mainFields": ["module", ["nested", "main"], { "name": "browser", "forceRelative": false }, "module"]
        }));
        let options = create_options(user).unwrap();
        assert_eq!(options.main_fields.len(), 3);
        assert_eq!(options.main_fields[1].name, vec!["nested", "main"]);
        assert!(options.main_fields[1].force_relative);
        assert!(!options.main_fields[2].force_relative);
    }

    #[test]
    fn test_restrictions() {
        let user = parse(json!({ "restrictions": ["/allowed", { "regex": "\\.js$" }] }));
        let options = create_options(user).unwrap();
        assert!(matches!(options.restrictions[0], Restriction::Path(_)));
        assert!(matches!(options.restrictions[1], Restriction::Pattern(_)));

        let user = parse(json!({ "restrictions": [{ "regex": "(" }] }));
        assert!(create_options(user).is_err());

        let user = parse(json!({ "restrictions": ["src"] }));
        assert!(matches!(
            create_options(user),
            Err(ResolveError::InvalidConfig(ref msg)) if msg.contains("'src'")
        ));
    }

    #[test]
    fn test_sync_calls_require_sync_fs() {
        let user = UserResolveOptions {
            use_sync_file_system_calls: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            create_options(user),
            Err(ResolveError::InvalidConfig(_))
        ));

        let user = UserResolveOptions {
            use_sync_file_system_calls: Some(true),
            sync_file_system: Some(Arc::new(OsFileSystem)),
            ..Default::default()
        };
        assert!(create_options(user).is_ok());
    }

    #[test]
    fn test_unsafe_cache_store_is_shared() {
        let store = Arc::new(UnsafeCache::new());
        let user = UserResolveOptions {
            unsafe_cache_store: Some(store.clone()),
            ..Default::default()
        };
        let options = create_options(user).unwrap();
        assert!(Arc::ptr_eq(options.unsafe_cache.as_ref().unwrap(), &store));

        let user = parse(json!({ "unsafeCache": true }));
        assert!(create_options(user).unwrap().unsafe_cache.is_some());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let base = parse(json!({ "extensions": [".js"], "symlinks": false }));
        let overrides = parse(json!({ "extensions": [".ts"] }));
        let merged = base.merge(overrides);
        assert_eq!(merged.extensions, Some(vec![".ts".to_string()]));
        assert_eq!(merged.symlinks, Some(false));
    }
}
