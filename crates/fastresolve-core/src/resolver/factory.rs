//! Assembles the default pipeline from normalized options.

use super::description_file::DescriptionFileCache;
use super::engine::Resolver;
use super::error::ResolveError;
use super::hooks::{PipelineBuilder, Stage};
use super::plugins::{
    AliasFieldPlugin, AliasPlugin, AppendPlugin, ConditionalPlugin, DescriptionFilePlugin,
    DirectoryExistsPlugin, ExportsFieldPlugin, FileExistsPlugin, ImportsFieldPlugin,
    JoinRequestPartPlugin, JoinRequestPlugin, MainFieldPlugin,
    ModulesInHierarchicalDirectoriesPlugin, ModulesInRootPlugin, NextPlugin, ParsePlugin,
    PnpPlugin, RequestFilter, RestrictionsPlugin, ResultPlugin, RootsPlugin, SelfReferencePlugin,
    SymlinkPlugin, TryNextPlugin, UnsafeCachePlugin, UseFilePlugin,
};
use crate::options::{create_options, ModulesEntry, ResolveOptions, UserResolveOptions};
use std::sync::Arc;

const NODE_MODULES: &str = "node_modules";

/// Build a resolver from user options.
///
/// # Errors
/// Returns `InvalidConfig` when the options do not normalize.
pub fn create_resolver(user: UserResolveOptions) -> Result<Resolver, ResolveError> {
    create_resolver_on(PipelineBuilder::new(), user)
}

/// Build a resolver on top of a builder that may already carry taps.
///
/// Pre-registered taps run before the built-in ones of the same order.
///
/// # Errors
/// Returns `InvalidConfig` when the options do not normalize.
pub fn create_resolver_on(
    builder: PipelineBuilder,
    user: UserResolveOptions,
) -> Result<Resolver, ResolveError> {
    build(builder, user, Arc::new(DescriptionFileCache::new()))
}

pub(crate) fn build(
    mut builder: PipelineBuilder,
    user: UserResolveOptions,
    description_files: Arc<DescriptionFileCache>,
) -> Result<Resolver, ResolveError> {
    let options = create_options(user.clone())?;

    for plugin in &options.plugins {
        plugin.apply(&mut builder);
    }
    wire(&mut builder, &options, &description_files);

    tracing::debug!(
        extensions = options.extensions.len(),
        modules = options.modules.len(),
        conditions = options.condition_names.len(),
        "resolver pipeline built"
    );
    Ok(Resolver::from_parts(
        user,
        options,
        builder.build(),
        description_files,
    ))
}

fn wire(
    builder: &mut PipelineBuilder,
    options: &ResolveOptions,
    description_files: &Arc<DescriptionFileCache>,
) {
    for stage in Stage::ALL {
        builder.ensure_hook(*stage);
    }

    let fs = &options.file_system;
    let conditions = Arc::new(options.condition_names.clone());
    let describe = |path_is_file: bool, target: Stage| {
        DescriptionFilePlugin::new(
            Arc::clone(fs),
            Arc::clone(description_files),
            options.description_files.clone(),
            path_is_file,
            target,
        )
    };

    // resolve
    for (source, fully_specified, parsed_source) in [
        (Stage::Resolve, options.fully_specified, Stage::NewResolve),
        (Stage::InternalResolve, false, Stage::NewInternalResolve),
    ] {
        if let Some(cache) = &options.unsafe_cache {
            builder.tap(
                source,
                UnsafeCachePlugin::new(
                    Arc::clone(&options.cache_predicate),
                    Arc::clone(cache),
                    options.cache_with_context,
                    parsed_source,
                ),
            );
            builder.tap(
                parsed_source,
                ParsePlugin::new(fully_specified, Stage::ParsedResolve),
            );
        } else {
            builder.tap(source, ParsePlugin::new(fully_specified, Stage::ParsedResolve));
        }
    }

    // parsed-resolve
    builder.tap(Stage::ParsedResolve, describe(false, Stage::DescribedResolve));
    builder.tap(Stage::ParsedResolve.after(), NextPlugin::new(Stage::DescribedResolve));

    // described-resolve
    builder.tap(Stage::DescribedResolve, NextPlugin::new(Stage::NormalResolve));
    if !options.fallback.is_empty() {
        builder.tap(
            Stage::DescribedResolve,
            AliasPlugin::new(options.fallback.clone(), Stage::InternalResolve),
        );
    }

    // normal-resolve
    if !options.alias.is_empty() {
        builder.tap(
            Stage::NormalResolve,
            AliasPlugin::new(options.alias.clone(), Stage::InternalResolve),
        );
    }
    for field in &options.alias_fields {
        builder.tap(
            Stage::NormalResolve,
            AliasFieldPlugin::new(field.clone(), Stage::InternalResolve),
        );
    }
    let after_normal = Stage::NormalResolve.after();
    if options.prefer_relative {
        builder.tap(after_normal, JoinRequestPlugin::new(Stage::Relative));
    }
    builder.tap(
        after_normal,
        ConditionalPlugin::new(
            RequestFilter {
                module: Some(true),
                ..RequestFilter::default()
            },
            Some("resolve as module"),
            false,
            Stage::RawModule,
        ),
    );
    builder.tap(
        after_normal,
        ConditionalPlugin::new(
            RequestFilter {
                internal: Some(true),
                ..RequestFilter::default()
            },
            Some("resolve as internal import"),
            false,
            Stage::Internal,
        ),
    );
    if options.prefer_absolute {
        builder.tap(after_normal, JoinRequestPlugin::new(Stage::Relative));
    }
    if !options.roots.is_empty() {
        builder.tap(
            after_normal,
            RootsPlugin::new(options.roots.iter().cloned().collect(), Stage::Relative),
        );
    }
    if !options.prefer_relative && !options.prefer_absolute {
        builder.tap(after_normal, JoinRequestPlugin::new(Stage::Relative));
    }

    // internal
    for field in &options.imports_fields {
        builder.tap(
            Stage::Internal,
            ImportsFieldPlugin::new(
                Arc::clone(&conditions),
                field.clone(),
                Stage::Relative,
                Stage::InternalResolve,
            ),
        );
    }

    // raw-module
    for field in &options.exports_fields {
        builder.tap(
            Stage::RawModule,
            SelfReferencePlugin::new(field.clone(), Stage::ResolveAsModule),
        );
    }
    for entry in &options.modules {
        match entry {
            ModulesEntry::Hierarchical(directories) => match &options.pnp_api {
                Some(api) if directories.iter().any(|d| d == NODE_MODULES) => {
                    let rest = directories
                        .iter()
                        .filter(|d| *d != NODE_MODULES)
                        .cloned()
                        .collect();
                    builder.tap(
                        Stage::RawModule,
                        ModulesInHierarchicalDirectoriesPlugin::new(
                            Arc::clone(fs),
                            rest,
                            Stage::Module,
                        ),
                    );
                    builder.tap(
                        Stage::RawModule,
                        PnpPlugin::new(Arc::clone(api), Stage::UndescribedResolveInPackage),
                    );
                }
                _ => builder.tap(
                    Stage::RawModule,
                    ModulesInHierarchicalDirectoriesPlugin::new(
                        Arc::clone(fs),
                        directories.clone(),
                        Stage::Module,
                    ),
                ),
            },
            ModulesEntry::Root(root) => builder.tap(
                Stage::RawModule,
                ModulesInRootPlugin::new(root.clone(), Stage::Module),
            ),
        }
    }

    // module
    builder.tap(Stage::Module, JoinRequestPartPlugin::new(Stage::ResolveAsModule));

    // resolve-as-module
    if !options.resolve_to_context {
        builder.tap(
            Stage::ResolveAsModule,
            ConditionalPlugin::new(
                RequestFilter {
                    directory: Some(false),
                    request: Some("."),
                    ..RequestFilter::default()
                },
                Some("single file module"),
                true,
                Stage::UndescribedRawFile,
            ),
        );
    }
    builder.tap(
        Stage::ResolveAsModule,
        DirectoryExistsPlugin::new(Arc::clone(fs), Stage::UndescribedResolveInPackage),
    );

    // undescribed-resolve-in-package
    builder.tap(
        Stage::UndescribedResolveInPackage,
        describe(false, Stage::ResolveInPackage),
    );
    builder.tap(
        Stage::UndescribedResolveInPackage.after(),
        NextPlugin::new(Stage::ResolveInPackage),
    );

    // resolve-in-package
    for field in &options.exports_fields {
        builder.tap(
            Stage::ResolveInPackage,
            ExportsFieldPlugin::new(Arc::clone(&conditions), field.clone(), Stage::Relative),
        );
    }
    builder.tap(
        Stage::ResolveInPackage,
        NextPlugin::new(Stage::ResolveInExistingDirectory),
    );

    // resolve-in-existing-directory
    builder.tap(
        Stage::ResolveInExistingDirectory,
        JoinRequestPlugin::new(Stage::Relative),
    );

    // relative
    builder.tap(Stage::Relative, describe(true, Stage::DescribedRelative));
    builder.tap(Stage::Relative.after(), NextPlugin::new(Stage::DescribedRelative));

    // described-relative
    if options.resolve_to_context {
        builder.tap(Stage::DescribedRelative, NextPlugin::new(Stage::Directory));
    } else {
        builder.tap(
            Stage::DescribedRelative,
            ConditionalPlugin::new(
                RequestFilter {
                    directory: Some(false),
                    ..RequestFilter::default()
                },
                None,
                true,
                Stage::RawFile,
            ),
        );
        builder.tap(
            Stage::DescribedRelative,
            ConditionalPlugin::new(
                RequestFilter {
                    fully_specified: Some(false),
                    ..RequestFilter::default()
                },
                Some("as directory"),
                true,
                Stage::Directory,
            ),
        );
    }

    // directory
    builder.tap(
        Stage::Directory,
        DirectoryExistsPlugin::new(Arc::clone(fs), Stage::UndescribedExistingDirectory),
    );

    if options.resolve_to_context {
        builder.tap(
            Stage::UndescribedExistingDirectory,
            NextPlugin::new(Stage::Resolved),
        );
    } else {
        // undescribed-existing-directory
        builder.tap(
            Stage::UndescribedExistingDirectory,
            describe(false, Stage::ExistingDirectory),
        );
        for main_file in &options.main_files {
            builder.tap(
                Stage::UndescribedExistingDirectory,
                UseFilePlugin::new(main_file.clone(), Stage::UndescribedRawFile),
            );
        }

        // existing-directory
        for field in &options.main_fields {
            builder.tap(
                Stage::ExistingDirectory,
                MainFieldPlugin::new(field.clone(), Stage::ResolveInExistingDirectory),
            );
        }
        for main_file in &options.main_files {
            builder.tap(
                Stage::ExistingDirectory,
                UseFilePlugin::new(main_file.clone(), Stage::UndescribedRawFile),
            );
        }

        // undescribed-raw-file
        builder.tap(Stage::UndescribedRawFile, describe(true, Stage::RawFile));
        builder.tap(
            Stage::UndescribedRawFile.after(),
            NextPlugin::new(Stage::RawFile),
        );

        // raw-file
        builder.tap(
            Stage::RawFile,
            ConditionalPlugin::new(
                RequestFilter {
                    fully_specified: Some(true),
                    ..RequestFilter::default()
                },
                None,
                false,
                Stage::File,
            ),
        );
        if !options.enforce_extension {
            builder.tap(Stage::RawFile, TryNextPlugin::new("no extension", Stage::File));
        }
        for extension in &options.extensions {
            builder.tap(Stage::RawFile, AppendPlugin::new(extension.clone(), Stage::File));
        }

        // file
        if !options.alias.is_empty() {
            builder.tap(
                Stage::File,
                AliasPlugin::new(options.alias.clone(), Stage::InternalResolve),
            );
        }
        for field in &options.alias_fields {
            builder.tap(
                Stage::File,
                AliasFieldPlugin::new(field.clone(), Stage::InternalResolve),
            );
        }
        builder.tap(Stage::File, NextPlugin::new(Stage::FinalFile));

        // final-file
        builder.tap(
            Stage::FinalFile,
            FileExistsPlugin::new(Arc::clone(fs), Stage::ExistingFile),
        );

        // existing-file
        if options.symlinks {
            builder.tap(
                Stage::ExistingFile,
                SymlinkPlugin::new(Arc::clone(fs), Stage::ExistingFile),
            );
        }
        builder.tap(Stage::ExistingFile, NextPlugin::new(Stage::Resolved));
    }

    // resolved
    if !options.restrictions.is_empty() {
        builder.tap(
            Stage::Resolved,
            RestrictionsPlugin::new(options.restrictions.clone()),
        );
    }
    builder.tap(Stage::Resolved, ResultPlugin);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::UserResolveOptions;

    fn names(resolver: &Resolver, stage: Stage) -> Vec<&'static str> {
        resolver
            .pipeline()
            .hook(stage)
            .map(|hook| hook.plugin_names())
            .unwrap_or_default()
    }

    #[test]
    fn test_default_wiring() {
        let resolver = create_resolver(UserResolveOptions::default()).unwrap();

        assert_eq!(names(&resolver, Stage::Resolve), vec!["ParsePlugin"]);
        assert_eq!(
            names(&resolver, Stage::ParsedResolve),
            vec!["DescriptionFilePlugin", "NextPlugin"]
        );
        assert_eq!(
            names(&resolver, Stage::NormalResolve),
            vec![
                "ConditionalPlugin",
                "ConditionalPlugin",
                "JoinRequestPlugin"
            ]
        );
        assert_eq!(
            names(&resolver, Stage::RawFile),
            vec![
                "ConditionalPlugin",
                "TryNextPlugin",
                "AppendPlugin",
                "AppendPlugin",
                "AppendPlugin"
            ]
        );
        assert_eq!(
            names(&resolver, Stage::ExistingFile),
            vec!["SymlinkPlugin", "NextPlugin"]
        );
        assert_eq!(names(&resolver, Stage::Resolved), vec!["ResultPlugin"]);
    }

    #[test]
    fn test_every_stage_has_a_hook() {
        let resolver = create_resolver(UserResolveOptions::default()).unwrap();
        for stage in Stage::ALL {
            assert!(resolver.pipeline().hook(*stage).is_some(), "{stage}");
        }
    }

    #[test]
    fn test_unsafe_cache_wiring() {
        let resolver = create_resolver(UserResolveOptions {
            unsafe_cache: Some(true),
            ..UserResolveOptions::default()
        })
        .unwrap();
        assert_eq!(names(&resolver, Stage::Resolve), vec!["UnsafeCachePlugin"]);
        assert_eq!(names(&resolver, Stage::NewResolve), vec!["ParsePlugin"]);
        assert_eq!(
            names(&resolver, Stage::InternalResolve),
            vec!["UnsafeCachePlugin"]
        );
        assert!(resolver.unsafe_cache().is_some());
    }

    #[test]
    fn test_resolve_to_context_wiring() {
        let resolver = create_resolver(UserResolveOptions {
            resolve_to_context: Some(true),
            ..UserResolveOptions::default()
        })
        .unwrap();
        assert_eq!(
            names(&resolver, Stage::ResolveAsModule),
            vec!["DirectoryExistsPlugin"]
        );
        assert_eq!(
            names(&resolver, Stage::UndescribedExistingDirectory),
            vec!["NextPlugin"]
        );
        assert!(names(&resolver, Stage::RawFile).is_empty());
    }

    #[test]
    fn test_enforce_extension_drops_try_next() {
        let resolver = create_resolver(UserResolveOptions {
            extensions: Some(vec![String::new(), ".js".to_string()]),
            ..UserResolveOptions::default()
        })
        .unwrap();
        assert!(resolver.options().enforce_extension);
        assert!(!names(&resolver, Stage::RawFile).contains(&"TryNextPlugin"));
    }

    #[test]
    fn test_prefer_relative_order() {
        let resolver = create_resolver(UserResolveOptions {
            prefer_relative: Some(true),
            ..UserResolveOptions::default()
        })
        .unwrap();
        assert_eq!(
            names(&resolver, Stage::NormalResolve),
            vec![
                "JoinRequestPlugin",
                "ConditionalPlugin",
                "ConditionalPlugin"
            ]
        );
    }

    #[test]
    fn test_user_plugins_tap_first() {
        let plugin = |builder: &mut PipelineBuilder| {
            builder.tap(Stage::Resolved, ResultPlugin);
        };
        let resolver = create_resolver(
            UserResolveOptions::default().with_plugin(Arc::new(plugin)),
        )
        .unwrap();
        assert_eq!(
            names(&resolver, Stage::Resolved),
            vec!["ResultPlugin", "ResultPlugin"]
        );
    }

    #[test]
    fn test_invalid_options_fail() {
        let err = create_resolver(UserResolveOptions {
            use_sync_file_system_calls: Some(true),
            ..UserResolveOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConfig(_)));
    }
}
