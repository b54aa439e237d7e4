//! Package.json `exports` and `imports` field evaluation.
//!
//! A field is compiled into a path tree keyed by `/`-separated segments.
//! Each node holds exact file mappings, folder mappings (keys ending in
//! `/`) and wildcard mappings (keys ending in `*`). Matching walks the tree
//! along the request and keeps the most specific folder or wildcard match
//! seen so far; an exact file match always wins.
//!
//! Conditional mappings are evaluated in declaration order against the
//! configured condition names. `default` must come last.

use super::error::ResolveError;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

/// Map an `exports` field request (`.` or `./sub/path`) to target paths.
///
/// An empty result means the request is not exported.
///
/// # Errors
/// Returns an error for malformed requests, keys or targets.
pub fn process_exports_field(
    field: &Value,
    request: &str,
    conditions: &IndexSet<String>,
) -> Result<Vec<String>, ResolveError> {
    let tree = build_exports_tree(field)?;
    let request = assert_exports_request(request)?;
    process(&tree, request, conditions, assert_export_target)
}

/// Map an `imports` field request (`#name`) to target paths or requests.
///
/// # Errors
/// Returns an error for malformed requests, keys or targets.
pub fn process_imports_field(
    field: &Value,
    request: &str,
    conditions: &IndexSet<String>,
) -> Result<Vec<String>, ResolveError> {
    let tree = build_imports_tree(field)?;
    let request = assert_imports_request(request)?;
    process(&tree, request, conditions, assert_import_target)
}

/// Reject targets that climb above the package root.
///
/// Only segments followed by `/` are counted.
///
/// # Errors
/// Returns `InvalidPackageTarget` when the target leaves the package.
pub fn check_field_target(relative: &str) -> Result<(), ResolveError> {
    let mut depth = 0i32;
    let mut last_non_slash = 0usize;
    let mut slash = find_from(relative, 1);
    while let Some(slash_index) = slash {
        match &relative[last_non_slash..slash_index] {
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return Err(ResolveError::InvalidPackageTarget(format!(
                        "Trying to access out of package scope. Requesting {relative}"
                    )));
                }
            }
            "." => {}
            _ => depth += 1,
        }
        last_non_slash = slash_index + 1;
        slash = find_from(relative, last_non_slash);
    }
    Ok(())
}

type AssertTarget = fn(&str, bool) -> Result<(), ResolveError>;

#[derive(Default)]
struct PathTreeNode<'v> {
    children: Option<FxHashMap<&'v str, PathTreeNode<'v>>>,
    folder: Option<&'v Value>,
    wildcards: Option<IndexMap<&'v str, &'v Value>>,
    files: FxHashMap<&'v str, &'v Value>,
}

fn find_from(s: &str, from: usize) -> Option<usize> {
    s.get(from..)?.find('/').map(|i| i + from)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn is_conditional_mapping(value: &Value) -> bool {
    value.is_object()
}

fn walk_path<'v>(root: &mut PathTreeNode<'v>, path: &'v str, target: &'v Value) {
    if path.is_empty() {
        root.folder = Some(target);
        return;
    }

    let mut node = root;
    let mut last_non_slash = 0usize;
    let mut slash = path.find('/');
    while let Some(slash_index) = slash {
        let folder = &path[last_non_slash..slash_index];
        node = node
            .children
            .get_or_insert_with(FxHashMap::default)
            .entry(folder)
            .or_default();
        last_non_slash = slash_index + 1;
        slash = find_from(path, last_non_slash);
    }

    if last_non_slash >= path.len() {
        node.folder = Some(target);
        return;
    }

    let file = &path[last_non_slash..];
    if let Some(prefix) = file.strip_suffix('*') {
        node.wildcards
            .get_or_insert_with(IndexMap::new)
            .insert(prefix, target);
    } else {
        node.files.insert(file, target);
    }
}

fn build_exports_tree(field: &Value) -> Result<PathTreeNode<'_>, ResolveError> {
    let mut root = PathTreeNode::default();
    let map = match field {
        Value::Object(map) => map,
        other => {
            root.files.insert("", other);
            return Ok(root);
        }
    };

    let keys: Vec<&String> = map.keys().collect();
    for (i, key) in keys.iter().copied().enumerate() {
        if !key.starts_with('.') {
            // The whole field is a conditional mapping for ".".
            if i == 0 {
                if let Some(bad) = keys.iter().find(|k| k.starts_with('.') || k.starts_with('/')) {
                    return Err(exports_key_error(bad, "."));
                }
                root.files.insert("", field);
                return Ok(root);
            }
            return Err(exports_key_error(key, "."));
        }

        let target = &map[key];
        if key.len() == 1 {
            root.files.insert("", target);
            continue;
        }
        if key.as_bytes()[1] != b'/' {
            return Err(exports_key_error(key, "./"));
        }
        walk_path(&mut root, &key[2..], target);
    }
    Ok(root)
}

fn exports_key_error(key: &str, prefix: &str) -> ResolveError {
    ResolveError::InvalidPackageConfig(format!(
        "Exports field key should be relative path and start with \"{prefix}\" (key: {key:?})"
    ))
}

fn build_imports_tree(field: &Value) -> Result<PathTreeNode<'_>, ResolveError> {
    let mut root = PathTreeNode::default();
    let Value::Object(map) = field else {
        return Err(ResolveError::InvalidPackageConfig(
            "Imports field should be an object".to_string(),
        ));
    };

    for (key, target) in map {
        if !key.starts_with('#') {
            return Err(ResolveError::InvalidPackageConfig(format!(
                "Imports field key should start with \"#\" (key: {key:?})"
            )));
        }
        if key.len() == 1 {
            return Err(ResolveError::InvalidPackageConfig(format!(
                "Imports field key should have at least 2 characters (key: {key:?})"
            )));
        }
        if key.as_bytes()[1] == b'/' {
            return Err(ResolveError::InvalidPackageConfig(format!(
                "Imports field key should not start with \"#/\" (key: {key:?})"
            )));
        }
        walk_path(&mut root, &key[1..], target);
    }
    Ok(root)
}

fn assert_exports_request(request: &str) -> Result<&str, ResolveError> {
    if !request.starts_with('.') {
        return Err(ResolveError::InvalidPackageRequest(
            "Request should be relative path and start with \".\"".to_string(),
        ));
    }
    if request.len() == 1 {
        return Ok("");
    }
    if request.as_bytes()[1] != b'/' {
        return Err(ResolveError::InvalidPackageRequest(
            "Request should be relative path and start with \"./\"".to_string(),
        ));
    }
    if request.ends_with('/') {
        return Err(ResolveError::InvalidPackageRequest(
            "Only requesting file allowed".to_string(),
        ));
    }
    Ok(&request[2..])
}

fn assert_imports_request(request: &str) -> Result<&str, ResolveError> {
    if !request.starts_with('#') {
        return Err(ResolveError::InvalidPackageRequest(
            "Request should start with \"#\"".to_string(),
        ));
    }
    if request.len() == 1 {
        return Err(ResolveError::InvalidPackageRequest(
            "Request should have at least 2 characters".to_string(),
        ));
    }
    if request.as_bytes()[1] == b'/' {
        return Err(ResolveError::InvalidPackageRequest(
            "Request should not start with \"#/\"".to_string(),
        ));
    }
    if request.ends_with('/') {
        return Err(ResolveError::InvalidPackageRequest(
            "Only requesting file allowed".to_string(),
        ));
    }
    Ok(&request[1..])
}

fn assert_folder_shape(target: &str, expect_folder: bool) -> Result<(), ResolveError> {
    if target.ends_with('/') == expect_folder {
        return Ok(());
    }
    Err(ResolveError::InvalidPackageTarget(if expect_folder {
        format!("Expecting folder to folder mapping. {target:?} should end with \"/\"")
    } else {
        format!("Expecting file to file mapping. {target:?} should not end with \"/\"")
    }))
}

fn assert_export_target(target: &str, expect_folder: bool) -> Result<(), ResolveError> {
    let bytes = target.as_bytes();
    if bytes.first() == Some(&b'/') || (bytes.first() == Some(&b'.') && bytes.get(1) != Some(&b'/')) {
        return Err(ResolveError::InvalidPackageTarget(format!(
            "Export should be relative path and start with \"./\", got {target:?}."
        )));
    }
    assert_folder_shape(target, expect_folder)
}

fn assert_import_target(target: &str, expect_folder: bool) -> Result<(), ResolveError> {
    assert_folder_shape(target, expect_folder)
}

/// Returns the best mapping and where the unmatched remainder starts.
///
/// The index is `request.len() + 1` for an exact match and negative
/// (`-start - 1`) for a folder match.
fn find_match<'v>(request: &str, root: &PathTreeNode<'v>) -> Option<(&'v Value, isize)> {
    let exact_index = isize::try_from(request.len()).ok()? + 1;

    if request.is_empty() {
        return root
            .files
            .get("")
            .copied()
            .filter(|v| is_truthy(v))
            .map(|v| (v, 1));
    }

    if root.children.is_none() && root.folder.is_none() && root.wildcards.is_none() {
        return root
            .files
            .get(request)
            .copied()
            .filter(|v| is_truthy(v))
            .map(|v| (v, exact_index));
    }

    let mut node = root;
    let mut last_non_slash = 0usize;
    let mut slash = request.find('/');
    let mut best: Option<(&'v Value, isize)> = None;

    while let Some(slash_index) = slash {
        apply_folder_mapping(node, last_non_slash, &mut best);
        if node.wildcards.is_none() && node.children.is_none() {
            return best;
        }

        let folder = &request[last_non_slash..slash_index];
        apply_wildcard_mappings(node, folder, last_non_slash, &mut best);

        let Some(next) = node.children.as_ref().and_then(|c| c.get(folder)) else {
            return best;
        };
        node = next;
        last_non_slash = slash_index + 1;
        slash = find_from(request, last_non_slash);
    }

    let remaining = &request[last_non_slash..];
    if let Some(value) = node.files.get(remaining).copied().filter(|v| is_truthy(v)) {
        return Some((value, exact_index));
    }

    apply_folder_mapping(node, last_non_slash, &mut best);
    apply_wildcard_mappings(node, remaining, last_non_slash, &mut best);
    best
}

#[allow(clippy::cast_possible_wrap)]
fn apply_folder_mapping<'v>(
    node: &PathTreeNode<'v>,
    last_non_slash: usize,
    best: &mut Option<(&'v Value, isize)>,
) {
    if let Some(folder) = node.folder.filter(|v| is_truthy(v)) {
        *best = Some((folder, -(last_non_slash as isize) - 1));
    }
}

#[allow(clippy::cast_possible_wrap)]
fn apply_wildcard_mappings<'v>(
    node: &PathTreeNode<'v>,
    segment: &str,
    last_non_slash: usize,
    best: &mut Option<(&'v Value, isize)>,
) {
    let Some(wildcards) = &node.wildcards else {
        return;
    };
    for (key, target) in wildcards {
        if !segment.starts_with(key) {
            continue;
        }
        let index = (last_non_slash + key.len()) as isize;
        match best {
            Some((_, current)) if *current >= index => {}
            _ => *best = Some((*target, index)),
        }
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn process(
    tree: &PathTreeNode<'_>,
    request: &str,
    conditions: &IndexSet<String>,
    assert_target: AssertTarget,
) -> Result<Vec<String>, ResolveError> {
    let Some((mapping, remain_index)) = find_match(request, tree) else {
        return Ok(Vec::new());
    };

    let direct = if is_conditional_mapping(mapping) {
        match conditional_mapping(mapping, conditions)? {
            Some(direct) => direct,
            None => return Ok(Vec::new()),
        }
    } else {
        mapping
    };

    let exact_index = request.len() as isize + 1;
    let remaining = if remain_index == exact_index {
        None
    } else if remain_index < 0 {
        Some(&request[(-remain_index - 1) as usize..])
    } else {
        Some(&request[remain_index as usize..])
    };

    direct_mapping(remaining, remain_index < 0, direct, conditions, assert_target)
}

fn direct_mapping(
    remaining: Option<&str>,
    subpath_mapping: bool,
    target: &Value,
    conditions: &IndexSet<String>,
    assert_target: AssertTarget,
) -> Result<Vec<String>, ResolveError> {
    match target {
        Value::String(s) => Ok(vec![target_mapping(remaining, subpath_mapping, s, assert_target)?]),
        Value::Array(items) => {
            let mut targets = Vec::new();
            for item in items {
                match item {
                    Value::String(s) => {
                        targets.push(target_mapping(remaining, subpath_mapping, s, assert_target)?);
                    }
                    Value::Object(_) => {
                        let Some(mapping) = conditional_mapping(item, conditions)? else {
                            continue;
                        };
                        if !is_truthy(mapping) {
                            continue;
                        }
                        targets.extend(direct_mapping(
                            remaining,
                            subpath_mapping,
                            mapping,
                            conditions,
                            assert_target,
                        )?);
                    }
                    _ => {}
                }
            }
            Ok(targets)
        }
        _ => Ok(Vec::new()),
    }
}

fn target_mapping(
    remaining: Option<&str>,
    subpath_mapping: bool,
    target: &str,
    assert_target: AssertTarget,
) -> Result<String, ResolveError> {
    match remaining {
        None => {
            assert_target(target, false)?;
            Ok(target.to_string())
        }
        Some(remaining) if subpath_mapping => {
            assert_target(target, true)?;
            Ok(format!("{target}{remaining}"))
        }
        Some(remaining) => {
            assert_target(target, false)?;
            Ok(target.replace('*', remaining))
        }
    }
}

/// Pick the first matching condition, descending into nested condition
/// objects. A nested object with no match falls through to the next
/// condition of its parent.
fn conditional_mapping<'v>(
    mapping: &'v Value,
    conditions: &IndexSet<String>,
) -> Result<Option<&'v Value>, ResolveError> {
    let Some(root) = mapping.as_object() else {
        return Ok(None);
    };
    let mut lookup: Vec<(&'v Map<String, Value>, Vec<&'v String>, usize)> =
        vec![(root, root.keys().collect(), 0)];

    'outer: while let Some((map, keys, start)) = lookup.last_mut() {
        let map: &'v Map<String, Value> = *map;
        let last = keys.len().saturating_sub(1);
        for i in *start..keys.len() {
            let condition = keys[i].as_str();
            let is_default = condition == "default";
            if i != last && is_default {
                return Err(ResolveError::InvalidPackageConfig(
                    "Default condition should be last one".to_string(),
                ));
            }
            if is_default || conditions.contains(condition) {
                let inner = &map[condition];
                if let Value::Object(nested) = inner {
                    *start = i + 1;
                    lookup.push((nested, nested.keys().collect(), 0));
                    continue 'outer;
                }
                return Ok(Some(inner));
            }
        }
        lookup.pop();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(names: &[&str]) -> IndexSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn exports(field: &Value, request: &str, names: &[&str]) -> Vec<String> {
        process_exports_field(field, request, &conditions(names)).unwrap()
    }

    fn imports(field: &Value, request: &str, names: &[&str]) -> Vec<String> {
        process_imports_field(field, request, &conditions(names)).unwrap()
    }

    #[test]
    fn test_exports_string_root() {
        let field = json!("./dist/index.js");
        assert_eq!(exports(&field, ".", &["import"]), vec!["./dist/index.js"]);
        assert_eq!(exports(&field, ".", &["require"]), vec!["./dist/index.js"]);
        assert!(exports(&field, "./other", &["import"]).is_empty());
    }

    #[test]
    fn test_exports_dot_string() {
        let field = json!({ ".": "./a.js" });
        assert_eq!(exports(&field, ".", &[]), vec!["./a.js"]);
    }

    #[test]
    fn test_exports_conditions() {
        let field = json!({
            ".": {
                "import": "./esm.js",
                "require": "./cjs.cjs",
                "default": "./d.js"
            }
        });
        assert_eq!(exports(&field, ".", &["import"]), vec!["./esm.js"]);
        assert_eq!(exports(&field, ".", &["require"]), vec!["./cjs.cjs"]);
        assert_eq!(exports(&field, ".", &[]), vec!["./d.js"]);
    }

    #[test]
    fn test_exports_conditions_follow_declaration_order() {
        let field = json!({
            ".": { "require": "./cjs.cjs", "import": "./esm.js" }
        });
        assert_eq!(exports(&field, ".", &["import", "require"]), vec!["./cjs.cjs"]);
    }

    #[test]
    fn test_exports_conditions_at_root() {
        let field = json!({
            "import": "./esm.js",
            "require": "./cjs.js",
            "default": "./default.js"
        });
        assert_eq!(exports(&field, ".", &["import"]), vec!["./esm.js"]);
        assert_eq!(exports(&field, ".", &["require"]), vec!["./cjs.js"]);
    }

    #[test]
    fn test_exports_nested_conditions_fall_through() {
        let field = json!({
            ".": {
                "node": { "import": "./node.mjs" },
                "default": "./fallback.js"
            }
        });
        assert_eq!(exports(&field, ".", &["node", "import"]), vec!["./node.mjs"]);
        assert_eq!(exports(&field, ".", &["node", "require"]), vec!["./fallback.js"]);
    }

    #[test]
    fn test_exports_default_must_be_last() {
        let field = json!({ ".": { "default": "./d.js", "import": "./esm.js" } });
        let err = process_exports_field(&field, ".", &conditions(&["import"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid package config: Default condition should be last one"
        );
    }

    #[test]
    fn test_exports_mixed_keys_rejected() {
        let field = json!({ "import": "./esm.js", "./sub": "./sub.js" });
        let err = process_exports_field(&field, ".", &conditions(&[])).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPackageConfig(_)));

        let field = json!({ "./sub": "./sub.js", "import": "./esm.js" });
        assert!(process_exports_field(&field, ".", &conditions(&[])).is_err());
    }

    #[test]
    fn test_exports_invalid_target() {
        let field = json!("https://example.com/x");
        // Not starting with "./" but also not "/" or ".x": accepted as-is.
        assert_eq!(exports(&field, ".", &[]), vec!["https://example.com/x"]);

        let field = json!("/abs/x.js");
        let err = process_exports_field(&field, ".", &conditions(&[])).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPackageTarget(_)));

        let field = json!("../x.js");
        assert!(process_exports_field(&field, ".", &conditions(&[])).is_err());
    }

    #[test]
    fn test_exports_request_assertions() {
        let field = json!({ ".": "./a.js" });
        for bad in ["lodash", ".x", "./dir/"] {
            let err = process_exports_field(&field, bad, &conditions(&[])).unwrap_err();
            assert!(matches!(err, ResolveError::InvalidPackageRequest(_)), "{bad}");
        }
    }

    #[test]
    fn test_exports_subpath_string() {
        let field = json!({ ".": "./index.js", "./feature": "./dist/feature.js" });
        assert_eq!(exports(&field, "./feature", &[]), vec!["./dist/feature.js"]);
        assert!(exports(&field, "./missing", &[]).is_empty());
    }

    #[test]
    fn test_exports_null_target_is_not_exported() {
        let field = json!({ "./*": "./dist/*.js", "./private/*": null });
        assert_eq!(exports(&field, "./a", &[]), vec!["./dist/a.js"]);
        assert!(exports(&field, "./private/x", &[]).is_empty());
    }

    #[test]
    fn test_exports_pattern_simple() {
        let field = json!({ ".": "./index.js", "./*": "./dist/*.js" });
        assert_eq!(exports(&field, "./foo", &[]), vec!["./dist/foo.js"]);
        assert_eq!(exports(&field, "./bar/baz", &[]), vec!["./dist/bar/baz.js"]);
    }

    #[test]
    fn test_exports_pattern_nested() {
        let field = json!({ "./features/*": "./dist/features/*.js" });
        assert_eq!(
            exports(&field, "./features/auth", &[]),
            vec!["./dist/features/auth.js"]
        );
        assert!(exports(&field, "./utils", &[]).is_empty());
    }

    #[test]
    fn test_exports_pattern_conditional() {
        let field = json!({
            "./*": { "import": "./esm/*.mjs", "require": "./cjs/*.cjs" }
        });
        assert_eq!(exports(&field, "./utils", &["import"]), vec!["./esm/utils.mjs"]);
        assert_eq!(exports(&field, "./utils", &["require"]), vec!["./cjs/utils.cjs"]);
        assert!(exports(&field, "./utils", &["browser"]).is_empty());
    }

    #[test]
    fn test_exports_pattern_specificity() {
        let field = json!({
            "./*": "./dist/*.js",
            "./features/*": "./dist/features/*.js",
            "./features/special": "./special.js"
        });
        assert_eq!(
            exports(&field, "./features/auth", &[]),
            vec!["./dist/features/auth.js"]
        );
        assert_eq!(exports(&field, "./features/special", &[]), vec!["./special.js"]);
        assert_eq!(exports(&field, "./utils", &[]), vec!["./dist/utils.js"]);
    }

    #[test]
    fn test_exports_folder_mapping() {
        let field = json!({ "./lib/": "./src/lib/", "./": "./" });
        assert_eq!(exports(&field, "./lib/a.js", &[]), vec!["./src/lib/a.js"]);
        assert_eq!(exports(&field, "./other/b.js", &[]), vec!["./other/b.js"]);

        let field = json!({ "./lib/": "./src/lib.js" });
        let err = process_exports_field(&field, "./lib/a.js", &conditions(&[])).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPackageTarget(_)));
    }

    #[test]
    fn test_exports_array_targets() {
        let field = json!({
            ".": [{ "worker": "./worker.js" }, "./main.js", { "default": "./d.js" }]
        });
        assert_eq!(exports(&field, ".", &["worker"]), vec!["./worker.js", "./main.js", "./d.js"]);
        assert_eq!(exports(&field, ".", &[]), vec!["./main.js", "./d.js"]);
    }

    #[test]
    fn test_imports_exact_match() {
        let field = json!({ "#dep": "./src/dep.js" });
        assert_eq!(imports(&field, "#dep", &[]), vec!["./src/dep.js"]);
        assert!(imports(&field, "#other", &[]).is_empty());
    }

    #[test]
    fn test_imports_with_conditions() {
        let field = json!({
            "#dep": { "node": "dep-node-native", "default": "./dep-polyfill.js" }
        });
        assert_eq!(imports(&field, "#dep", &["node"]), vec!["dep-node-native"]);
        assert_eq!(imports(&field, "#dep", &["browser"]), vec!["./dep-polyfill.js"]);
    }

    #[test]
    fn test_imports_pattern() {
        let field = json!({ "#utils/*": "./src/utils/*.js" });
        assert_eq!(imports(&field, "#utils/fmt", &[]), vec!["./src/utils/fmt.js"]);
    }

    #[test]
    fn test_imports_key_and_request_assertions() {
        let field = json!({ "dep": "./dep.js" });
        assert!(matches!(
            process_imports_field(&field, "#dep", &conditions(&[])),
            Err(ResolveError::InvalidPackageConfig(_))
        ));

        let field = json!({ "#dep": "./dep.js" });
        for bad in ["dep", "#", "#/x", "#dir/"] {
            assert!(matches!(
                process_imports_field(&field, bad, &conditions(&[])),
                Err(ResolveError::InvalidPackageRequest(_))
            ));
        }
    }

    #[test]
    fn test_check_field_target() {
        assert!(check_field_target("./dist/a.js").is_ok());
        assert!(check_field_target("./a/../b.js").is_ok());
        assert!(check_field_target("lodash/fp").is_ok());
        assert!(check_field_target("./../secret.js").is_err());
        assert!(check_field_target("./a/../../b/c.js").is_err());
        // The last segment is never inspected.
        assert!(check_field_target("./..").is_ok());
    }
}
