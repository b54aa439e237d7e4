//! Description file (package.json) discovery and caching.
//!
//! Finding the description file for a path walks up the directory tree and
//! tries each configured file name. Results, including "nothing found",
//! are cached per directory for the lifetime of the cache, which is shared
//! between a resolver and every resolver derived from it.

use super::context::ResolveContext;
use super::error::ResolveError;
use crate::fs::FileSystem;
use fastresolve_util::path::cd_up;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A parsed description file.
#[derive(Debug, Clone)]
pub struct DescriptionFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Directory containing the file (the package root).
    pub directory: PathBuf,
    pub content: Arc<Value>,
}

type CacheKey = (PathBuf, String);

/// Per-directory lookup cache for description files.
#[derive(Debug, Default)]
pub struct DescriptionFileCache {
    entries: RwLock<FxHashMap<CacheKey, Option<Arc<DescriptionFile>>>>,
}

impl DescriptionFileCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn purge(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Option<Arc<DescriptionFile>>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn insert_if_absent(&self, key: CacheKey, value: Option<Arc<DescriptionFile>>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.entry(key).or_insert(value);
        }
    }

    /// Find the nearest description file at or above `directory`.
    ///
    /// Every probed file is recorded in `ctx` as a file or missing
    /// dependency.
    ///
    /// # Errors
    /// Returns `DescriptionFile` if a found file is not valid JSON.
    pub async fn load(
        &self,
        fs: &dyn FileSystem,
        directory: &Path,
        filenames: &[String],
        ctx: &mut ResolveContext,
    ) -> Result<Option<Arc<DescriptionFile>>, ResolveError> {
        let names_key = filenames.join("\0");
        let mut walked = Vec::new();
        let mut current = Some(directory);

        let found = loop {
            let Some(dir) = current else {
                break None;
            };

            let key = (dir.to_path_buf(), names_key.clone());
            if let Some(cached) = self.get(&key) {
                if let Some(file) = &cached {
                    ctx.add_file_dependency(file.path.clone());
                }
                break cached;
            }
            walked.push(key);

            if let Some(file) = read_in_directory(fs, dir, filenames, ctx).await? {
                break Some(Arc::new(file));
            }
            current = cd_up(dir);
        };

        for key in walked {
            self.insert_if_absent(key, found.clone());
        }
        Ok(found)
    }
}

async fn read_in_directory(
    fs: &dyn FileSystem,
    directory: &Path,
    filenames: &[String],
    ctx: &mut ResolveContext,
) -> Result<Option<DescriptionFile>, ResolveError> {
    for name in filenames {
        let path = directory.join(name);
        let Ok(bytes) = fs.read_file(&path).await else {
            ctx.add_missing_dependency(path);
            continue;
        };
        ctx.add_file_dependency(path.clone());

        let content: Value = serde_json::from_slice(&bytes)
            .map_err(|source| ResolveError::DescriptionFile {
                path: path.clone(),
                source,
            })?;
        return Ok(Some(DescriptionFile {
            path,
            directory: directory.to_path_buf(),
            content: Arc::new(content),
        }));
    }
    Ok(None)
}

/// Look up a (possibly nested) field in a description file.
///
/// Returns `None` if any intermediate value is missing or not an object.
#[must_use]
pub fn get_field<'a>(content: &'a Value, field: &[String]) -> Option<&'a Value> {
    field
        .iter()
        .try_fold(content, |current, key| current.as_object()?.get(key))
}

/// `path` relative to `root`, rendered as `.` or `./a/b`.
#[must_use]
pub fn relative_path_in(root: &Path, path: &Path) -> Option<String> {
    let suffix = path.strip_prefix(root).ok()?;
    let mut relative = String::from(".");
    for component in suffix.components() {
        relative.push('/');
        relative.push_str(&component.as_os_str().to_string_lossy());
    }
    Some(relative)
}
