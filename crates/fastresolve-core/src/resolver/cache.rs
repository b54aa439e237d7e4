//! Result cache for whole resolutions.
//!
//! "Unsafe" because entries are never invalidated: a cached result is
//! returned even if the file it points to has since been removed.

use super::request::{ContextInfo, Resolution, ResolveRequest};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Shared map from request identity to resolution.
#[derive(Debug, Default)]
pub struct UnsafeCache {
    entries: RwLock<FxHashMap<String, Arc<Resolution>>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CacheContext<'a> {
    Info(&'a ContextInfo),
    None(&'static str),
}

#[derive(Serialize)]
struct CacheId<'a> {
    context: CacheContext<'a>,
    path: std::borrow::Cow<'a, str>,
    query: &'a str,
    fragment: &'a str,
    request: Option<&'a str>,
}

/// The cache key for `request`. Without `with_context` the importer
/// information is left out, so requests from different issuers share entries.
#[must_use]
pub fn cache_id(request: &ResolveRequest, with_context: bool) -> String {
    let id = CacheId {
        context: if with_context {
            CacheContext::Info(&request.context)
        } else {
            CacheContext::None("")
        },
        path: request.path.to_string_lossy(),
        query: &request.query,
        fragment: &request.fragment,
        request: request.request.as_deref(),
    };
    serde_json::to_string(&id).unwrap_or_default()
}

impl UnsafeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Resolution>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Store `resolution` unless the key is already present, and return
    /// whichever value ends up cached.
    pub fn insert(&self, key: String, resolution: Arc<Resolution>) -> Arc<Resolution> {
        match self.entries.write() {
            Ok(mut entries) => entries.entry(key).or_insert(resolution).clone(),
            Err(_) => resolution,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
