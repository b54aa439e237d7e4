//! The request record threaded through the pipeline, and the final result.

use super::hooks::Stage;
use fastresolve_util::identifier::{escape_hash, parse_identifier};
use fastresolve_util::path::{get_type, join_relative, PathType};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Information about the importer, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ContextInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(rename = "issuerLayer", skip_serializing_if = "Option::is_none")]
    pub issuer_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
}

/// A resolution request in flight.
///
/// Each plugin receives a request and forwards a modified copy; the input
/// is never mutated.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub context: Arc<ContextInfo>,
    /// The directory (or, late in the pipeline, the file) being resolved against.
    pub path: PathBuf,
    /// Remaining request text, `None` once it has been joined into `path`.
    pub request: Option<String>,
    pub query: String,
    pub fragment: String,
    pub directory: bool,
    pub module: bool,
    pub internal: bool,
    pub fully_specified: bool,
    pub description_file_path: Option<PathBuf>,
    pub description_file_root: Option<PathBuf>,
    pub description_file_data: Option<Arc<Value>>,
    /// `path` relative to `description_file_root`, always `.` or `./...`.
    pub relative_path: Option<String>,
    /// Description file whose main field was already followed from this path.
    pub already_tried_main_field: Option<PathBuf>,
    pub ignore_symlinks: bool,
}

impl ResolveRequest {
    /// A fresh top-level request.
    #[must_use]
    pub fn new(context: ContextInfo, path: impl Into<PathBuf>, request: impl Into<String>) -> Self {
        Self {
            context: Arc::new(context),
            path: path.into(),
            request: Some(request.into()),
            ..Default::default()
        }
    }

    /// The identity used for recursion detection at `stage`.
    #[must_use]
    pub fn stack_entry(&self, stage: Stage) -> String {
        let mut entry = format!(
            "{stage}: ({}) {}{}{}",
            self.path.display(),
            self.request.as_deref().unwrap_or(""),
            self.query,
            self.fragment
        );
        if self.directory {
            entry.push_str(" directory");
        }
        if self.module {
            entry.push_str(" module");
        }
        entry
    }

    /// The request as seen from the package root, for field lookups.
    ///
    /// Relative requests are rebased onto `relative_path`; without a request
    /// the relative path itself is used.
    #[must_use]
    pub fn inner_request(&self) -> Option<String> {
        match self.request.as_deref() {
            Some(request) => {
                let is_dot_relative = request == "."
                    || request == ".."
                    || request.starts_with("./")
                    || request.starts_with("../");
                match (&self.relative_path, is_dot_relative) {
                    (Some(relative), true) => Some(join_relative(relative, request)),
                    _ => Some(request.to_string()),
                }
            }
            None => self.relative_path.clone(),
        }
    }

    /// `path` as a string for matching against alias names and restrictions.
    #[must_use]
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A request split into path, query and fragment, with classification flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRequest {
    pub request: String,
    pub query: String,
    pub fragment: String,
    pub module: bool,
    pub directory: bool,
    pub internal: bool,
}

impl ParsedRequest {
    /// Parse a raw request.
    ///
    /// A trailing `/` sets `directory` and is stripped from the request.
    #[must_use]
    pub fn parse(identifier: &str) -> Self {
        let mut parsed = Self::default();
        let Some(id) = parse_identifier(identifier) else {
            return parsed;
        };

        parsed.request = id.request;
        parsed.query = id.query;
        parsed.fragment = id.fragment;

        if !parsed.request.is_empty() {
            let kind = get_type(&parsed.request);
            parsed.internal = kind == PathType::Internal;
            parsed.module = kind == PathType::Normal;
            parsed.directory = parsed.request.ends_with('/');
            if parsed.directory {
                parsed.request.pop();
            }
        }
        parsed
    }
}

/// A successful resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The request resolved to a file.
    File(ResolveRequest),
    /// The request was explicitly mapped to "ignore" (an alias or browser
    /// field set to `false`).
    Ignored(ResolveRequest),
}

impl Resolution {
    /// The final request record.
    #[must_use]
    pub fn request(&self) -> &ResolveRequest {
        match self {
            Self::File(request) | Self::Ignored(request) => request,
        }
    }

    /// The resolved file path, or `None` when ignored.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(request) => Some(&request.path),
            Self::Ignored(_) => None,
        }
    }

    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }

    /// Path, query and fragment joined back into one string, with `#` in
    /// the path escaped. `None` when ignored.
    #[must_use]
    pub fn resource(&self) -> Option<String> {
        let Self::File(request) = self else {
            return None;
        };
        let mut resource = escape_hash(&request.path.to_string_lossy());
        let _ = write!(resource, "{}{}", request.query, request.fragment);
        Some(resource)
    }
}
