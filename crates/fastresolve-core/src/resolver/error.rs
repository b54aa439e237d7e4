//! Resolution error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes for machine-readable output.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    pub const INVALID_PACKAGE_CONFIG: &str = "INVALID_PACKAGE_CONFIG";
    pub const INVALID_PACKAGE_REQUEST: &str = "INVALID_PACKAGE_REQUEST";
    pub const INVALID_PACKAGE_TARGET: &str = "INVALID_PACKAGE_TARGET";
    pub const PACKAGE_PATH_NOT_EXPORTED: &str = "PACKAGE_PATH_NOT_EXPORTED";
    pub const PACKAGE_IMPORT_NOT_DEFINED: &str = "PACKAGE_IMPORT_NOT_DEFINED";
    pub const DIRECTORY_THROUGH_FIELD: &str = "DIRECTORY_THROUGH_FIELD";
    pub const RESTRICTED: &str = "RESTRICTED";
    pub const RECURSION: &str = "RECURSION";
    pub const DESCRIPTION_FILE_INVALID: &str = "DESCRIPTION_FILE_INVALID";
    pub const PNP_ERROR: &str = "PNP_ERROR";
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Why a resolution failed.
///
/// `NotFound` is the only "soft" failure: every plugin missed. All other
/// variants abort the whole resolution as soon as they are raised.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Can't resolve '{request}' in '{}'{}", .context.display(), hint_suffix(.hints))]
    NotFound {
        request: String,
        context: PathBuf,
        /// Trace lines collected while retrying with logging enabled.
        details: Vec<String>,
        hints: Vec<String>,
    },

    #[error("Invalid resolver options: {0}")]
    InvalidConfig(String),

    #[error("Invalid package config: {0}")]
    InvalidPackageConfig(String),

    #[error("Invalid package request: {0}")]
    InvalidPackageRequest(String),

    #[error("Invalid package target: {0}")]
    InvalidPackageTarget(String),

    #[error(
        "Package path {request} is not exported from package {} (see exports field in {})",
        .package_root.display(),
        .description_file.display()
    )]
    PackagePathNotExported {
        request: String,
        package_root: PathBuf,
        description_file: PathBuf,
    },

    #[error(
        "Package import {request} is not imported from package {} (see imports field in {})",
        .package_root.display(),
        .description_file.display()
    )]
    PackageImportNotDefined {
        request: String,
        package_root: PathBuf,
        description_file: PathBuf,
    },

    #[error("Resolving to directories is not possible with the {field} field (request was {request})")]
    DirectoryThroughField { field: &'static str, request: String },

    #[error("Resolved path {} is outside the allowed restrictions", .path.display())]
    Restricted { path: PathBuf },

    #[error("Recursion in resolving\nStack:\n  {}", .stack.join("\n  "))]
    Recursion { stack: Vec<String> },

    #[error("Failed to parse description file {}: {source}", .path.display())]
    DescriptionFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("PnP resolution failed: {0}")]
    Pnp(String),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn hint_suffix(hints: &[String]) -> String {
    hints.iter().map(|hint| format!("\n{hint}")).collect()
}

impl ResolveError {
    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::InvalidConfig(_) => codes::INVALID_CONFIG,
            Self::InvalidPackageConfig(_) => codes::INVALID_PACKAGE_CONFIG,
            Self::InvalidPackageRequest(_) => codes::INVALID_PACKAGE_REQUEST,
            Self::InvalidPackageTarget(_) => codes::INVALID_PACKAGE_TARGET,
            Self::PackagePathNotExported { .. } => codes::PACKAGE_PATH_NOT_EXPORTED,
            Self::PackageImportNotDefined { .. } => codes::PACKAGE_IMPORT_NOT_DEFINED,
            Self::DirectoryThroughField { .. } => codes::DIRECTORY_THROUGH_FIELD,
            Self::Restricted { .. } => codes::RESTRICTED,
            Self::Recursion { .. } => codes::RECURSION,
            Self::DescriptionFile { .. } => codes::DESCRIPTION_FILE_INVALID,
            Self::Pnp(_) => codes::PNP_ERROR,
            Self::Io { .. } => codes::IO_ERROR,
        }
    }

    /// Whether this is a plain "nothing matched" failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Trace lines attached to a not-found error.
    #[must_use]
    pub fn details(&self) -> &[String] {
        match self {
            Self::NotFound { details, .. } => details,
            _ => &[],
        }
    }

    /// Hints attached to a not-found error.
    #[must_use]
    pub fn hints(&self) -> &[String] {
        match self {
            Self::NotFound { hints, .. } => hints,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_includes_hints() {
        let err = ResolveError::NotFound {
            request: "./a".into(),
            context: PathBuf::from("/proj"),
            details: vec![],
            hints: vec!["Did you mean './a.js'?".into()],
        };
        assert_eq!(
            err.to_string(),
            "Can't resolve './a' in '/proj'\nDid you mean './a.js'?"
        );
        assert_eq!(err.code(), codes::NOT_FOUND);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_recursion_message_lists_stack() {
        let err = ResolveError::Recursion {
            stack: vec!["resolve: (/a) x".into(), "resolve: (/a) x".into()],
        };
        assert!(err.to_string().contains("\n  resolve: (/a) x"));
        assert!(err.details().is_empty());
    }

    #[test]
    fn test_not_exported_message() {
        let err = ResolveError::PackagePathNotExported {
            request: "./internal".into(),
            package_root: PathBuf::from("/nm/pkg"),
            description_file: PathBuf::from("/nm/pkg/package.json"),
        };
        assert_eq!(
            err.to_string(),
            "Package path ./internal is not exported from package /nm/pkg (see exports field in /nm/pkg/package.json)"
        );
    }
}
