use crate::error::Error;
use crate::options::UserResolveOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no config is given.
pub const CONFIG_FILE_NAME: &str = "fastresolve.json";

/// Runtime configuration for the fastresolve CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Explicit resolver options file.
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            config_file: None,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set an explicit resolver options file.
    #[must_use]
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Load the resolver options for this configuration.
    ///
    /// Uses the explicit config file when set, then `fastresolve.json` in
    /// the working directory, and falls back to defaults.
    ///
    /// # Errors
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn resolve_options(&self) -> Result<UserResolveOptions, Error> {
        if let Some(path) = &self.config_file {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                self.cwd.join(path)
            };
            return load_resolve_options(&path);
        }

        let discovered = self.cwd.join(CONFIG_FILE_NAME);
        if discovered.is_file() {
            tracing::debug!(path = %discovered.display(), "using discovered config");
            return load_resolve_options(&discovered);
        }

        Ok(UserResolveOptions::default())
    }
}

/// Read resolver options from a JSON file.
///
/// # Errors
/// Returns `ConfigRead` or `ConfigParse` on failure.
pub fn load_resolve_options(path: &Path) -> Result<UserResolveOptions, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ModulesOption;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let options = config.resolve_options().unwrap();
        assert!(options.extensions.is_none());
    }

    #[test]
    fn test_discovers_config_in_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"extensions": [".ts", ".js"], "modules": "vendor", "symlinks": false}"#,
        )
        .unwrap();

        let options = Config::new(dir.path().to_path_buf())
            .resolve_options()
            .unwrap();
        assert_eq!(
            options.extensions,
            Some(vec![".ts".to_string(), ".js".to_string()])
        );
        assert!(matches!(options.modules, Some(ModulesOption::One(ref m)) if m == "vendor"));
        assert_eq!(options.symlinks, Some(false));
    }

    #[test]
    fn test_explicit_config_relative_to_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("custom.json"), r#"{"fullySpecified": true}"#).unwrap();

        let options = Config::new(dir.path().to_path_buf())
            .with_config_file(Some(PathBuf::from("custom.json")))
            .resolve_options()
            .unwrap();
        assert_eq!(options.fully_specified, Some(true));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_resolve_options(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_explicit_config() {
        let dir = tempdir().unwrap();
        let err = Config::new(dir.path().to_path_buf())
            .with_config_file(Some(PathBuf::from("nope.json")))
            .resolve_options()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
