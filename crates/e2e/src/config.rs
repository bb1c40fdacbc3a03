//! Runner configuration, loaded from `vizcheck.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::playwright::BrowserConfig;
use crate::server::ServerConfig;
use crate::wait::WaitOptions;

/// Configuration for the test runner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL of an already running fixture server. Ignored when the
    /// runner spawns its own.
    pub base_url: Option<String>,

    pub server: ServerConfig,

    pub browser: BrowserConfig,

    /// Timing for waits that do not set their own
    pub wait: WaitOptions,

    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of YAML specs
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| E2eError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.wait.timeout_ms == 0 {
            return Err(E2eError::Config("wait.timeout_ms must be positive".to_string()));
        }
        if !self.server.enabled && self.base_url.is_none() {
            return Err(E2eError::Config(
                "base_url is required when server.enabled is false".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playwright::Browser;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("vizcheck.toml")).unwrap();
        assert!(config.server.enabled);
        assert_eq!(config.wait, WaitOptions::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vizcheck.toml");
        std::fs::write(
            &path,
            r#"
base_url = "http://127.0.0.1:5500"

[server]
enabled = false

[browser]
browser = "firefox"

[wait]
timeout_ms = 15000
poll_interval_ms = 150
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://127.0.0.1:5500"));
        assert_eq!(config.browser.browser, Browser::Firefox);
        assert!(config.browser.headless);
        assert_eq!(config.wait, WaitOptions::new(15000, 150));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/vizcheck.toml");
        let mut config = RunnerConfig::default();
        config.paths.specs_dir = PathBuf::from("suites");
        config.save(&path).unwrap();

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded.paths.specs_dir, PathBuf::from("suites"));
    }

    #[test]
    fn test_disabled_server_needs_base_url() {
        let mut config = RunnerConfig::default();
        config.server.enabled = false;
        assert!(matches!(config.validate(), Err(E2eError::Config(_))));
    }
}
