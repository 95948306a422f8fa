//! Configuration management for autobuild

pub mod project;
pub mod schema;

pub use project::{ProjectFile, PROJECT_FILE_NAME};
pub use schema::Config;

use crate::error::{AutobuildError, AutobuildResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autobuild")
            .join("config.toml")
    }

    /// Get the default root of out-of-tree build directories
    pub fn default_root_build_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autobuild")
            .join("builds")
    }

    /// Root build directory from `config`, falling back to the default
    pub fn root_build_dir(config: &Config) -> PathBuf {
        config
            .build
            .root_build_dir
            .clone()
            .unwrap_or_else(Self::default_root_build_dir)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> AutobuildResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> AutobuildResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            AutobuildError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| AutobuildError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> AutobuildResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            AutobuildError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> AutobuildResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AutobuildError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Walk up from `start` looking for `autobuild.toml`
    pub fn find_project_file(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load a project file
    pub async fn load_project(path: &Path) -> AutobuildResult<ProjectFile> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            AutobuildError::io(format!("reading project file {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| AutobuildError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.toolchain.make, "make");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.build.jobs = 6;

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.build.jobs, 6);
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[build]\njobs = \"many\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, AutobuildError::ConfigInvalid { path: p, .. } if p == path));
    }

    #[test]
    fn project_file_is_found_in_ancestors() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("src").join("lib");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join(PROJECT_FILE_NAME), "").unwrap();

        let found = ConfigManager::find_project_file(&nested).unwrap();
        assert_eq!(found, temp.path().join(PROJECT_FILE_NAME));
    }

    #[test]
    fn root_build_dir_prefers_config() {
        let mut config = Config::default();
        assert_eq!(
            ConfigManager::root_build_dir(&config),
            ConfigManager::default_root_build_dir()
        );

        config.build.root_build_dir = Some(PathBuf::from("/tmp/builds"));
        assert_eq!(
            ConfigManager::root_build_dir(&config),
            PathBuf::from("/tmp/builds")
        );
    }
}
