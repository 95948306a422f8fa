//! Project file (`autobuild.toml`) describing build configurations

use crate::project::configuration::{host_system_type, Configuration, Device};
use crate::project::runtime::HOST_RUNTIME_ID;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File name looked up in the project tree
pub const PROJECT_FILE_NAME: &str = "autobuild.toml";

/// Identifier of the configuration used when none is declared
pub const DEFAULT_CONFIGURATION_ID: &str = "default";

/// Contents of `autobuild.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
    /// Project identity
    pub project: ProjectSection,

    /// Declared build configurations
    #[serde(rename = "configuration")]
    pub configurations: Vec<ConfigurationEntry>,
}

/// `[project]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Project id used in build directory paths
    pub id: Option<String>,

    /// Configuration used when none is requested
    pub default_configuration: Option<String>,
}

/// One `[[configuration]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationEntry {
    pub id: String,

    #[serde(default = "default_device")]
    pub device: String,

    /// System type for the device; the host's for the local device
    #[serde(default)]
    pub system_type: Option<String>,

    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default)]
    pub prefix: Option<PathBuf>,

    #[serde(default)]
    pub config_opts: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_device() -> String {
    Device::LOCAL_ID.to_string()
}

fn default_runtime() -> String {
    HOST_RUNTIME_ID.to_string()
}

impl ConfigurationEntry {
    /// Build a fresh, clean configuration from this entry
    pub fn to_configuration(&self) -> Configuration {
        let system_type = self
            .system_type
            .clone()
            .unwrap_or_else(host_system_type);
        Configuration::new(
            self.id.clone(),
            Device::new(self.device.clone(), system_type),
            self.runtime.clone(),
        )
        .with_prefix(self.prefix.clone())
        .with_config_opts(self.config_opts.clone())
        .with_env(self.env.clone())
    }
}

impl ProjectFile {
    /// Resolve the configuration `id`, or the default one when `None`.
    ///
    /// Without declared configurations a `default` configuration on the
    /// local device and host runtime is synthesized.
    pub fn configuration(&self, id: Option<&str>) -> Option<Configuration> {
        if self.configurations.is_empty() {
            return match id {
                None | Some(DEFAULT_CONFIGURATION_ID) => Some(Configuration::new(
                    DEFAULT_CONFIGURATION_ID,
                    Device::local(),
                    HOST_RUNTIME_ID,
                )),
                Some(_) => None,
            };
        }

        let wanted = id.or(self.project.default_configuration.as_deref());
        let entry = match wanted {
            Some(wanted) => self.configurations.iter().find(|c| c.id == wanted)?,
            None => self.configurations.first()?,
        };
        Some(entry.to_configuration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_project_synthesizes_default_configuration() {
        let project = ProjectFile::default();
        let config = project.configuration(None).unwrap();
        assert_eq!(config.id(), DEFAULT_CONFIGURATION_ID);
        assert!(config.device().is_local());
        assert_eq!(config.runtime_id(), HOST_RUNTIME_ID);
        assert!(project.configuration(Some("release")).is_none());
    }

    #[test]
    fn declared_configurations_are_resolved() {
        let toml = r#"
            [project]
            id = "gnome-calculator"
            default_configuration = "release"

            [[configuration]]
            id = "debug"
            config_opts = ["--enable-debug"]

            [[configuration]]
            id = "release"
            device = "board"
            system_type = "aarch64-linux"
            runtime = "fedora"
            prefix = "/usr"
            env = { CFLAGS = "-O2" }
        "#;
        let project: ProjectFile = toml::from_str(toml).unwrap();

        let release = project.configuration(None).unwrap();
        assert_eq!(release.id(), "release");
        assert_eq!(release.device(), Device::new("board", "aarch64-linux"));
        assert_eq!(release.runtime_id(), "fedora");
        assert_eq!(release.prefix(), Some(PathBuf::from("/usr")));
        assert_eq!(release.sequence(), 0);
        assert!(!release.is_dirty());

        let debug = project.configuration(Some("debug")).unwrap();
        assert_eq!(debug.config_opts(), vec!["--enable-debug"]);
        assert!(debug.device().is_local());
        assert!(project.configuration(Some("missing")).is_none());
    }
}
