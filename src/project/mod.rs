//! Project context shared by every builder of one project

pub mod configuration;
pub mod runtime;

pub use configuration::{host_system_type, ConfigKey, Configuration, Device};
pub use runtime::{
    HostRuntime, PodmanRuntime, ProcessSpec, Runtime, RuntimeManager, HOST_RUNTIME_ID,
};

use crate::config::schema::{Config, ToolchainConfig};
use crate::config::ConfigManager;
use std::path::{Path, PathBuf};

/// Everything a builder needs to know about the project it builds
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Project identifier, used in out-of-tree build paths
    pub project_id: String,
    /// Project source root
    pub working_directory: PathBuf,
    /// Root of out-of-tree build directories
    pub root_build_dir: PathBuf,
    /// Runtimes configurations may refer to
    pub runtimes: RuntimeManager,
    /// Toolchain programs
    pub toolchain: ToolchainConfig,
    /// Parallel make jobs
    pub jobs: usize,
}

impl ProjectContext {
    /// Create a context with default toolchain settings and the host runtime
    pub fn new(
        project_id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        root_build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            working_directory: working_directory.into(),
            root_build_dir: root_build_dir.into(),
            runtimes: RuntimeManager::new(),
            toolchain: ToolchainConfig::default(),
            jobs: 1,
        }
    }

    /// Create a context from the global configuration.
    ///
    /// `project_id` falls back to the working directory's name.
    pub fn from_config(
        config: &Config,
        working_directory: &Path,
        project_id: Option<String>,
    ) -> Self {
        let project_id = project_id.unwrap_or_else(|| default_project_id(working_directory));
        Self {
            project_id,
            working_directory: working_directory.to_path_buf(),
            root_build_dir: ConfigManager::root_build_dir(config),
            runtimes: RuntimeManager::from_specs(&config.runtimes),
            toolchain: config.toolchain.clone(),
            jobs: config.build.effective_jobs(),
        }
    }

    /// Out-of-tree build directory for a device:
    /// `<root_build_dir>/<project_id>/<device_id>/<system_type>`
    pub fn out_of_tree_directory(&self, device: &Device) -> PathBuf {
        self.root_build_dir
            .join(&self.project_id)
            .join(&device.id)
            .join(&device.system_type)
    }
}

fn default_project_id(working_directory: &Path) -> String {
    working_directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_tree_directory_layout() {
        let ctx = ProjectContext::new("myproj", "/src/myproj", "/builds");
        let dir = ctx.out_of_tree_directory(&Device::new("local", "host"));
        assert_eq!(dir, PathBuf::from("/builds/myproj/local/host"));
    }

    #[test]
    fn project_id_defaults_to_directory_name() {
        let ctx = ProjectContext::from_config(&Config::default(), Path::new("/src/gedit"), None);
        assert_eq!(ctx.project_id, "gedit");

        let ctx = ProjectContext::from_config(
            &Config::default(),
            Path::new("/src/gedit"),
            Some("org.gnome.gedit".to_string()),
        );
        assert_eq!(ctx.project_id, "org.gnome.gedit");
    }
}
