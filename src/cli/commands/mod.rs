//! CLI command implementations

pub mod build;
pub mod config;
pub mod flags;
pub mod settings;
pub mod targets;

pub use build::{execute as build, install};
pub use config::execute as config;
pub use flags::execute as flags;
pub use settings::execute as settings;
pub use targets::execute as targets;

use crate::builder::{AnyBuilder, BuildManager};
use crate::cli::args::ProjectArgs;
use crate::config::{Config, ConfigManager, ProjectFile};
use crate::error::{AutobuildError, AutobuildResult};
use crate::project::ProjectContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The project a command operates on
pub(crate) struct Workspace {
    pub manager: BuildManager,
    pub builder: AnyBuilder,
}

impl Workspace {
    /// Locate the project, resolve the requested configuration and create
    /// its builder.
    ///
    /// The project root is the directory holding `autobuild.toml`, or the
    /// starting directory when there is none.
    pub async fn open(args: &ProjectArgs, config: &Config) -> AutobuildResult<Self> {
        let start = match args.project {
            Some(ref dir) => absolute(dir)?,
            None => current_dir()?,
        };

        let (root, project) = match ConfigManager::find_project_file(&start) {
            Some(path) => {
                debug!("Found project file: {}", path.display());
                let project = ConfigManager::load_project(&path).await?;
                let root = path.parent().map(Path::to_path_buf).unwrap_or(start);
                (root, project)
            }
            None => (start, ProjectFile::default()),
        };

        let configuration = project
            .configuration(args.configuration.as_deref())
            .ok_or_else(|| {
                AutobuildError::ConfigurationNotFound(
                    args.configuration
                        .clone()
                        .unwrap_or_else(|| "default".to_string()),
                )
            })?;

        let context = ProjectContext::from_config(config, &root, project.project.id.clone());
        let manager = BuildManager::new(
            context,
            Duration::from_secs(config.build.makecache_ttl_secs),
        );
        let builder = manager.builder(Arc::new(configuration));

        Ok(Self { manager, builder })
    }

    pub fn context(&self) -> &ProjectContext {
        self.manager.context()
    }
}

/// Token cancelled on Ctrl-C
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            guard.cancel();
        }
    });
    cancel
}

pub(crate) fn current_dir() -> AutobuildResult<PathBuf> {
    std::env::current_dir().map_err(|e| AutobuildError::io("getting current directory", e))
}

pub(crate) fn absolute(path: &Path) -> AutobuildResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| AutobuildError::io(format!("resolving {}", path.display()), e))
}
