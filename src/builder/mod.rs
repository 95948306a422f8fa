//! Builders drive a project's build toolchain
//!
//! Every build system implements the same [`Builder`] contract. The set of
//! implementations is closed: [`AnyBuilder`] picks one when a configuration
//! is bound and dispatches statically.
//!
//! | Build system | Detected by                                   | Builder             |
//! |--------------|-----------------------------------------------|---------------------|
//! | Autotools    | `configure.ac`, `configure.in` or `configure` | [`AutotoolsBuilder`] |
//! | Simple       | anything else                                 | [`SimpleBuilder`]    |

mod autotools;
mod manager;
pub(crate) mod process;
mod simple;
mod task;

pub use autotools::{AutotoolsBuilder, MakecacheKey};
pub use manager::BuildManager;
pub use simple::SimpleBuilder;
pub use task::{BuildTask, TaskOutcome, TaskState, MODE_BUILDING};

use crate::error::{AutobuildError, AutobuildResult};
use crate::makecache::BuildTarget;
use crate::project::Configuration;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

bitflags::bitflags! {
    /// Adjustments to a build pipeline run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BuildFlags: u32 {
        /// Regenerate the configure script even if it exists
        const FORCE_BOOTSTRAP = 1 << 0;
        /// Run `make clean` before building
        const FORCE_CLEAN = 1 << 1;
        /// Stop after configure
        const NO_BUILD = 1 << 2;
        /// Skip the configure stage
        const NO_CONFIGURE = 1 << 3;
    }
}

/// An in-flight build or install.
///
/// The task is available right away for observers; the terminal result is
/// delivered by [`BuildRequest::finish`].
#[derive(Debug)]
pub struct BuildRequest {
    task: Arc<BuildTask>,
    handle: JoinHandle<AutobuildResult<()>>,
}

impl BuildRequest {
    /// Run `pipeline` in the background for `task`
    pub(crate) fn spawn<F>(task: Arc<BuildTask>, pipeline: F) -> Self
    where
        F: Future<Output = AutobuildResult<()>> + Send + 'static,
    {
        Self {
            task,
            handle: tokio::spawn(pipeline),
        }
    }

    /// The task being run
    pub fn task(&self) -> &Arc<BuildTask> {
        &self.task
    }

    /// Cancel the run
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Wait for the terminal result
    pub async fn finish(self) -> AutobuildResult<Arc<BuildTask>> {
        match self.handle.await {
            Ok(Ok(())) => Ok(self.task),
            Ok(Err(e)) => Err(e),
            Err(join_error) => {
                if self.task.is_running() {
                    self.task.finish(TaskOutcome::Failed);
                }
                Err(AutobuildError::Internal(format!(
                    "build pipeline aborted: {}",
                    join_error
                )))
            }
        }
    }
}

/// Contract shared by all build systems
#[async_trait]
pub trait Builder: Send + Sync {
    /// Configuration this builder was bound to
    fn configuration(&self) -> &Arc<Configuration>;

    /// Start a build
    fn build(&self, flags: BuildFlags, cancel: CancellationToken) -> BuildRequest;

    /// Start an install, which builds the `install` target
    fn install(&self, cancel: CancellationToken) -> BuildRequest;

    /// Compiler flags applying to `file`
    async fn build_flags(
        &self,
        file: &Path,
        cancel: &CancellationToken,
    ) -> AutobuildResult<Vec<String>>;

    /// Installable targets of the project
    async fn build_targets(&self, cancel: &CancellationToken) -> AutobuildResult<Vec<BuildTarget>>;
}

/// Build systems autobuild knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystemKind {
    Simple,
    Autotools,
}

impl BuildSystemKind {
    /// Detect the build system of the project rooted at `working_directory`
    pub fn detect(working_directory: &Path) -> Self {
        let autotools = ["configure.ac", "configure.in", "configure"]
            .iter()
            .any(|name| working_directory.join(name).is_file());

        if autotools {
            BuildSystemKind::Autotools
        } else {
            BuildSystemKind::Simple
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            BuildSystemKind::Simple => "Simple",
            BuildSystemKind::Autotools => "Autotools",
        }
    }
}

/// A builder of any supported build system
#[derive(Debug)]
pub enum AnyBuilder {
    Simple(SimpleBuilder),
    Autotools(AutotoolsBuilder),
}

#[async_trait]
impl Builder for AnyBuilder {
    fn configuration(&self) -> &Arc<Configuration> {
        match self {
            AnyBuilder::Simple(b) => b.configuration(),
            AnyBuilder::Autotools(b) => b.configuration(),
        }
    }

    fn build(&self, flags: BuildFlags, cancel: CancellationToken) -> BuildRequest {
        match self {
            AnyBuilder::Simple(b) => b.build(flags, cancel),
            AnyBuilder::Autotools(b) => b.build(flags, cancel),
        }
    }

    fn install(&self, cancel: CancellationToken) -> BuildRequest {
        match self {
            AnyBuilder::Simple(b) => b.install(cancel),
            AnyBuilder::Autotools(b) => b.install(cancel),
        }
    }

    async fn build_flags(
        &self,
        file: &Path,
        cancel: &CancellationToken,
    ) -> AutobuildResult<Vec<String>> {
        match self {
            AnyBuilder::Simple(b) => b.build_flags(file, cancel).await,
            AnyBuilder::Autotools(b) => b.build_flags(file, cancel).await,
        }
    }

    async fn build_targets(&self, cancel: &CancellationToken) -> AutobuildResult<Vec<BuildTarget>> {
        match self {
            AnyBuilder::Simple(b) => b.build_targets(cancel).await,
            AnyBuilder::Autotools(b) => b.build_targets(cancel).await,
        }
    }
}
