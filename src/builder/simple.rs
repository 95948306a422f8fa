//! Builder for projects without a distinct build step

use super::{BuildFlags, BuildRequest, BuildTask, Builder, TaskOutcome};
use crate::error::{AutobuildError, AutobuildResult};
use crate::makecache::BuildTarget;
use crate::project::{Configuration, ProjectContext};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Succeeds immediately without running anything.
///
/// Used for projects whose sources are used as-is (scripts, data).
#[derive(Debug)]
pub struct SimpleBuilder {
    context: Arc<ProjectContext>,
    configuration: Arc<Configuration>,
}

impl SimpleBuilder {
    pub fn new(context: Arc<ProjectContext>, configuration: Arc<Configuration>) -> Self {
        Self {
            context,
            configuration,
        }
    }

    fn start(&self, install: bool, cancel: CancellationToken) -> BuildRequest {
        let targets = if install {
            vec!["install".to_string()]
        } else {
            Vec::new()
        };
        let task = Arc::new(BuildTask::new(
            Arc::clone(&self.configuration),
            self.context.working_directory.clone(),
            install,
            targets,
            cancel,
        ));

        let pipeline_task = Arc::clone(&task);
        BuildRequest::spawn(task, async move {
            if pipeline_task.cancellation().is_cancelled() {
                pipeline_task.finish(TaskOutcome::Cancelled);
                return Err(AutobuildError::Cancelled);
            }
            debug!("Nothing to build for {}", pipeline_task.configuration().id());
            pipeline_task.finish(TaskOutcome::Succeeded);
            Ok(())
        })
    }
}

#[async_trait]
impl Builder for SimpleBuilder {
    fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    fn build(&self, _flags: BuildFlags, cancel: CancellationToken) -> BuildRequest {
        self.start(false, cancel)
    }

    fn install(&self, cancel: CancellationToken) -> BuildRequest {
        self.start(true, cancel)
    }

    async fn build_flags(
        &self,
        _file: &Path,
        _cancel: &CancellationToken,
    ) -> AutobuildResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn build_targets(&self, _cancel: &CancellationToken) -> AutobuildResult<Vec<BuildTarget>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Device;

    fn builder() -> SimpleBuilder {
        let context = Arc::new(ProjectContext::new("scripts", "/src/scripts", "/builds"));
        let configuration = Arc::new(Configuration::new("default", Device::local(), "host"));
        SimpleBuilder::new(context, configuration)
    }

    #[tokio::test]
    async fn build_succeeds_in_working_directory() {
        let request = builder().build(BuildFlags::FORCE_BOOTSTRAP, CancellationToken::new());
        let task = request.finish().await.unwrap();
        assert_eq!(task.mode(), "Build successful");
        assert!(!task.is_running());
        assert_eq!(task.directory(), Path::new("/src/scripts"));
    }

    #[tokio::test]
    async fn install_targets_install() {
        let request = builder().install(CancellationToken::new());
        assert_eq!(request.task().targets(), ["install"]);
        let task = request.finish().await.unwrap();
        assert_eq!(task.mode(), "Install successful");
    }

    #[tokio::test]
    async fn queries_are_empty() {
        let builder = builder();
        let cancel = CancellationToken::new();
        assert!(builder.build_flags(Path::new("main.py"), &cancel).await.unwrap().is_empty());
        assert!(builder.build_targets(&cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = builder().build(BuildFlags::empty(), cancel);
        let task = Arc::clone(request.task());
        let err = request.finish().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(task.mode(), "Build cancelled");
    }
}
