//! Build subsystem owning the project context and the makecache

use super::{AnyBuilder, AutotoolsBuilder, BuildSystemKind, MakecacheKey, SimpleBuilder};
use crate::cache::TaskCache;
use crate::makecache::Makecache;
use crate::project::{Configuration, ProjectContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Entry point of the build subsystem.
///
/// Created once per project. Builders handed out share the makecache, so
/// flag queries from any of them reuse each other's results. Call
/// [`BuildManager::shutdown`] when the project closes.
#[derive(Debug)]
pub struct BuildManager {
    context: Arc<ProjectContext>,
    build_system: BuildSystemKind,
    makecache: TaskCache<MakecacheKey, Makecache>,
}

impl BuildManager {
    /// Create the subsystem, detecting the project's build system
    pub fn new(context: ProjectContext, makecache_ttl: Duration) -> Self {
        let build_system = BuildSystemKind::detect(&context.working_directory);
        Self::with_build_system(context, build_system, makecache_ttl)
    }

    /// Create the subsystem for a known build system
    pub fn with_build_system(
        context: ProjectContext,
        build_system: BuildSystemKind,
        makecache_ttl: Duration,
    ) -> Self {
        let context = Arc::new(context);
        let makecache = TaskCache::new(
            "makecache",
            makecache_ttl,
            AutotoolsBuilder::populate(Arc::clone(&context)),
        );

        info!(
            "{} project {} at {}",
            build_system.name(),
            context.project_id,
            context.working_directory.display()
        );

        Self {
            context,
            build_system,
            makecache,
        }
    }

    pub fn context(&self) -> &Arc<ProjectContext> {
        &self.context
    }

    pub fn build_system(&self) -> BuildSystemKind {
        self.build_system
    }

    /// Shared build metadata cache
    pub fn makecache(&self) -> &TaskCache<MakecacheKey, Makecache> {
        &self.makecache
    }

    /// Builder for `configuration` matching the project's build system
    pub fn builder(&self, configuration: Arc<Configuration>) -> AnyBuilder {
        debug!(
            "Creating {} builder for {}",
            self.build_system.name(),
            configuration.key()
        );
        match self.build_system {
            BuildSystemKind::Simple => {
                AnyBuilder::Simple(SimpleBuilder::new(Arc::clone(&self.context), configuration))
            }
            BuildSystemKind::Autotools => AnyBuilder::Autotools(AutotoolsBuilder::new(
                Arc::clone(&self.context),
                configuration,
                self.makecache.clone(),
            )),
        }
    }

    /// Cancel in-flight metadata extraction and drop cached metadata
    pub fn shutdown(&self) {
        self.makecache.shutdown();
        info!("Build subsystem for {} shut down", self.context.project_id);
    }
}
