//! Autotools builder: bootstrap, configure, make
//!
//! Flag and target queries are answered from a [`Makecache`] shared through
//! the project's makecache [`TaskCache`]. Populating it runs an internal
//! configure-only build followed by a make database dump.

use super::process::run_stage;
use super::{BuildFlags, BuildRequest, BuildTask, Builder, TaskOutcome};
use crate::cache::{Completion, TaskCache};
use crate::error::{AutobuildError, AutobuildResult};
use crate::makecache::{BuildTarget, Makecache};
use crate::project::{ConfigKey, Configuration, ProcessSpec, ProjectContext, Runtime};
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cache key identifying a configuration generation.
///
/// Equality and hashing use only the configuration id and sequence; the
/// configuration itself rides along so population can build it.
#[derive(Debug, Clone)]
pub struct MakecacheKey {
    key: ConfigKey,
    configuration: Arc<Configuration>,
}

impl MakecacheKey {
    /// Key for the current generation of `configuration`
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self {
            key: configuration.key(),
            configuration,
        }
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }
}

impl PartialEq for MakecacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MakecacheKey {}

impl Hash for MakecacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Builder for autoconf/automake projects
#[derive(Debug)]
pub struct AutotoolsBuilder {
    context: Arc<ProjectContext>,
    configuration: Arc<Configuration>,
    makecache: TaskCache<MakecacheKey, Makecache>,
}

impl AutotoolsBuilder {
    pub fn new(
        context: Arc<ProjectContext>,
        configuration: Arc<Configuration>,
        makecache: TaskCache<MakecacheKey, Makecache>,
    ) -> Self {
        Self {
            context,
            configuration,
            makecache,
        }
    }

    /// Whether configure must be regenerated before building.
    ///
    /// True when the project has no `configure` script or the configuration
    /// changed since the last bootstrap. The script's age relative to
    /// `configure.ac` is not checked.
    pub fn needs_bootstrap(&self) -> bool {
        !self.context.working_directory.join("configure").exists()
            || self.configuration.is_dirty()
    }

    /// Directory holding the generated Makefiles.
    ///
    /// A project already configured in-tree for the local device keeps
    /// building in place; otherwise builds go to
    /// `<root_build_dir>/<project_id>/<device_id>/<system_type>`.
    pub fn build_directory(&self) -> PathBuf {
        let device = self.configuration.device();

        if device.is_local() {
            let working_directory = &self.context.working_directory;
            if working_directory.join("Makefile").exists() {
                return working_directory.clone();
            }
        }

        self.context.out_of_tree_directory(&device)
    }

    fn start(&self, mut flags: BuildFlags, install: bool, cancel: CancellationToken) -> BuildRequest {
        if self.needs_bootstrap() {
            flags |= BuildFlags::FORCE_BOOTSTRAP;
        }

        let targets = if install {
            vec!["install".to_string()]
        } else {
            Vec::new()
        };
        let task = Arc::new(BuildTask::new(
            Arc::clone(&self.configuration),
            self.build_directory(),
            install,
            targets,
            cancel,
        ));

        let pipeline = Pipeline {
            context: Arc::clone(&self.context),
            task: Arc::clone(&task),
            flags,
            makecache: self.makecache.clone(),
        };
        BuildRequest::spawn(task, pipeline.run())
    }

    async fn makecache(&self, cancel: &CancellationToken) -> AutobuildResult<Arc<Makecache>> {
        self.context
            .runtimes
            .resolve(&self.configuration.runtime_id())?;

        let key = MakecacheKey::new(Arc::clone(&self.configuration));
        self.makecache.get(&key, false, cancel).await
    }

    /// Populate callback for the makecache [`TaskCache`]
    pub(crate) fn populate(
        context: Arc<ProjectContext>,
    ) -> impl Fn(TaskCache<MakecacheKey, Makecache>, MakecacheKey, Completion<MakecacheKey, Makecache>)
           + Send
           + Sync
           + 'static {
        move |cache, key, completion| {
            let builder = AutotoolsBuilder::new(Arc::clone(&context), key.configuration, cache);
            tokio::spawn(async move {
                let cancel = completion.cancellation().clone();
                let result = builder.load_makecache(&cancel).await;
                completion.complete(result);
            });
        }
    }

    /// Configure the project without building, then read its make database
    async fn load_makecache(&self, cancel: &CancellationToken) -> AutobuildResult<Makecache> {
        debug!("Populating makecache for {}", self.configuration.key());

        let runtime = self
            .context
            .runtimes
            .resolve(&self.configuration.runtime_id())?;

        let task = self.build(BuildFlags::NO_BUILD, cancel.clone()).finish().await?;
        let makefile = task.directory().join("Makefile");

        Makecache::new_for_makefile(
            runtime,
            &self.context.toolchain.make,
            &makefile,
            &self.configuration.env(),
            cancel,
        )
        .await
    }

    fn absolute(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.context.working_directory.join(file)
        }
    }
}

#[async_trait]
impl Builder for AutotoolsBuilder {
    fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    fn build(&self, flags: BuildFlags, cancel: CancellationToken) -> BuildRequest {
        self.start(flags, false, cancel)
    }

    fn install(&self, cancel: CancellationToken) -> BuildRequest {
        self.start(BuildFlags::empty(), true, cancel)
    }

    async fn build_flags(
        &self,
        file: &Path,
        cancel: &CancellationToken,
    ) -> AutobuildResult<Vec<String>> {
        let makecache = self.makecache(cancel).await?;
        Ok(makecache.build_flags(&self.absolute(file)))
    }

    async fn build_targets(&self, cancel: &CancellationToken) -> AutobuildResult<Vec<BuildTarget>> {
        let makecache = self.makecache(cancel).await?;
        Ok(makecache.build_targets())
    }
}

/// One run of the bootstrap, configure, make sequence
struct Pipeline {
    context: Arc<ProjectContext>,
    task: Arc<BuildTask>,
    flags: BuildFlags,
    makecache: TaskCache<MakecacheKey, Makecache>,
}

impl Pipeline {
    /// Run all stages and record the outcome on the task before returning
    async fn run(self) -> AutobuildResult<()> {
        let result = self.execute().await;

        let outcome = match &result {
            Ok(()) => TaskOutcome::Succeeded,
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(_) => TaskOutcome::Failed,
        };
        self.task.finish(outcome);
        info!(
            "{} for {}: {}",
            self.task.mode(),
            self.task.configuration().id(),
            self.task.directory().display()
        );

        result
    }

    async fn execute(&self) -> AutobuildResult<()> {
        let configuration = self.task.configuration();
        let runtime = self.context.runtimes.resolve(&configuration.runtime_id())?;
        let cancel = self.task.cancellation();
        let build_dir = self.task.directory();

        tokio::fs::create_dir_all(build_dir).await.map_err(|e| {
            AutobuildError::io(format!("creating build directory {}", build_dir.display()), e)
        })?;

        let bootstrapped = self.flags.contains(BuildFlags::FORCE_BOOTSTRAP);
        if bootstrapped {
            self.bootstrap(runtime.as_ref(), cancel).await?;
        }

        let makefile = build_dir.join("Makefile");
        if !self.flags.contains(BuildFlags::NO_CONFIGURE) && (bootstrapped || !makefile.exists()) {
            self.configure(runtime.as_ref(), cancel).await?;
        }

        if self.flags.contains(BuildFlags::NO_BUILD) {
            return Ok(());
        }

        if self.flags.contains(BuildFlags::FORCE_CLEAN) && makefile.exists() {
            let spec = self.make_spec().args(["clean"]);
            self.stage(runtime.as_ref(), "Clean", &spec, cancel).await?;
        }

        let spec = self
            .make_spec()
            .args([format!("-j{}", self.context.jobs.max(1))])
            .args(self.task.targets().iter().cloned());
        let stage = if self.task.is_install() { "Install" } else { "Build" };
        self.stage(runtime.as_ref(), stage, &spec, cancel).await?;

        self.postbuild();
        Ok(())
    }

    /// Generate `configure` with the project's autogen script or autoreconf
    async fn bootstrap(&self, runtime: &dyn Runtime, cancel: &CancellationToken) -> AutobuildResult<()> {
        let working_directory = &self.context.working_directory;
        let toolchain = &self.context.toolchain;
        let configuration = self.task.configuration();

        let autogen = working_directory.join(&toolchain.autogen);
        let spec = if autogen.is_file() {
            ProcessSpec::new(autogen.display().to_string(), working_directory)
                .envs(&configuration.env())
                .env("NOCONFIGURE", "1")
        } else {
            let (program, args) = toolchain.autoreconf.split_first().ok_or_else(|| {
                AutobuildError::User("toolchain.autoreconf must name a program".to_string())
            })?;
            ProcessSpec::new(program.clone(), working_directory)
                .args(args.iter().cloned())
                .envs(&configuration.env())
        };

        self.stage(runtime, "Bootstrap", &spec, cancel).await?;
        configuration.set_dirty(false);
        Ok(())
    }

    async fn configure(&self, runtime: &dyn Runtime, cancel: &CancellationToken) -> AutobuildResult<()> {
        let working_directory = &self.context.working_directory;
        let configuration = self.task.configuration();

        let mut args = Vec::new();
        if let Some(prefix) = configuration.prefix() {
            args.push(format!("--prefix={}", prefix.display()));
        }
        args.extend(configuration.config_opts());
        args.extend(self.context.toolchain.configure_args.iter().cloned());

        let spec = ProcessSpec::new(
            working_directory.join("configure").display().to_string(),
            self.task.directory(),
        )
        .args(args)
        .envs(&configuration.env())
        .path(working_directory);

        self.stage(runtime, "Configure", &spec, cancel).await
    }

    fn make_spec(&self) -> ProcessSpec {
        ProcessSpec::new(self.context.toolchain.make.clone(), self.task.directory())
            .envs(&self.task.configuration().env())
            .path(&self.context.working_directory)
    }

    async fn stage(
        &self,
        runtime: &dyn Runtime,
        stage: &str,
        spec: &ProcessSpec,
        cancel: &CancellationToken,
    ) -> AutobuildResult<()> {
        info!("{}: {}", stage, spec.display());
        self.task.set_stage(stage);
        let task = &self.task;
        run_stage(runtime, stage, spec, cancel, &|line| task.push_output(line)).await
    }

    /// After a real build the cached metadata may be stale
    fn postbuild(&self) {
        let key = MakecacheKey::new(Arc::clone(self.task.configuration()));
        if self.makecache.evict(&key) {
            debug!("Evicted makecache for {}", key.key());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::config::schema::ToolchainConfig;
    use crate::project::Device;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        root: PathBuf,
        log: PathBuf,
        context: Arc<ProjectContext>,
    }

    /// A project whose toolchain is replaced by shell scripts that log
    /// their invocation
    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("myproj");
        let root = temp.path().join("root");
        let bin = temp.path().join("bin");
        let log = temp.path().join("log");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(&log, "").unwrap();

        script(
            &source.join("autogen.sh"),
            &format!(
                "echo \"autogen NOCONFIGURE=$NOCONFIGURE\" >> {log}\n\
                 cat > configure <<'EOF'\n#!/bin/sh\n\
                 echo \"configure $*\" >> {log}\n\
                 printf 'CFLAGS = -O2\\n' > Makefile\nEOF\n\
                 chmod +x configure",
                log = log.display()
            ),
        );
        script(
            &bin.join("make"),
            &format!(
                "echo \"make $*\" >> {log}\n\
                 if [ \"$1\" = \"-p\" ]; then\n\
                 echo '# Make data base'\n\
                 echo '# Variables'\n\
                 echo \"abs_srcdir = {src}\"\n\
                 echo 'AM_CFLAGS = -Wall'\n\
                 echo 'CFLAGS = -O2'\n\
                 echo 'bindir = /usr/bin'\n\
                 echo 'bin_PROGRAMS = myproj'\n\
                 echo 'myproj_SOURCES = main.c'\n\
                 fi\n\
                 [ -z \"$FAIL_MAKE\" ] || exit 2",
                log = log.display(),
                src = source.display()
            ),
        );

        let mut context = ProjectContext::new("myproj", &source, &root);
        context.toolchain = ToolchainConfig {
            make: bin.join("make").display().to_string(),
            ..ToolchainConfig::default()
        };
        context.jobs = 2;

        Fixture {
            _temp: temp,
            source,
            root,
            log,
            context: Arc::new(context),
        }
    }

    fn cache(context: &Arc<ProjectContext>) -> TaskCache<MakecacheKey, Makecache> {
        TaskCache::new("makecache", DEFAULT_TTL, AutotoolsBuilder::populate(Arc::clone(context)))
    }

    fn builder_for(fixture: &Fixture, configuration: Configuration) -> AutotoolsBuilder {
        let context = Arc::clone(&fixture.context);
        AutotoolsBuilder::new(Arc::clone(&context), Arc::new(configuration), cache(&context))
    }

    fn log_lines(fixture: &Fixture) -> Vec<String> {
        std::fs::read_to_string(&fixture.log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn bootstrap_decision() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));

        // no configure script
        assert!(builder.needs_bootstrap());

        script(&fixture.source.join("configure"), "exit 0");
        assert!(!builder.needs_bootstrap());

        builder.configuration().set_dirty(true);
        assert!(builder.needs_bootstrap());
    }

    #[test]
    fn build_directory_resolution() {
        let fixture = fixture();
        let local = builder_for(
            &fixture,
            Configuration::new("debug", Device::new("local", "host"), "host"),
        );
        let remote = builder_for(
            &fixture,
            Configuration::new("debug", Device::new("board", "aarch64-linux"), "host"),
        );

        assert_eq!(local.build_directory(), fixture.root.join("myproj/local/host"));
        assert_eq!(
            remote.build_directory(),
            fixture.root.join("myproj/board/aarch64-linux")
        );

        std::fs::write(fixture.source.join("Makefile"), "all:\n").unwrap();
        assert_eq!(local.build_directory(), fixture.source);
        assert_eq!(
            remote.build_directory(),
            fixture.root.join("myproj/board/aarch64-linux")
        );
    }

    #[tokio::test]
    async fn build_forces_bootstrap_without_configure() {
        let fixture = fixture();
        let configuration = Configuration::new("debug", Device::new("local", "host"), "host")
            .with_prefix(Some(PathBuf::from("/opt/myproj")));
        configuration.set_dirty(true);
        assert_eq!(configuration.sequence(), 1);
        let builder = builder_for(&fixture, configuration);

        let request = builder.build(BuildFlags::empty(), CancellationToken::new());
        let task = request.finish().await.unwrap();

        let build_dir = fixture.root.join("myproj/local/host");
        assert_eq!(task.directory(), build_dir);
        assert_eq!(task.mode(), "Build successful");
        assert!(!task.is_running());
        assert!(build_dir.join("Makefile").is_file());
        assert!(!builder.configuration().is_dirty());

        assert_eq!(
            log_lines(&fixture),
            vec![
                "autogen NOCONFIGURE=1".to_string(),
                "configure --prefix=/opt/myproj".to_string(),
                "make -j2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn second_build_skips_bootstrap_and_configure() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));

        builder
            .build(BuildFlags::empty(), CancellationToken::new())
            .finish()
            .await
            .unwrap();
        builder
            .build(BuildFlags::FORCE_CLEAN, CancellationToken::new())
            .finish()
            .await
            .unwrap();

        let log = log_lines(&fixture);
        assert_eq!(log.iter().filter(|l| l.starts_with("autogen")).count(), 1);
        assert_eq!(log.iter().filter(|l| l.starts_with("configure")).count(), 1);
        assert_eq!(&log[log.len() - 2..], ["make clean", "make -j2"]);
    }

    #[tokio::test]
    async fn install_runs_install_target() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));

        let request = builder.install(CancellationToken::new());
        assert!(request.task().is_install());
        let task = request.finish().await.unwrap();

        assert_eq!(task.mode(), "Install successful");
        assert_eq!(log_lines(&fixture).last().unwrap(), "make -j2 install");
    }

    #[tokio::test]
    async fn no_build_stops_after_configure() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));

        builder
            .build(BuildFlags::NO_BUILD, CancellationToken::new())
            .finish()
            .await
            .unwrap();

        assert!(log_lines(&fixture).iter().all(|l| !l.starts_with("make")));
    }

    #[tokio::test]
    async fn failed_stage_reports_process_failure() {
        let fixture = fixture();
        let configuration = Configuration::new("debug", Device::local(), "host")
            .with_env([("FAIL_MAKE".to_string(), "1".to_string())].into());
        let builder = builder_for(&fixture, configuration);

        let request = builder.build(BuildFlags::empty(), CancellationToken::new());
        let task = Arc::clone(request.task());
        let err = request.finish().await.unwrap_err();

        assert!(matches!(err, AutobuildError::ProcessFailed { ref stage, code: 2, .. } if stage == "Build"));
        assert_eq!(task.mode(), "Build failed");
        assert_eq!(task.outcome(), Some(TaskOutcome::Failed));
    }

    #[tokio::test]
    async fn cancellation_aborts_running_stage() {
        let fixture = fixture();
        script(&fixture.source.join("autogen.sh"), "sleep 30");
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));

        let cancel = CancellationToken::new();
        let request = builder.build(BuildFlags::empty(), cancel.clone());
        let task = Arc::clone(request.task());

        let mut state = task.subscribe();
        while state.borrow().stage.is_none() {
            state.changed().await.unwrap();
        }
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(10), request.finish())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(task.mode(), "Build cancelled");
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn missing_runtime_fails_fast() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "flatpak"));

        let err = builder
            .build_flags(Path::new("main.c"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AutobuildError::RuntimeMissing(ref id) if id == "flatpak"));

        let err = builder
            .install(CancellationToken::new())
            .finish()
            .await
            .unwrap_err();
        assert!(matches!(err, AutobuildError::RuntimeMissing(_)));
        assert!(log_lines(&fixture).is_empty());
    }

    #[tokio::test]
    async fn flags_and_targets_come_from_makecache() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));
        let cancel = CancellationToken::new();

        let flags = builder.build_flags(Path::new("main.c"), &cancel).await.unwrap();
        assert_eq!(flags, vec!["-Wall", "-O2"]);

        let targets = builder.build_targets(&cancel).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "myproj");
        assert_eq!(targets[0].install_directory, Some(PathBuf::from("/usr/bin")));

        // second query is served from the cache
        let log = log_lines(&fixture);
        assert_eq!(log.iter().filter(|l| l.starts_with("make -p")).count(), 1);
        assert!(log.iter().all(|l| !l.starts_with("make -j")));
    }

    #[tokio::test]
    async fn equal_configurations_share_one_makecache() {
        let fixture = fixture();
        let context = Arc::clone(&fixture.context);
        let makecache = cache(&context);
        let first = AutotoolsBuilder::new(
            Arc::clone(&context),
            Arc::new(Configuration::new("debug", Device::local(), "host")),
            makecache.clone(),
        );
        let second = AutotoolsBuilder::new(
            Arc::clone(&context),
            Arc::new(Configuration::new("debug", Device::local(), "host")),
            makecache.clone(),
        );
        let cancel = CancellationToken::new();
        let dumps = || {
            log_lines(&fixture)
                .iter()
                .filter(|l| l.starts_with("make -p"))
                .count()
        };

        first.build_flags(Path::new("main.c"), &cancel).await.unwrap();
        second.build_flags(Path::new("main.c"), &cancel).await.unwrap();
        assert_eq!(dumps(), 1);
        assert_eq!(makecache.len(), 1);

        // a new generation misses even though the id is unchanged
        second.configuration().set_dirty(true);
        let flags = second.build_flags(Path::new("main.c"), &cancel).await.unwrap();
        assert_eq!(flags, vec!["-Wall", "-O2"]);
        assert_eq!(dumps(), 2);
    }

    #[tokio::test]
    async fn real_build_evicts_makecache() {
        let fixture = fixture();
        let builder = builder_for(&fixture, Configuration::new("debug", Device::local(), "host"));
        let cancel = CancellationToken::new();

        builder.build_targets(&cancel).await.unwrap();
        assert_eq!(builder.makecache.len(), 1);

        builder
            .build(BuildFlags::empty(), cancel.clone())
            .finish()
            .await
            .unwrap();
        assert!(builder.makecache.is_empty());
    }

    #[test]
    fn keys_compare_by_configuration_identity() {
        let a = Arc::new(Configuration::new("debug", Device::local(), "host"));
        let b = Arc::new(Configuration::new("debug", Device::new("board", "arm"), "host"));
        assert_eq!(MakecacheKey::new(Arc::clone(&a)), MakecacheKey::new(Arc::clone(&b)));

        b.set_dirty(true);
        assert_ne!(MakecacheKey::new(a), MakecacheKey::new(b));
    }
}
