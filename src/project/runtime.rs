//! Execution runtimes for toolchain processes
//!
//! A runtime decides how a toolchain program is launched:
//! - `host`: directly on this machine
//! - `podman`: inside a throwaway rootless Podman container

use crate::config::schema::{RuntimeKind, RuntimeSpec};
use crate::error::{AutobuildError, AutobuildResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Identifier of the runtime that runs processes directly
pub const HOST_RUNTIME_ID: &str = "host";

/// A program invocation, independent of where it runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program to execute
    pub program: String,
    /// Arguments after the program
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Additional paths the process must be able to see (source tree, ...)
    pub paths: Vec<PathBuf>,
}

impl ProcessSpec {
    /// Create a spec for `program` run in `cwd`
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variables
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set one environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Make another path visible to the process
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Abstract process runtime
///
/// Lets the build pipeline run the same toolchain steps on the host or in
/// an isolated environment.
#[async_trait]
pub trait Runtime: Send + Sync + fmt::Debug {
    /// Identifier configurations refer to
    fn id(&self) -> &str;

    /// Human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;

    /// Check if the runtime can run processes on this system
    async fn is_available(&self) -> bool;

    /// Build the command launching `spec` in this runtime.
    ///
    /// Standard streams are piped and the child is killed when the command
    /// handle is dropped.
    fn command(&self, spec: &ProcessSpec) -> Command;
}

/// Runs processes directly on the host
#[derive(Debug, Default)]
pub struct HostRuntime;

impl HostRuntime {
    /// Create a host runtime
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runtime for HostRuntime {
    fn id(&self) -> &str {
        HOST_RUNTIME_ID
    }

    fn runtime_name(&self) -> &'static str {
        "Host"
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn command(&self, spec: &ProcessSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Runs processes in a rootless Podman container from `image`
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    id: String,
    image: String,
}

impl PodmanRuntime {
    /// Create a Podman runtime
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
        }
    }

    /// Container image processes run in
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments for `podman run` that reproduce `spec` in a container.
    ///
    /// The working directory and every extra path are bind-mounted at the
    /// same location so paths written by configure stay valid on the host.
    fn podman_args(&self, spec: &ProcessSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        let mut mounts: Vec<&Path> = vec![spec.cwd.as_path()];
        for path in &spec.paths {
            if !mounts.iter().any(|m| path.starts_with(m)) {
                mounts.push(path);
            }
        }
        for mount in mounts {
            let mount = mount.display();
            args.push("-v".to_string());
            args.push(format!("{}:{}:z", mount, mount));
        }

        args.push("-w".to_string());
        args.push(spec.cwd.display().to_string());

        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(self.image.clone());
        args.push(spec.program.clone());
        args.extend(spec.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Runtime for PodmanRuntime {
    fn id(&self) -> &str {
        &self.id
    }

    fn runtime_name(&self) -> &'static str {
        "Podman"
    }

    async fn is_available(&self) -> bool {
        Command::new("podman")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self, spec: &ProcessSpec) -> Command {
        let args = self.podman_args(spec);
        debug!("Running in {}: podman {:?}", self.image, args);

        let mut cmd = Command::new("podman");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Registry resolving runtime ids to runtimes
#[derive(Debug, Clone)]
pub struct RuntimeManager {
    runtimes: HashMap<String, Arc<dyn Runtime>>,
}

impl RuntimeManager {
    /// Create a registry containing only the host runtime
    pub fn new() -> Self {
        let mut manager = Self {
            runtimes: HashMap::new(),
        };
        manager.register(Arc::new(HostRuntime::new()));
        manager
    }

    /// Create a registry with the host runtime and every configured runtime
    pub fn from_specs(specs: &BTreeMap<String, RuntimeSpec>) -> Self {
        let mut manager = Self::new();
        for (id, spec) in specs {
            match spec.kind {
                RuntimeKind::Podman => {
                    manager.register(Arc::new(PodmanRuntime::new(id.clone(), spec.image.clone())))
                }
            }
        }
        manager
    }

    /// Add or replace a runtime
    pub fn register(&mut self, runtime: Arc<dyn Runtime>) {
        self.runtimes.insert(runtime.id().to_string(), runtime);
    }

    /// Look up a runtime by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn Runtime>> {
        self.runtimes.get(id).cloned()
    }

    /// Look up a runtime, failing with [`AutobuildError::RuntimeMissing`]
    pub fn resolve(&self, id: &str) -> AutobuildResult<Arc<dyn Runtime>> {
        self.get(id)
            .ok_or_else(|| AutobuildError::RuntimeMissing(id.to_string()))
    }

    /// All registered runtimes, sorted by id
    pub fn list(&self) -> Vec<Arc<dyn Runtime>> {
        let mut runtimes: Vec<_> = self.runtimes.values().cloned().collect();
        runtimes.sort_by(|a, b| a.id().cmp(b.id()));
        runtimes
    }
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new()
    }
}
