//! Build configurations and target devices

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Device a configuration builds for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier ("local" for the machine running the build)
    pub id: String,
    /// System type used in the out-of-tree build path (e.g. "x86_64-linux")
    pub system_type: String,
}

impl Device {
    /// Identifier of the machine running autobuild
    pub const LOCAL_ID: &'static str = "local";

    /// Create a device description
    pub fn new(id: impl Into<String>, system_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_type: system_type.into(),
        }
    }

    /// The local machine, typed after the running host
    pub fn local() -> Self {
        Self::new(Self::LOCAL_ID, host_system_type())
    }

    /// Whether this is the local machine
    pub fn is_local(&self) -> bool {
        self.id == Self::LOCAL_ID
    }
}

/// System type of the running host, e.g. `x86_64-linux`
pub fn host_system_type() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Identity of a configuration generation
///
/// Two configurations with the same id and sequence are interchangeable for
/// caching, even when they are distinct objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    pub id: String,
    pub sequence: u64,
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.id, self.sequence)
    }
}

/// A named build variant.
///
/// Shared by reference between builders. Every mutation marks the
/// configuration dirty and bumps its sequence, which changes its
/// [`ConfigKey`] and so retires previously cached build metadata.
#[derive(Debug)]
pub struct Configuration {
    id: String,
    state: RwLock<ConfigurationState>,
}

#[derive(Debug, Clone)]
struct ConfigurationState {
    sequence: u64,
    dirty: bool,
    device: Device,
    runtime_id: String,
    prefix: Option<PathBuf>,
    config_opts: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Configuration {
    /// Create a clean configuration at sequence 0
    pub fn new(id: impl Into<String>, device: Device, runtime_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(ConfigurationState {
                sequence: 0,
                dirty: false,
                device,
                runtime_id: runtime_id.into(),
                prefix: None,
                config_opts: Vec::new(),
                env: BTreeMap::new(),
            }),
        }
    }

    /// Set the install prefix before the configuration is shared
    pub fn with_prefix(mut self, prefix: Option<PathBuf>) -> Self {
        self.state_mut().prefix = prefix;
        self
    }

    /// Set configure arguments before the configuration is shared
    pub fn with_config_opts(mut self, opts: Vec<String>) -> Self {
        self.state_mut().config_opts = opts;
        self
    }

    /// Set the process environment before the configuration is shared
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.state_mut().env = env;
        self
    }

    /// Stable identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current mutation counter
    pub fn sequence(&self) -> u64 {
        self.read().sequence
    }

    /// Cache identity of the current generation
    pub fn key(&self) -> ConfigKey {
        ConfigKey {
            id: self.id.clone(),
            sequence: self.sequence(),
        }
    }

    /// Whether the project must be bootstrapped again
    pub fn is_dirty(&self) -> bool {
        self.read().dirty
    }

    /// Mark the configuration dirty (bumping the sequence) or clean
    pub fn set_dirty(&self, dirty: bool) {
        let mut state = self.write();
        if dirty {
            state.sequence += 1;
        }
        state.dirty = dirty;
    }

    pub fn device(&self) -> Device {
        self.read().device.clone()
    }

    pub fn set_device(&self, device: Device) {
        self.mutate(|state| state.device = device);
    }

    pub fn runtime_id(&self) -> String {
        self.read().runtime_id.clone()
    }

    pub fn set_runtime_id(&self, runtime_id: impl Into<String>) {
        let runtime_id = runtime_id.into();
        self.mutate(|state| state.runtime_id = runtime_id);
    }

    /// Installation prefix passed to configure
    pub fn prefix(&self) -> Option<PathBuf> {
        self.read().prefix.clone()
    }

    pub fn set_prefix(&self, prefix: Option<PathBuf>) {
        self.mutate(|state| state.prefix = prefix);
    }

    /// Extra arguments passed to configure
    pub fn config_opts(&self) -> Vec<String> {
        self.read().config_opts.clone()
    }

    pub fn set_config_opts(&self, opts: Vec<String>) {
        self.mutate(|state| state.config_opts = opts);
    }

    /// Environment applied to every toolchain process
    pub fn env(&self) -> BTreeMap<String, String> {
        self.read().env.clone()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|state| {
            state.env.insert(key, value);
        });
    }

    fn mutate(&self, apply: impl FnOnce(&mut ConfigurationState)) {
        let mut state = self.write();
        apply(&mut state);
        state.sequence += 1;
        state.dirty = true;
    }

    fn state_mut(&mut self) -> &mut ConfigurationState {
        self.state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, ConfigurationState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConfigurationState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
