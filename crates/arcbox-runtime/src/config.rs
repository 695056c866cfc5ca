//! Configuration fragments consumed by the runtime core.
//!
//! These are the parts of an OCI `config.json` (and of the runtime's own
//! persisted container config) that hooks, scheduling and CPU pinning
//! read. Everything else in the container configuration is owned by other
//! crates.
//! Reference: <https://github.com/opencontainers/runtime-spec/blob/main/config.md>

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hooks::{HookName, Hooks};

#[cfg(target_os = "linux")]
use crate::affinity::CpuAffinity;
#[cfg(target_os = "linux")]
use crate::sched::SchedAttr;

/// OCI specification version reported in hook state.
pub const OCI_VERSION: &str = "1.2.0";

/// Process scheduler configuration, as in `process.scheduler`.
///
/// Policy and flags stay textual here; [`SchedAttr`] translation rejects
/// unknown names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    /// Scheduling policy, e.g. `SCHED_FIFO`.
    pub policy: String,
    /// Nice value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nice: Option<i32>,
    /// Priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Scheduler flags, e.g. `SCHED_FLAG_RESET_ON_FORK`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Runtime (for deadline scheduler).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u64>,
    /// Deadline (for deadline scheduler).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
    /// Period (for deadline scheduler).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

impl Scheduler {
    /// Create a scheduler config for the given policy name.
    #[must_use]
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            ..Self::default()
        }
    }

    /// Set scheduler flags.
    #[must_use]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// CPU affinity for exec, as in `process.execCPUAffinity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCpuAffinity {
    /// Initial CPU affinity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    /// Final CPU affinity.
    #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_affinity: Option<String>,
}

/// The slice of a container's configuration owned by this crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Lifecycle hooks. Only command hooks are persisted.
    #[serde(rename = "Hooks", default)]
    pub hooks: Hooks,

    /// Scheduling attributes for the container process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<Scheduler>,

    /// CPU affinity for processes exec'd into the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_cpu_affinity: Option<ExecCpuAffinity>,
}

impl Config {
    /// Load from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check if any of the given events has hooks configured.
    #[must_use]
    pub fn has_hook(&self, names: &[HookName]) -> bool {
        self.hooks.has_hook(names)
    }

    /// Translate the scheduler settings, if any.
    #[cfg(target_os = "linux")]
    pub fn sched_attr(&self) -> Result<Option<SchedAttr>> {
        self.scheduler
            .as_ref()
            .map(SchedAttr::try_from)
            .transpose()
    }

    /// Build the exec CPU affinity sets, if any.
    #[cfg(target_os = "linux")]
    pub fn cpu_affinity(&self) -> Result<Option<CpuAffinity>> {
        crate::affinity::convert_cpu_affinity(self.exec_cpu_affinity.as_ref())
    }
}
