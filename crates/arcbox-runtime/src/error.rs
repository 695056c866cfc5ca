//! Error types for hook execution and kernel request translation.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::hooks::HookName;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Boxed error returned by function hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which half of an exec CPU affinity pair failed to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinitySide {
    /// Affinity applied before the affinity-changing operation.
    Initial,
    /// Affinity applied after it.
    Final,
}

impl std::fmt::Display for AffinitySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// Errors that can occur while running hooks or building kernel requests.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A CPU list segment is not a non-negative integer.
    #[error("invalid CPU number: {0:?}")]
    InvalidCpu(String),

    /// A CPU number does not fit in the native CPU mask.
    #[error("values larger than {max} are not supported")]
    CpuOutOfRange { max: usize },

    /// A CPU range whose start is greater than its end.
    #[error("invalid range: {0}")]
    InvalidCpuRange(String),

    /// A non-empty CPU list that selected no CPU at all.
    #[error("no CPUs found in {0:?}")]
    NoCpus(String),

    /// One side of an exec CPU affinity pair is malformed.
    #[error("bad {side} CPU affinity: {source}")]
    CpuAffinity {
        side: AffinitySide,
        #[source]
        source: Box<RuntimeError>,
    },

    /// Unrecognized scheduler policy name.
    #[error("invalid scheduler policy: {0}")]
    UnknownSchedPolicy(String),

    /// Unrecognized scheduler flag name.
    #[error("invalid scheduler flag: {0}")]
    UnknownSchedFlag(String),

    /// The hook process could not be spawned.
    #[error("failed to start hook {}: {source}", .path.display())]
    HookStart {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The hook process exited unsuccessfully.
    #[error("{status}, stdout: {stdout}, stderr: {stderr}")]
    HookExecution {
        path: PathBuf,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    /// The hook process ran past its timeout and was killed.
    #[error("hook ran past specified timeout of {:.1}s", .timeout.as_secs_f64())]
    HookTimeout { path: PathBuf, timeout: Duration },

    /// An in-process function hook returned an error.
    #[error("{0}")]
    HookFunction(#[source] BoxError),

    /// A hook in an event's list failed.
    #[error("error running {name} hook #{index}: {source}")]
    HookRun {
        name: HookName,
        index: usize,
        #[source]
        source: Box<RuntimeError>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A kernel request was rejected.
    #[error("syscall failed: {0}")]
    Syscall(#[from] nix::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Wraps an error with the event name and list position of the failing hook.
    #[must_use]
    pub fn hook_run(name: HookName, index: usize, source: Self) -> Self {
        Self::HookRun {
            name,
            index,
            source: Box::new(source),
        }
    }

    /// Wraps an error with the affinity side that produced it.
    #[must_use]
    pub fn cpu_affinity(side: AffinitySide, source: Self) -> Self {
        Self::CpuAffinity {
            side,
            source: Box::new(source),
        }
    }

    /// Returns true if this error, or the error it wraps, is a hook timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::HookTimeout { .. } => true,
            Self::HookRun { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_run_message_chain() {
        let inner = RuntimeError::HookTimeout {
            path: PathBuf::from("/bin/hook"),
            timeout: Duration::from_millis(1500),
        };
        let err = RuntimeError::hook_run(HookName::Poststart, 2, inner);

        assert_eq!(
            err.to_string(),
            "error running poststart hook #2: hook ran past specified timeout of 1.5s"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_cpu_affinity_message_names_side() {
        let err = RuntimeError::cpu_affinity(
            AffinitySide::Final,
            RuntimeError::InvalidCpuRange("5-2".to_string()),
        );
        assert_eq!(err.to_string(), "bad final CPU affinity: invalid range: 5-2");
        assert!(!err.is_timeout());
    }
}
