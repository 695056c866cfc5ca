//! External command hooks.
//!
//! A command hook runs an executable with the container state JSON on its
//! stdin. Its stdout and stderr are captured and attached to the error if
//! the process exits unsuccessfully. An optional timeout bounds the run:
//! when it elapses first the process is killed and reaped before the call
//! returns.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};
use crate::state::State;

/// An external-process hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHook {
    /// Path to the hook executable.
    pub path: PathBuf,

    /// Process arguments, including argv[0].
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,

    /// Process environment as `KEY=VALUE` entries.
    ///
    /// Empty means the hook inherits the runtime's environment.
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Vec<String>,

    /// Working directory. Empty means the runtime's working directory.
    #[serde(default)]
    pub dir: PathBuf,

    /// Maximum run time. `None` waits for the process indefinitely.
    #[serde(
        default,
        with = "duration_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl CommandHook {
    /// Create a new hook with the given path.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set hook arguments (including argv[0]).
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set hook environment.
    #[must_use]
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set hook timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate the hook configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.path.is_absolute() {
            return Err(RuntimeError::InvalidConfig(format!(
                "hook path must be absolute: {}",
                self.path.display()
            )));
        }

        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(RuntimeError::InvalidConfig(
                "hook timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Run the hook process with `state` on its stdin.
    pub async fn run(&self, state: &State) -> Result<()> {
        let payload = state.to_payload()?;

        let mut child = self
            .command()
            .spawn()
            .map_err(|source| RuntimeError::HookStart {
                path: self.path.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // Hooks may exit without reading their input.
                let _ = stdin.write_all(&payload).await;
            }
        });
        let mut stdout = drain(child.stdout.take());
        let mut stderr = drain(child.stderr.take());

        let timer = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        // The deadline covers output collection too: a background process
        // can keep the pipes open after the hook itself has exited.
        let finished = async {
            let status = child.wait().await;
            let stdout = collect(&mut stdout).await;
            let stderr = collect(&mut stderr).await;
            (status, stdout, stderr)
        };

        let outcome = tokio::select! {
            outcome = finished => Some(outcome),
            () = timer => None,
        };

        let Some((status, stdout, stderr)) = outcome else {
            let timeout = self.timeout.unwrap_or_default();
            warn!(
                path = %self.path.display(),
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "hook timed out, killing"
            );
            if let Err(e) = child.start_kill() {
                debug!(path = %self.path.display(), error = %e, "failed to kill hook");
            }
            // Reap before returning so no zombie outlives the call.
            let _ = child.wait().await;
            feeder.abort();
            stdout.abort();
            stderr.abort();
            return Err(RuntimeError::HookTimeout {
                path: self.path.clone(),
                timeout,
            });
        };

        let status = status?;
        feeder.abort();

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::HookExecution {
                path: self.path.clone(),
                status,
                stdout,
                stderr,
            })
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);

        if let Some((arg0, args)) = self.args.split_first() {
            cmd.arg0(arg0).args(args);
        }

        if !self.env.is_empty() {
            cmd.env_clear();
            for entry in &self.env {
                match entry.split_once('=') {
                    Some((key, value)) => {
                        cmd.env(key, value);
                    }
                    None => warn!(entry = %entry, "ignoring hook env entry without '='"),
                }
            }
        }

        if !is_unset(&self.dir) {
            cmd.current_dir(&self.dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn is_unset(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(handle: &mut JoinHandle<Vec<u8>>) -> String {
    handle
        .await
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timeouts persist as integer nanoseconds.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_nanos))
    }
}
