//! Container lifecycle hooks.
//!
//! Hooks run custom actions at fixed points of the container lifecycle.
//! A hook is either an in-process callback ([`FunctionHook`]) or an external
//! command ([`CommandHook`]). Only command hooks have a persisted form.
//!
//! Reference: <https://github.com/opencontainers/runtime-spec/blob/main/config.md#posix-platform-hooks>

pub mod command;
mod registry;

use std::sync::Arc;

use tracing::debug;

use crate::error::{BoxError, Result, RuntimeError};
use crate::state::State;

pub use command::CommandHook;
pub use registry::Hooks;

/// Lifecycle event at which a hook list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookName {
    /// After namespaces are created, before the user command runs.
    /// Called in the runtime namespace. Deprecated in favor of `CreateRuntime`.
    Prestart,
    /// After the runtime environment is created, before `pivot_root`.
    /// Called in the runtime namespace.
    CreateRuntime,
    /// Same point as `CreateRuntime`, called in the container namespace.
    CreateContainer,
    /// Right before the container process starts, in the container namespace.
    StartContainer,
    /// After the init process starts, in the runtime namespace.
    Poststart,
    /// After the init process exits, in the runtime namespace.
    Poststop,
}

impl HookName {
    /// Every event, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Prestart,
        Self::CreateRuntime,
        Self::CreateContainer,
        Self::StartContainer,
        Self::Poststart,
        Self::Poststop,
    ];

    /// Get the persisted event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prestart => "prestart",
            Self::CreateRuntime => "createRuntime",
            Self::CreateContainer => "createContainer",
            Self::StartContainer => "startContainer",
            Self::Poststart => "poststart",
            Self::Poststop => "poststop",
        }
    }
}

impl std::fmt::Display for HookName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookName {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| RuntimeError::InvalidConfig(format!("unknown hook name: {s}")))
    }
}

/// Hook names this runtime knows about, for feature reporting.
#[must_use]
pub fn known_hook_names() -> Vec<&'static str> {
    HookName::ALL.iter().map(HookName::as_str).collect()
}

type Callback = dyn Fn(&State) -> std::result::Result<(), BoxError> + Send + Sync;

/// An in-process callback hook.
///
/// Function hooks have no persisted form and are skipped when a
/// [`Hooks`] registry is serialized.
#[derive(Clone)]
pub struct FunctionHook {
    run: Arc<Callback>,
}

impl FunctionHook {
    /// Wrap a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&State) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self { run: Arc::new(f) }
    }

    /// Invoke the callback.
    pub fn run(&self, state: &State) -> Result<()> {
        (self.run)(state).map_err(RuntimeError::HookFunction)
    }
}

impl std::fmt::Debug for FunctionHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionHook").finish_non_exhaustive()
    }
}

impl PartialEq for FunctionHook {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.run, &other.run)
    }
}

/// A single hook entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Hook {
    /// In-process callback.
    Function(FunctionHook),
    /// External command.
    Command(CommandHook),
}

impl Hook {
    /// Create a function hook from a callback.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&State) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::Function(FunctionHook::new(f))
    }

    /// Run the hook with the given state.
    pub async fn run(&self, state: &State) -> Result<()> {
        match self {
            Self::Function(hook) => hook.run(state),
            Self::Command(hook) => hook.run(state).await,
        }
    }

    /// The command hook, if this is one.
    #[must_use]
    pub const fn as_command(&self) -> Option<&CommandHook> {
        match self {
            Self::Command(hook) => Some(hook),
            Self::Function(_) => None,
        }
    }
}

impl From<CommandHook> for Hook {
    fn from(hook: CommandHook) -> Self {
        Self::Command(hook)
    }
}

impl From<FunctionHook> for Hook {
    fn from(hook: FunctionHook) -> Self {
        Self::Function(hook)
    }
}

/// Hooks registered for one event, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookList(Vec<Hook>);

impl HookList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a hook.
    pub fn push(&mut self, hook: impl Into<Hook>) {
        self.0.push(hook.into());
    }

    /// Give every command hook without an environment the given one.
    ///
    /// Hooks that already declare an environment are left alone.
    pub fn set_default_env(&mut self, env: &[String]) {
        for hook in &mut self.0 {
            if let Hook::Command(hook) = hook {
                if hook.env.is_empty() {
                    hook.env = env.to_vec();
                }
            }
        }
    }

    /// Run every hook in order, stopping at the first failure.
    pub(crate) async fn run(&self, name: HookName, state: &State) -> Result<()> {
        for (index, hook) in self.0.iter().enumerate() {
            debug!(hook = %name, index, "running hook");
            hook.run(state)
                .await
                .map_err(|e| RuntimeError::hook_run(name, index, e))?;
        }
        Ok(())
    }
}

impl std::ops::Deref for HookList {
    type Target = [Hook];

    fn deref(&self) -> &[Hook] {
        &self.0
    }
}

impl From<Vec<Hook>> for HookList {
    fn from(hooks: Vec<Hook>) -> Self {
        Self(hooks)
    }
}

impl FromIterator<Hook> for HookList {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a HookList {
    type Item = &'a Hook;
    type IntoIter = std::slice::Iter<'a, Hook>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_name_as_str() {
        assert_eq!(HookName::Prestart.as_str(), "prestart");
        assert_eq!(HookName::CreateRuntime.as_str(), "createRuntime");
        assert_eq!(HookName::CreateContainer.as_str(), "createContainer");
        assert_eq!(HookName::StartContainer.as_str(), "startContainer");
        assert_eq!(HookName::Poststart.as_str(), "poststart");
        assert_eq!(HookName::Poststop.as_str(), "poststop");
    }

    #[test]
    fn test_hook_name_from_str() {
        for name in HookName::ALL {
            assert_eq!(name.as_str().parse::<HookName>().unwrap(), name);
        }
        assert!("preStart".parse::<HookName>().is_err());
    }

    #[test]
    fn test_known_hook_names_order() {
        assert_eq!(
            known_hook_names(),
            vec![
                "prestart",
                "createRuntime",
                "createContainer",
                "startContainer",
                "poststart",
                "poststop"
            ]
        );
    }

    #[test]
    fn test_set_default_env_only_fills_unset() {
        let mut list = HookList::new();
        list.push(CommandHook::new("/bin/a"));
        list.push(CommandHook::new("/bin/b").with_env(["OWN=1"]));
        list.push(Hook::function(|_| Ok(())));

        list.set_default_env(&["PATH=/usr/bin".to_string()]);

        assert_eq!(list[0].as_command().unwrap().env, vec!["PATH=/usr/bin"]);
        assert_eq!(list[1].as_command().unwrap().env, vec!["OWN=1"]);
        assert!(list[2].as_command().is_none());
    }

    #[test]
    fn test_function_hook_equality_is_identity() {
        let hook = FunctionHook::new(|_| Ok(()));
        let same = hook.clone();
        let other = FunctionHook::new(|_| Ok(()));

        assert_eq!(hook, same);
        assert_ne!(hook, other);
    }

    #[tokio::test]
    async fn test_function_hook_error_is_wrapped() {
        let hook = Hook::function(|_| Err("boom".into()));
        let err = hook.run(&State::new("c1", "/bundle")).await.unwrap_err();

        assert!(matches!(err, RuntimeError::HookFunction(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
