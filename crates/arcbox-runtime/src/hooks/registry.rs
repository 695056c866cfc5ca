//! Hook registry keyed by lifecycle event.

use std::collections::HashMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tracing::warn;

use super::{CommandHook, Hook, HookList, HookName};
use crate::error::Result;
use crate::state::State;

/// Container lifecycle hooks.
///
/// An event without an entry behaves exactly like one with an empty list.
///
/// The persisted form is an object with one array per event. Every event
/// key is always written. Only command hooks are written; function hooks
/// are skipped with a warning, so a round trip drops them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hooks {
    lists: HashMap<HookName, HookList>,
}

impl Hooks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook at the end of an event's list.
    pub fn append(&mut self, name: HookName, hook: impl Into<Hook>) {
        self.lists.entry(name).or_default().push(hook);
    }

    /// Replace an event's list wholesale.
    pub fn set(&mut self, name: HookName, list: HookList) {
        if list.is_empty() {
            self.lists.remove(&name);
        } else {
            self.lists.insert(name, list);
        }
    }

    /// Hooks registered for an event.
    #[must_use]
    pub fn get(&self, name: HookName) -> &[Hook] {
        match self.lists.get(&name) {
            Some(list) => &list[..],
            None => &[],
        }
    }

    /// Check if any hooks are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.values().all(|list| list.is_empty())
    }

    /// Check if any of the given events has hooks.
    #[must_use]
    pub fn has_hook(&self, names: &[HookName]) -> bool {
        names.iter().any(|name| !self.get(*name).is_empty())
    }

    /// Give every command hook without an environment the given one.
    pub fn set_default_env(&mut self, env: &[String]) {
        for list in self.lists.values_mut() {
            list.set_default_env(env);
        }
    }

    /// Validate all command hooks.
    pub fn validate(&self) -> Result<()> {
        for name in HookName::ALL {
            for hook in self.get(name).iter().filter_map(Hook::as_command) {
                hook.validate()?;
            }
        }
        Ok(())
    }

    /// Run the hooks registered for `name`, in order.
    ///
    /// The first failing hook stops the list; the error carries the event
    /// name and the hook's index.
    pub async fn run(&self, name: HookName, state: &State) -> Result<()> {
        match self.lists.get(&name) {
            Some(list) => list.run(name, state).await,
            None => Ok(()),
        }
    }
}

struct CommandHooks<'a> {
    name: HookName,
    list: &'a [Hook],
}

impl Serialize for CommandHooks<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for (index, hook) in self.list.iter().enumerate() {
            match hook {
                Hook::Command(hook) => seq.serialize_element(hook)?,
                Hook::Function(_) => {
                    warn!(hook = %self.name, index, "cannot serialize function hook, skipping");
                }
            }
        }
        seq.end()
    }
}

impl Serialize for Hooks {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(HookName::ALL.len()))?;
        for name in HookName::ALL {
            map.serialize_entry(
                name.as_str(),
                &CommandHooks {
                    name,
                    list: self.get(name),
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Hooks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, Option<Vec<CommandHook>>>::deserialize(deserializer)?;

        let mut hooks = Self::new();
        for (key, list) in raw {
            let Ok(name) = key.parse::<HookName>() else {
                warn!(hook = %key, "ignoring unknown hook name");
                continue;
            };
            let list: HookList = list
                .unwrap_or_default()
                .into_iter()
                .map(Hook::Command)
                .collect();
            hooks.set(name, list);
        }
        Ok(hooks)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::RuntimeError;

    fn state() -> State {
        State::new("test-container", "/bundle")
    }

    #[test]
    fn test_hooks_empty() {
        let hooks = Hooks::new();
        assert!(hooks.is_empty());
        assert!(hooks.get(HookName::Poststart).is_empty());
        assert!(!hooks.has_hook(&HookName::ALL));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut hooks = Hooks::new();
        hooks.append(HookName::Poststart, CommandHook::new("/usr/bin/hook1"));
        hooks.append(HookName::Poststart, CommandHook::new("/usr/bin/hook2"));
        hooks.append(HookName::Poststart, CommandHook::new("/usr/bin/hook3"));

        let paths: Vec<_> = hooks
            .get(HookName::Poststart)
            .iter()
            .filter_map(Hook::as_command)
            .map(|hook| hook.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, ["/usr/bin/hook1", "/usr/bin/hook2", "/usr/bin/hook3"]);
        assert!(hooks.has_hook(&[HookName::Prestart, HookName::Poststart]));
        assert!(!hooks.has_hook(&[HookName::Poststop]));
    }

    #[test]
    fn test_set_empty_list_clears_entry() {
        let mut hooks = Hooks::new();
        hooks.append(HookName::Poststop, CommandHook::new("/bin/a"));
        hooks.set(HookName::Poststop, HookList::new());

        assert_eq!(hooks, Hooks::new());
    }

    #[test]
    fn test_validate() {
        let mut hooks = Hooks::new();
        hooks.append(HookName::CreateRuntime, CommandHook::new("/usr/bin/hook"));
        hooks.append(HookName::CreateRuntime, Hook::function(|_| Ok(())));
        assert!(hooks.validate().is_ok());

        hooks.append(HookName::Poststop, CommandHook::new("relative/path"));
        assert!(hooks.validate().is_err());
    }

    #[test]
    fn test_serialize_writes_every_event() {
        let mut hooks = Hooks::new();
        hooks.append(
            HookName::CreateRuntime,
            CommandHook::new("/usr/bin/setup").with_args(["setup", "--type=bridge"]),
        );

        let value = serde_json::to_value(&hooks).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 6);
        for name in HookName::ALL {
            assert!(object[name.as_str()].is_array(), "missing {name}");
        }
        assert_eq!(object["createRuntime"][0]["path"], "/usr/bin/setup");
        assert_eq!(object["poststop"], serde_json::json!([]));
    }

    #[test]
    fn test_serialize_skips_function_hooks() {
        let mut hooks = Hooks::new();
        hooks.append(HookName::Poststart, Hook::function(|_| Ok(())));
        hooks.append(HookName::Poststart, CommandHook::new("/usr/bin/notify"));

        let value = serde_json::to_value(&hooks).unwrap();
        let poststart = value["poststart"].as_array().unwrap();

        assert_eq!(poststart.len(), 1);
        assert_eq!(poststart[0]["path"], "/usr/bin/notify");
    }

    #[test]
    fn test_deserialize_omits_empty_events() {
        let json = r#"{
            "prestart": [],
            "createRuntime": [
                {"path": "/usr/bin/setup-network", "args": ["setup-network"], "timeout": 30000000000}
            ],
            "poststart": null,
            "poststop": [{"path": "/usr/bin/cleanup"}]
        }"#;

        let hooks: Hooks = serde_json::from_str(json).unwrap();

        assert_eq!(hooks.lists.len(), 2);
        assert!(!hooks.lists.contains_key(&HookName::Prestart));
        let setup = hooks.get(HookName::CreateRuntime)[0].as_command().unwrap();
        assert_eq!(setup.timeout, Some(std::time::Duration::from_secs(30)));
        assert_eq!(hooks.get(HookName::Poststop).len(), 1);
    }

    #[test]
    fn test_deserialize_ignores_unknown_events() {
        let json = r#"{"onReboot": [{"path": "/bin/x"}], "poststop": [{"path": "/bin/y"}]}"#;
        let hooks: Hooks = serde_json::from_str(json).unwrap();

        assert_eq!(hooks.lists.len(), 1);
        assert_eq!(hooks.get(HookName::Poststop).len(), 1);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut hooks = Hooks::new();
        hooks.append(
            HookName::CreateRuntime,
            CommandHook::new("/usr/bin/setup").with_timeout(std::time::Duration::from_secs(30)),
        );
        hooks.append(
            HookName::Poststart,
            CommandHook::new("/usr/bin/notify")
                .with_args(["notify"])
                .with_env(["SOCKET=/run/notify.sock"])
                .with_dir("/run"),
        );
        hooks.append(HookName::Poststart, CommandHook::new("/usr/bin/second"));
        hooks.append(HookName::Poststop, CommandHook::new("/usr/bin/cleanup"));

        let json = serde_json::to_string(&hooks).unwrap();
        let parsed: Hooks = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, hooks);
    }

    #[tokio::test]
    async fn test_run_absent_event_is_noop() {
        let hooks = Hooks::new();
        hooks.run(HookName::Poststop, &state()).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));

        let mut hooks = Hooks::new();
        let counter = Arc::clone(&calls);
        hooks.append(
            HookName::StartContainer,
            Hook::function(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        hooks.append(
            HookName::StartContainer,
            Hook::function(|_| Err("refused".into())),
        );
        let counter = Arc::clone(&third);
        hooks.append(
            HookName::StartContainer,
            Hook::function(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let err = hooks
            .run(HookName::StartContainer, &state())
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
        match &err {
            RuntimeError::HookRun { name, index, .. } => {
                assert_eq!(*name, HookName::StartContainer);
                assert_eq!(*index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "error running startContainer hook #1: refused");
    }

    #[tokio::test]
    async fn test_run_passes_state_to_function_hooks() {
        let mut hooks = Hooks::new();
        hooks.append(
            HookName::Poststart,
            Hook::function(|state| {
                if state.id == "test-container" {
                    Ok(())
                } else {
                    Err(format!("unexpected id {}", state.id).into())
                }
            }),
        );

        hooks.run(HookName::Poststart, &state()).await.unwrap();
    }
}
