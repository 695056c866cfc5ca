//! # arcbox-runtime
//!
//! Lifecycle hook execution and kernel request translation for `ArcBox`
//! containers.
//!
//! This crate sits between the declarative container configuration and
//! the kernel:
//!
//! - **Hooks**: Register function and command hooks per lifecycle event,
//!   persist the command hooks, and run an event's hooks in order with
//!   per-hook timeouts
//! - **Scheduler**: Translate `process.scheduler` into `struct sched_attr`
//! - **Affinity**: Parse CPU list strings into native `cpu_set_t` masks
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use arcbox_runtime::{CommandHook, HookName, Hooks, State, Status};
//!
//! # async fn example() -> arcbox_runtime::Result<()> {
//! let mut hooks = Hooks::new();
//! hooks.append(
//!     HookName::CreateRuntime,
//!     CommandHook::new("/usr/libexec/setup-network")
//!         .with_args(["setup-network", "--bridge=arcbox0"])
//!         .with_timeout(Duration::from_secs(10)),
//! );
//!
//! let state = State::new("web", "/var/lib/arcbox/bundles/web").with_status(Status::Creating);
//! hooks.run(HookName::CreateRuntime, &state).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    arcbox-runtime                       │
//! │                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │   hooks     │  │   sched     │  │  affinity   │     │
//! │  │             │  │             │  │             │     │
//! │  │ - Hooks     │  │ - SchedAttr │  │ - CpuSet    │     │
//! │  │ - HookList  │  │ - Policy    │  │ - CpuAff.   │     │
//! │  │ - Hook      │  │ - Flag      │  │             │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘     │
//! │                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │   config    │  │    state    │  │   error     │     │
//! │  │             │  │             │  │             │     │
//! │  │ - Config    │  │ - State     │  │ - Runtime-  │     │
//! │  │ - Scheduler │  │ - Status    │  │   Error     │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(target_os = "linux")]
pub mod affinity;
pub mod config;
pub mod error;
pub mod hooks;
#[cfg(target_os = "linux")]
pub mod sched;
pub mod state;

// Re-export main types for convenience.
#[cfg(target_os = "linux")]
pub use affinity::{convert_cpu_affinity, CpuAffinity, CpuSet};
pub use config::{Config, ExecCpuAffinity, Scheduler, OCI_VERSION};
pub use error::{AffinitySide, BoxError, Result, RuntimeError};
pub use hooks::{known_hook_names, CommandHook, FunctionHook, Hook, HookList, HookName, Hooks};
#[cfg(target_os = "linux")]
pub use sched::{set_sched_attr, to_sched_attr, SchedAttr, SchedFlag, SchedPolicy};
pub use state::{State, Status};
