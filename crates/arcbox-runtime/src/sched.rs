//! Scheduler attribute translation.
//!
//! Turns the textual `process.scheduler` configuration into the kernel's
//! `struct sched_attr` for `sched_setattr(2)`. Policy codes and flag bits
//! come from `include/uapi/linux/sched.h` and
//! `include/uapi/linux/sched/types.h`.

use std::str::FromStr;

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::config::Scheduler;
use crate::error::{Result, RuntimeError};

/// Size of `struct sched_attr` (`SCHED_ATTR_SIZE_VER1`).
pub const SCHED_ATTR_SIZE: u32 = 56;

/// Kernel `struct sched_attr`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedAttr {
    pub size: u32,
    pub sched_policy: u32,
    pub sched_flags: u64,
    pub sched_nice: i32,
    pub sched_priority: u32,
    pub sched_runtime: u64,
    pub sched_deadline: u64,
    pub sched_period: u64,
    pub sched_util_min: u32,
    pub sched_util_max: u32,
}

const _: () = assert!(std::mem::size_of::<SchedAttr>() == SCHED_ATTR_SIZE as usize);

/// Scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SchedPolicy {
    /// `SCHED_OTHER` (also `SCHED_NORMAL`).
    Other = 0,
    /// `SCHED_FIFO`.
    Fifo = 1,
    /// `SCHED_RR`.
    RoundRobin = 2,
    /// `SCHED_BATCH`.
    Batch = 3,
    /// `SCHED_ISO`.
    Iso = 4,
    /// `SCHED_IDLE`.
    Idle = 5,
    /// `SCHED_DEADLINE`.
    Deadline = 6,
}

impl SchedPolicy {
    /// Kernel policy number.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "SCHED_OTHER",
            Self::Fifo => "SCHED_FIFO",
            Self::RoundRobin => "SCHED_RR",
            Self::Batch => "SCHED_BATCH",
            Self::Iso => "SCHED_ISO",
            Self::Idle => "SCHED_IDLE",
            Self::Deadline => "SCHED_DEADLINE",
        }
    }
}

impl FromStr for SchedPolicy {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SCHED_OTHER" | "SCHED_NORMAL" => Ok(Self::Other),
            "SCHED_FIFO" => Ok(Self::Fifo),
            "SCHED_RR" => Ok(Self::RoundRobin),
            "SCHED_BATCH" => Ok(Self::Batch),
            "SCHED_ISO" => Ok(Self::Iso),
            "SCHED_IDLE" => Ok(Self::Idle),
            "SCHED_DEADLINE" => Ok(Self::Deadline),
            _ => Err(RuntimeError::UnknownSchedPolicy(s.to_string())),
        }
    }
}

/// Scheduler flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedFlag {
    /// `SCHED_FLAG_RESET_ON_FORK`.
    ResetOnFork,
    /// `SCHED_FLAG_RECLAIM`.
    Reclaim,
    /// `SCHED_FLAG_DL_OVERRUN`.
    DlOverrun,
    /// `SCHED_FLAG_KEEP_POLICY`.
    KeepPolicy,
    /// `SCHED_FLAG_KEEP_PARAMS`.
    KeepParams,
    /// `SCHED_FLAG_UTIL_CLAMP_MIN`.
    UtilClampMin,
    /// `SCHED_FLAG_UTIL_CLAMP_MAX`.
    UtilClampMax,
}

impl SchedFlag {
    /// Kernel flag bit.
    #[must_use]
    pub const fn bits(self) -> u64 {
        match self {
            Self::ResetOnFork => 0x01,
            Self::Reclaim => 0x02,
            Self::DlOverrun => 0x04,
            Self::KeepPolicy => 0x08,
            Self::KeepParams => 0x10,
            Self::UtilClampMin => 0x20,
            Self::UtilClampMax => 0x40,
        }
    }

    /// Configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResetOnFork => "SCHED_FLAG_RESET_ON_FORK",
            Self::Reclaim => "SCHED_FLAG_RECLAIM",
            Self::DlOverrun => "SCHED_FLAG_DL_OVERRUN",
            Self::KeepPolicy => "SCHED_FLAG_KEEP_POLICY",
            Self::KeepParams => "SCHED_FLAG_KEEP_PARAMS",
            Self::UtilClampMin => "SCHED_FLAG_UTIL_CLAMP_MIN",
            Self::UtilClampMax => "SCHED_FLAG_UTIL_CLAMP_MAX",
        }
    }
}

impl FromStr for SchedFlag {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SCHED_FLAG_RESET_ON_FORK" => Ok(Self::ResetOnFork),
            "SCHED_FLAG_RECLAIM" => Ok(Self::Reclaim),
            "SCHED_FLAG_DL_OVERRUN" => Ok(Self::DlOverrun),
            "SCHED_FLAG_KEEP_POLICY" => Ok(Self::KeepPolicy),
            "SCHED_FLAG_KEEP_PARAMS" => Ok(Self::KeepParams),
            "SCHED_FLAG_UTIL_CLAMP_MIN" => Ok(Self::UtilClampMin),
            "SCHED_FLAG_UTIL_CLAMP_MAX" => Ok(Self::UtilClampMax),
            _ => Err(RuntimeError::UnknownSchedFlag(s.to_string())),
        }
    }
}

impl TryFrom<&Scheduler> for SchedAttr {
    type Error = RuntimeError;

    fn try_from(scheduler: &Scheduler) -> Result<Self> {
        let policy: SchedPolicy = scheduler.policy.parse()?;
        let flags = scheduler
            .flags
            .iter()
            .map(|flag| flag.parse::<SchedFlag>())
            .try_fold(0, |acc, flag| flag.map(|flag| acc | flag.bits()))?;

        #[allow(clippy::cast_sign_loss)]
        let priority = scheduler.priority.unwrap_or_default() as u32;

        Ok(Self {
            size: SCHED_ATTR_SIZE,
            sched_policy: policy.code(),
            sched_flags: flags,
            sched_nice: scheduler.nice.unwrap_or_default(),
            sched_priority: priority,
            sched_runtime: scheduler.runtime.unwrap_or_default(),
            sched_deadline: scheduler.deadline.unwrap_or_default(),
            sched_period: scheduler.period.unwrap_or_default(),
            ..Self::default()
        })
    }
}

/// Translate a scheduler configuration into a kernel request.
pub fn to_sched_attr(scheduler: &Scheduler) -> Result<SchedAttr> {
    SchedAttr::try_from(scheduler)
}

/// Apply scheduling attributes to a process with `sched_setattr(2)`.
///
/// A zero `pid` targets the calling thread.
pub fn set_sched_attr(pid: Pid, attr: &SchedAttr) -> Result<()> {
    // SAFETY: `attr` is a live `#[repr(C)]` sched_attr whose `size` field
    // matches its layout; the kernel only reads it.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_sched_setattr,
            pid.as_raw(),
            std::ptr::from_ref(attr),
            0 as libc::c_uint,
        )
    };
    Errno::result(ret)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sched_attr_layout() {
        assert_eq!(std::mem::size_of::<SchedAttr>(), 56);
        assert_eq!(std::mem::offset_of!(SchedAttr, sched_flags), 8);
        assert_eq!(std::mem::offset_of!(SchedAttr, sched_nice), 16);
        assert_eq!(std::mem::offset_of!(SchedAttr, sched_runtime), 24);
        assert_eq!(std::mem::offset_of!(SchedAttr, sched_util_min), 48);
    }

    #[test]
    fn test_other_without_flags() {
        let attr = to_sched_attr(&Scheduler::new("SCHED_OTHER")).unwrap();
        assert_eq!(attr.size, SCHED_ATTR_SIZE);
        assert_eq!(attr.sched_policy, 0);
        assert_eq!(attr.sched_flags, 0);
    }

    #[test]
    fn test_policy_codes() {
        let names = [
            "SCHED_OTHER",
            "SCHED_FIFO",
            "SCHED_RR",
            "SCHED_BATCH",
            "SCHED_ISO",
            "SCHED_IDLE",
            "SCHED_DEADLINE",
        ];
        for (code, name) in (0u32..).zip(names) {
            let attr = to_sched_attr(&Scheduler::new(name)).unwrap();
            assert_eq!(attr.sched_policy, code, "{name}");
            assert_eq!(name.parse::<SchedPolicy>().unwrap().as_str(), name);
        }
        assert_eq!(
            to_sched_attr(&Scheduler::new("SCHED_NORMAL")).unwrap().sched_policy,
            0
        );
    }

    #[test]
    fn test_flags_combine() {
        let sched = Scheduler::new("SCHED_OTHER")
            .with_flags(["SCHED_FLAG_RESET_ON_FORK", "SCHED_FLAG_RECLAIM"]);
        assert_eq!(to_sched_attr(&sched).unwrap().sched_flags, 0x03);

        let all = Scheduler::new("SCHED_DEADLINE").with_flags([
            "SCHED_FLAG_UTIL_CLAMP_MAX",
            "SCHED_FLAG_UTIL_CLAMP_MIN",
            "SCHED_FLAG_KEEP_PARAMS",
            "SCHED_FLAG_KEEP_POLICY",
            "SCHED_FLAG_DL_OVERRUN",
            "SCHED_FLAG_RECLAIM",
            "SCHED_FLAG_RESET_ON_FORK",
        ]);
        assert_eq!(to_sched_attr(&all).unwrap().sched_flags, 0x7f);
    }

    #[test]
    fn test_numeric_fields_pass_through() {
        let sched = Scheduler {
            policy: "SCHED_DEADLINE".to_string(),
            nice: Some(-3),
            priority: Some(7),
            flags: vec![],
            runtime: Some(10_000),
            deadline: Some(20_000),
            period: Some(30_000),
        };
        let attr = to_sched_attr(&sched).unwrap();

        assert_eq!(attr.sched_nice, -3);
        assert_eq!(attr.sched_priority, 7);
        assert_eq!(attr.sched_runtime, 10_000);
        assert_eq!(attr.sched_deadline, 20_000);
        assert_eq!(attr.sched_period, 30_000);
        assert_eq!(attr.sched_util_min, 0);
    }

    #[test]
    fn test_unknown_policy() {
        let err = to_sched_attr(&Scheduler::new("SCHED_FAST")).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownSchedPolicy(ref name) if name == "SCHED_FAST"));
        assert_eq!(err.to_string(), "invalid scheduler policy: SCHED_FAST");
    }

    #[test]
    fn test_unknown_flag() {
        let sched = Scheduler::new("SCHED_FIFO")
            .with_flags(["SCHED_FLAG_RECLAIM", "SCHED_FLAG_TURBO"]);
        let err = to_sched_attr(&sched).unwrap_err();
        assert_eq!(err.to_string(), "invalid scheduler flag: SCHED_FLAG_TURBO");
    }

    #[test]
    fn test_set_sched_attr_on_self() {
        let attr = to_sched_attr(&Scheduler::new("SCHED_OTHER")).unwrap();
        set_sched_attr(Pid::from_raw(0), &attr).unwrap();
    }

    #[test]
    fn test_set_sched_attr_rejects_missing_pid() {
        let attr = to_sched_attr(&Scheduler::new("SCHED_OTHER")).unwrap();
        let err = set_sched_attr(Pid::from_raw(i32::MAX), &attr).unwrap_err();
        assert!(matches!(err, RuntimeError::Syscall(Errno::ESRCH)));
    }

    #[test]
    fn test_flag_names_roundtrip() {
        for flag in [
            SchedFlag::ResetOnFork,
            SchedFlag::Reclaim,
            SchedFlag::DlOverrun,
            SchedFlag::KeepPolicy,
            SchedFlag::KeepParams,
            SchedFlag::UtilClampMin,
            SchedFlag::UtilClampMax,
        ] {
            assert_eq!(flag.as_str().parse::<SchedFlag>().unwrap(), flag);
        }
    }
}
