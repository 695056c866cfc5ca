//! CPU affinity sets.
//!
//! Parses CPU list strings such as `"0-3,8, 10"` into the kernel's native
//! `cpu_set_t`. An empty string means "no affinity requested"; a non-empty
//! string that selects no CPU is an error.

use nix::sched::{sched_setaffinity, CpuSet as RawCpuSet};
use nix::unistd::Pid;

use crate::config::ExecCpuAffinity;
use crate::error::{AffinitySide, Result, RuntimeError};

/// A non-empty set of CPUs, backed by the native `cpu_set_t`.
#[derive(Clone, Copy)]
pub struct CpuSet(RawCpuSet);

impl CpuSet {
    /// Number of CPUs the native mask can hold (8 * `sizeof(cpu_set_t)`).
    #[must_use]
    pub fn capacity() -> usize {
        RawCpuSet::count()
    }

    /// Parse a CPU list.
    ///
    /// Segments are separated by commas and are either a CPU number or an
    /// inclusive `start-end` range. Whitespace around segments and empty
    /// segments are ignored. Returns `Ok(None)` for an empty string.
    pub fn parse(spec: &str) -> Result<Option<Self>> {
        if spec.is_empty() {
            return Ok(None);
        }

        let max = Self::capacity();
        let mut set = RawCpuSet::new();
        let mut found = false;

        for segment in spec.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (start, end) = match segment.split_once('-') {
                Some((start, end)) => {
                    let start = parse_cpu(start, max)?;
                    let end = parse_cpu(end, max)?;
                    if start > end {
                        return Err(RuntimeError::InvalidCpuRange(segment.to_string()));
                    }
                    (start, end)
                }
                None => {
                    let cpu = parse_cpu(segment, max)?;
                    (cpu, cpu)
                }
            };

            for cpu in start..=end {
                set.set(cpu)
                    .map_err(|_| RuntimeError::CpuOutOfRange { max: max - 1 })?;
            }
            found = true;
        }

        if !found {
            return Err(RuntimeError::NoCpus(spec.to_string()));
        }
        Ok(Some(Self(set)))
    }

    /// Check whether a CPU is in the set.
    #[must_use]
    pub fn is_set(&self, cpu: usize) -> bool {
        self.0.is_set(cpu).unwrap_or(false)
    }

    /// Number of CPUs in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// CPUs in the set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::capacity()).filter(|&cpu| self.is_set(cpu))
    }

    /// The native set, for passing to other `nix::sched` calls.
    #[must_use]
    pub const fn as_raw(&self) -> &RawCpuSet {
        &self.0
    }

    /// Pin a process to this set with `sched_setaffinity(2)`.
    ///
    /// A zero `pid` targets the calling thread.
    pub fn apply(&self, pid: Pid) -> Result<()> {
        sched_setaffinity(pid, &self.0)?;
        Ok(())
    }
}

impl PartialEq for CpuSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for CpuSet {}

impl std::fmt::Debug for CpuSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

fn parse_cpu(value: &str, max: usize) -> Result<usize> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RuntimeError::InvalidCpu(value.to_string()));
    }
    match value.parse::<usize>() {
        Ok(cpu) if cpu < max => Ok(cpu),
        _ => Err(RuntimeError::CpuOutOfRange { max: max - 1 }),
    }
}

/// Exec CPU affinity, built from [`ExecCpuAffinity`].
///
/// `initial` is applied when the process is created and `final_affinity`
/// after it has joined the container's cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuAffinity {
    /// Affinity applied first.
    pub initial: Option<CpuSet>,
    /// Affinity applied last.
    pub final_affinity: Option<CpuSet>,
}

impl CpuAffinity {
    /// Build both sets independently.
    ///
    /// Returns `Ok(None)` when neither side requests a set.
    pub fn from_config(config: &ExecCpuAffinity) -> Result<Option<Self>> {
        let initial = build(config.initial.as_deref(), AffinitySide::Initial)?;
        let final_affinity = build(config.final_affinity.as_deref(), AffinitySide::Final)?;

        if initial.is_none() && final_affinity.is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            initial,
            final_affinity,
        }))
    }
}

fn build(spec: Option<&str>, side: AffinitySide) -> Result<Option<CpuSet>> {
    CpuSet::parse(spec.unwrap_or_default()).map_err(|e| RuntimeError::cpu_affinity(side, e))
}

/// Convert an optional exec CPU affinity configuration.
pub fn convert_cpu_affinity(config: Option<&ExecCpuAffinity>) -> Result<Option<CpuAffinity>> {
    config.map_or(Ok(None), CpuAffinity::from_config)
}
