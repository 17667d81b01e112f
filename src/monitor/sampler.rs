//! Process usage sampling behind a pluggable seam.
//!
//! The monitor measures wall time itself; everything else (CPU time,
//! resident memory, thread and file-handle counts) is platform-dependent
//! and read through [`UsageSampler`]. The default [`ProcSampler`] reads
//! `/proc/self` on Linux and reports nothing elsewhere, which makes the
//! corresponding limits unenforceable on those targets.

/// One sampled reading. `None` fields were not observable on this platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    pub cpu_ms: Option<u64>,
    pub memory_mb: Option<u64>,
    pub threads: Option<u64>,
    pub file_handles: Option<u64>,
}

/// Source of process usage readings.
pub trait UsageSampler: Send + Sync {
    fn sample(&self) -> Sample;
}

/// Sampler that reports nothing. Useful in tests that only exercise
/// wall-time limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSampler;

impl UsageSampler for NullSampler {
    fn sample(&self) -> Sample {
        Sample::default()
    }
}

/// `/proc/self`-backed sampler for the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcSampler;

impl UsageSampler for ProcSampler {
    #[cfg(target_os = "linux")]
    fn sample(&self) -> Sample {
        Sample {
            cpu_ms: linux::cpu_ms(),
            memory_mb: linux::rss_mb(),
            threads: linux::thread_count(),
            file_handles: linux::fd_count(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn sample(&self) -> Sample {
        Sample::default()
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;

    // Kernel USER_HZ; fixed at 100 on every mainstream Linux configuration.
    const CLOCK_TICKS_PER_SEC: u64 = 100;

    /// utime + stime from `/proc/self/stat`, converted from clock ticks.
    pub(super) fn cpu_ms() -> Option<u64> {
        let stat = fs::read_to_string("/proc/self/stat").ok()?;
        // comm (field 2) may contain spaces; fields 3+ start after the
        // closing paren.
        let rest = stat.rsplit_once(')')?.1;
        let mut fields = rest.split_whitespace();
        // rest starts at field 3 (state); utime is field 14, stime field 15.
        let utime: u64 = fields.nth(11)?.parse().ok()?;
        let stime: u64 = fields.next()?.parse().ok()?;
        Some((utime + stime) * 1000 / CLOCK_TICKS_PER_SEC)
    }

    pub(super) fn rss_mb() -> Option<u64> {
        status_field("VmRSS:").map(|kb| kb / 1024)
    }

    pub(super) fn thread_count() -> Option<u64> {
        status_field("Threads:")
    }

    pub(super) fn fd_count() -> Option<u64> {
        let entries = fs::read_dir("/proc/self/fd").ok()?;
        Some(entries.count() as u64)
    }

    fn status_field(name: &str) -> Option<u64> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with(name))?;
        line.split_whitespace().nth(1)?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sampler_reports_nothing() {
        let s = NullSampler.sample();
        assert_eq!(s, Sample::default());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn proc_sampler_reads_this_process() {
        let s = ProcSampler.sample();
        // At minimum the running test process has one thread and stdio open.
        assert!(s.threads.unwrap_or(0) >= 1);
        assert!(s.file_handles.unwrap_or(0) >= 1);
    }
}
