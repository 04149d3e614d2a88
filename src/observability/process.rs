//! Process resource sampling for the `/metrics` exposition.

use std::io;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage of the current process at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    /// Resident set size in bytes.
    pub resident_memory_bytes: u64,
    /// User plus system CPU time consumed so far, in milliseconds.
    pub cpu_time_ms: u64,
}

impl ProcessUsage {
    /// Value of the CPU gauge: accumulated CPU seconds.
    ///
    /// This is a placeholder for utilization; it is not normalized by
    /// wall-clock time or core count.
    pub fn cpu_gauge_value(&self) -> f64 {
        self.cpu_time_ms as f64 / 1_000.0
    }
}

/// Sample the current process.
pub fn sample() -> io::Result<ProcessUsage> {
    let pid = sysinfo::get_current_pid().map_err(io::Error::other)?;
    sample_pid(pid)
}

fn sample_pid(pid: Pid) -> io::Result<ProcessUsage> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory().with_cpu(),
    );

    let process = system
        .process(pid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("process {} not found", pid)))?;

    Ok(ProcessUsage {
        resident_memory_bytes: process.memory(),
        cpu_time_ms: process.accumulated_cpu_time(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_gauge_formula() {
        let usage = ProcessUsage {
            resident_memory_bytes: 0,
            cpu_time_ms: 2_500,
        };
        assert_eq!(usage.cpu_gauge_value(), 2.5);
    }

    #[test]
    fn test_sample_reports_memory() {
        let usage = sample().unwrap();
        assert!(usage.resident_memory_bytes > 0);
    }

    #[test]
    fn test_unknown_pid_is_an_error() {
        let err = sample_pid(Pid::from_u32(u32::MAX)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
