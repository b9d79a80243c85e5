/*
 * Simulation Statistics
 *
 * Monotonic performance counters for one simulated machine: the virtual
 * clock split into system/user/idle time, plus device activity counters.
 * Counters are atomics because device handlers touch them from interrupt
 * context; the uniprocessor invariant means they are never contended,
 * only shared.
 *
 * The page-fault and paging counters belong to the (external) virtual
 * memory layer; they live here so one summary covers the whole machine.
 */

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::Tick;

/// Monotonic counters for one simulated machine.
pub struct Statistics {
    total_ticks: AtomicU64,
    system_ticks: AtomicU64,
    user_ticks: AtomicU64,
    idle_ticks: AtomicU64,
    num_disk_reads: AtomicU64,
    num_disk_writes: AtomicU64,
    num_console_chars_read: AtomicU64,
    num_console_chars_written: AtomicU64,
    num_page_faults: AtomicU64,
    num_page_ins: AtomicU64,
    num_page_outs: AtomicU64,
}

/// Point-in-time copy of all counters, for reporting and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_ticks: Tick,
    pub system_ticks: Tick,
    pub user_ticks: Tick,
    pub idle_ticks: Tick,
    pub num_disk_reads: u64,
    pub num_disk_writes: u64,
    pub num_console_chars_read: u64,
    pub num_console_chars_written: u64,
    pub num_page_faults: u64,
    pub num_page_ins: u64,
    pub num_page_outs: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            total_ticks: AtomicU64::new(0),
            system_ticks: AtomicU64::new(0),
            user_ticks: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            num_disk_reads: AtomicU64::new(0),
            num_disk_writes: AtomicU64::new(0),
            num_console_chars_read: AtomicU64::new(0),
            num_console_chars_written: AtomicU64::new(0),
            num_page_faults: AtomicU64::new(0),
            num_page_ins: AtomicU64::new(0),
            num_page_outs: AtomicU64::new(0),
        }
    }

    /// Current virtual time.
    pub fn total_ticks(&self) -> Tick {
        self.total_ticks.load(Ordering::Acquire)
    }

    /// Advance the clock by `ticks` of kernel time.
    pub fn bill_system(&self, ticks: Tick) {
        self.system_ticks.fetch_add(ticks, Ordering::Release);
        self.total_ticks.fetch_add(ticks, Ordering::Release);
    }

    /// Advance the clock by `ticks` of user-instruction time.
    pub fn bill_user(&self, ticks: Tick) {
        self.user_ticks.fetch_add(ticks, Ordering::Release);
        self.total_ticks.fetch_add(ticks, Ordering::Release);
    }

    /// Advance the clock by `ticks` of idle waiting.
    pub fn bill_idle(&self, ticks: Tick) {
        self.idle_ticks.fetch_add(ticks, Ordering::Release);
        self.total_ticks.fetch_add(ticks, Ordering::Release);
    }

    pub fn count_disk_read(&self) {
        self.num_disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_disk_write(&self) {
        self.num_disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_console_read(&self) {
        self.num_console_chars_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_console_write(&self) {
        self.num_console_chars_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_page_fault(&self) {
        self.num_page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_page_in(&self) {
        self.num_page_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_page_out(&self) {
        self.num_page_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_ticks: self.total_ticks.load(Ordering::Acquire),
            system_ticks: self.system_ticks.load(Ordering::Acquire),
            user_ticks: self.user_ticks.load(Ordering::Acquire),
            idle_ticks: self.idle_ticks.load(Ordering::Acquire),
            num_disk_reads: self.num_disk_reads.load(Ordering::Acquire),
            num_disk_writes: self.num_disk_writes.load(Ordering::Acquire),
            num_console_chars_read: self.num_console_chars_read.load(Ordering::Acquire),
            num_console_chars_written: self.num_console_chars_written.load(Ordering::Acquire),
            num_page_faults: self.num_page_faults.load(Ordering::Acquire),
            num_page_ins: self.num_page_ins.load(Ordering::Acquire),
            num_page_outs: self.num_page_outs.load(Ordering::Acquire),
        }
    }

    /// Emit the end-of-run report through the log facade.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        log::info!(
            "Ticks: total {}, system {}, user {}, idle {}",
            s.total_ticks,
            s.system_ticks,
            s.user_ticks,
            s.idle_ticks
        );
        log::info!(
            "Disk I/O: reads {}, writes {}",
            s.num_disk_reads,
            s.num_disk_writes
        );
        log::info!(
            "Console I/O: reads {}, writes {}",
            s.num_console_chars_read,
            s.num_console_chars_written
        );
        log::info!(
            "Paging: faults {}, ins {}, outs {}",
            s.num_page_faults,
            s.num_page_ins,
            s.num_page_outs
        );
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_buckets_sum_to_total() {
        let stats = Statistics::new();
        stats.bill_system(30);
        stats.bill_user(7);
        stats.bill_idle(463);

        let s = stats.snapshot();
        assert_eq!(s.total_ticks, 500);
        assert_eq!(s.system_ticks + s.user_ticks + s.idle_ticks, s.total_ticks);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let stats = Statistics::new();
        stats.count_disk_read();
        stats.count_disk_read();
        stats.count_disk_write();
        stats.count_console_write();

        let s = stats.snapshot();
        assert_eq!(s.num_disk_reads, 2);
        assert_eq!(s.num_disk_writes, 1);
        assert_eq!(s.num_console_chars_written, 1);
        assert_eq!(s.num_console_chars_read, 0);
    }
}
