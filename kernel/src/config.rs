/*
 * Machine Configuration
 *
 * This module defines the configuration surface the simulation core
 * consumes from its callers: the scheduling policy, the tick constants
 * that price every simulated operation, and the seed for the random
 * timer mode. Values only; argument parsing belongs to the embedding
 * program.
 */

use crate::scheduler::policy::SchedPolicy;

/// Atomic unit of virtual time.
pub type Tick = u64;

/// Configuration of one simulated machine.
///
/// A `MachineConfig` is fixed at `Kernel::new` time; nothing in it is
/// mutable once the simulation has started. The tick constants price the
/// three billable activities (kernel operation, user instruction, idle
/// waiting) and the device latencies.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Thread dispatch policy, process-wide.
    pub policy: SchedPolicy,

    /// Whether context switches save/restore user CPU state.
    pub user_program_enabled: bool,

    /// Seed for the random timer mode.
    pub random_seed: u64,

    /// Cost of one kernel operation.
    pub system_tick: Tick,

    /// Cost of one user instruction.
    pub user_tick: Tick,

    /// Period between timer interrupts, and the Round-Robin quantum.
    pub timer_ticks: Tick,

    /// Disk head movement cost per track.
    pub seek_time: Tick,

    /// Time for one disk sector to rotate under the head.
    pub rotation_time: Tick,

    /// Console poll period and per-character output latency.
    pub console_time: Tick,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            policy: SchedPolicy::Fcfs,
            user_program_enabled: false,
            random_seed: 0,
            system_tick: 10,
            user_tick: 1,
            timer_ticks: 100,
            seek_time: 500,
            rotation_time: 500,
            console_time: 100,
        }
    }
}
