/*
 * Scenario Test Suites
 *
 * End-to-end simulations: whole machines built per case, driven through
 * the public surface, checked against the externally observable
 * ordering and accounting guarantees.
 */

mod synchronization;

use std::sync::Arc;

use crate::config::{MachineConfig, Tick};
use crate::interrupt::MachineMode;
use crate::kernel::Kernel;
use crate::scheduler::policy::SchedPolicy;
use crate::scheduler::thread::{KThread, Priority, ThreadStatus};

/// Shared completion log the workers append to.
pub(crate) type RunLog = Arc<spin::Mutex<Vec<&'static str>>>;

pub(crate) fn run_log() -> RunLog {
    Arc::new(spin::Mutex::new(Vec::new()))
}

pub(crate) fn config_with(policy: SchedPolicy) -> MachineConfig {
    MachineConfig {
        policy,
        ..MachineConfig::default()
    }
}

/// Execute `ticks` user instructions on the calling thread, keeping its
/// burst estimate in step the way a CPU loop would.
pub(crate) fn burn_user(kernel: &Arc<Kernel>, ticks: Tick) {
    let me = kernel.current_thread();
    assert_eq!(me.status(), ThreadStatus::Running);
    let prior = kernel.interrupt.set_mode(MachineMode::User);
    for _ in 0..ticks {
        kernel.interrupt.one_tick(kernel);
        let left = me.time_left().saturating_sub(1);
        me.set_time_left(left);
    }
    kernel.interrupt.set_mode(prior);
}

/// Fork a worker that burns `burst` user ticks and then logs its name.
pub(crate) fn spawn_worker(
    kernel: &Arc<Kernel>,
    name: &'static str,
    priority: Priority,
    burst: Tick,
    log: &RunLog,
) {
    let thread = KThread::with_priority(name, priority);
    thread.set_time_left(burst);
    let log = log.clone();
    thread.fork(kernel, move |kernel| {
        burn_user(kernel, burst);
        log.lock().push(name);
    });
}
