/*
 * Kernel Context
 *
 * One `Kernel` value is one simulated machine: configuration,
 * statistics, the interrupt controller, and the thread scheduler, owned
 * together and threaded through every component call. There is no
 * ambient state; two kernels in one process are fully isolated.
 *
 * The host thread that creates the kernel is adopted as the `bootstrap`
 * thread, so the controller and scheduler can be exercised directly.
 * `run` hands the machine over to a forked `main` thread and blocks the
 * caller on the halt gate until the simulation ends.
 */

use std::sync::Arc;
use std::sync::{Condvar, Mutex as HostMutex};

use crate::config::MachineConfig;
use crate::interrupt::{IntMask, InterruptController};
use crate::scheduler::Scheduler;
use crate::scheduler::thread::{KThread, Priority, ThreadStatus};
use crate::stats::{Statistics, StatsSnapshot};

/// Blocks the `run` caller until the machine halts.
struct HaltGate {
    halted: HostMutex<bool>,
    cond: Condvar,
}

pub struct Kernel {
    pub config: MachineConfig,
    pub stats: Statistics,
    pub interrupt: InterruptController,
    pub scheduler: Scheduler,
    halt_gate: HaltGate,
}

impl Kernel {
    /// Build a machine from `config` and adopt the calling host thread
    /// as its bootstrap thread.
    ///
    /// The bootstrap thread runs at `Priority::Max` with a zero burst
    /// estimate, so nothing forked from it can preempt it; interrupts
    /// start masked, as on real hardware before kernel init completes.
    pub fn new(config: MachineConfig) -> Arc<Kernel> {
        let scheduler = Scheduler::new(config.policy);
        log::info!("machine created with policy {}", config.policy.name());
        let kernel = Arc::new(Kernel {
            config,
            stats: Statistics::new(),
            interrupt: InterruptController::new(),
            scheduler,
            halt_gate: HaltGate {
                halted: HostMutex::new(false),
                cond: Condvar::new(),
            },
        });
        let bootstrap = KThread::with_priority("bootstrap", Priority::Max);
        bootstrap.set_status(ThreadStatus::Running);
        kernel.scheduler.adopt_current(bootstrap);
        kernel
    }

    /// The thread currently holding the CPU.
    pub fn current_thread(&self) -> Arc<KThread> {
        self.scheduler.current_thread()
    }

    /// Run a simulation: fork a `main` thread executing `boot`, hand it
    /// the CPU, and block until the machine halts. Returns the final
    /// statistics.
    ///
    /// The machine halts when no thread is runnable and no pending
    /// interrupt other than the time-slice timer could wake one. The
    /// calling host thread retires permanently from scheduling; `run`
    /// is a once-per-kernel operation.
    pub fn run<F>(self: &Arc<Self>, boot: F) -> StatsSnapshot
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        let main = KThread::new("main");
        main.fork(self, boot);

        self.interrupt.set_mask(self, IntMask::Off);
        let bootstrap = self.scheduler.current_thread();
        bootstrap.set_status(ThreadStatus::Blocked);
        let next = loop {
            if let Some(next) = self.scheduler.find_next_to_run() {
                break next;
            }
            self.interrupt.idle(self);
        };
        self.scheduler.dispatch_first(self, next);

        self.wait_halted();
        self.stats.snapshot()
    }

    /// Whether the machine has halted.
    pub fn halted(&self) -> bool {
        *self.halt_gate.halted.lock().unwrap()
    }

    pub(crate) fn open_halt_gate(&self) {
        let mut halted = self.halt_gate.halted.lock().unwrap();
        *halted = true;
        self.halt_gate.cond.notify_all();
    }

    fn wait_halted(&self) {
        let mut halted = self.halt_gate.halted.lock().unwrap();
        while !*halted {
            halted = self.halt_gate.cond.wait(halted).unwrap();
        }
    }
}
