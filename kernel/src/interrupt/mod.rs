/*
 * Virtual-Time Interrupt Controller
 *
 * The controller owns the machine's notion of time. The virtual clock
 * advances in exactly two places: `one_tick`, which bills the cost of
 * the operation that just happened (a kernel operation or one user
 * instruction), and `idle`, which jumps the clock forward to the next
 * pending interrupt when no thread can run.
 *
 * Interrupt masking is the kernel's only mutual-exclusion mechanism.
 * Handlers are dispatched with the mask forced off and must not enable
 * it; re-enabling interrupts after a masked section is itself a billable
 * event (the clock moves one tick and due handlers run).
 *
 * Preemption is requested, never performed, from handler context: a
 * handler calls `yield_on_return`, and the interrupted thread yields
 * after the dispatch loop unwinds.
 */

pub mod pending;

use std::sync::Arc;

use spin::Mutex;

use crate::config::Tick;
use crate::kernel::Kernel;
use pending::{InterruptHandle, InterruptHandler, InterruptKind, PendingQueue};

/// Global interrupt mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntMask {
    Off,
    On,
}

/// What the machine is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineMode {
    Idle,
    System,
    User,
}

struct IntControl {
    mask: IntMask,
    in_handler: bool,
    yield_on_return: bool,
    mode: MachineMode,
}

pub struct InterruptController {
    control: Mutex<IntControl>,
    pending: Mutex<PendingQueue>,
}

impl InterruptController {
    pub(crate) fn new() -> Self {
        Self {
            control: Mutex::new(IntControl {
                mask: IntMask::Off,
                in_handler: false,
                yield_on_return: false,
                mode: MachineMode::System,
            }),
            pending: Mutex::new(PendingQueue::new()),
        }
    }

    /// Queue `handler` to run `from_now` ticks in the future.
    ///
    /// Returns a handle whose only capability is cancellation. Scheduling
    /// at the current instant is a kernel bug: a zero delay would have to
    /// fire in the past by the time dispatch runs.
    ///
    /// # Panics
    /// Panics if `from_now` is zero.
    pub fn schedule(
        &self,
        kernel: &Arc<Kernel>,
        handler: InterruptHandler,
        from_now: Tick,
        kind: InterruptKind,
    ) -> InterruptHandle {
        assert!(from_now > 0, "interrupt scheduled with zero delay");
        let when = kernel.stats.total_ticks() + from_now;
        log::trace!("scheduling {} interrupt at tick {}", kind.name(), when);
        self.pending.lock().insert(handler, when, kind)
    }

    /// Current interrupt mask.
    pub fn mask(&self) -> IntMask {
        self.control.lock().mask
    }

    /// Set the interrupt mask, returning the previous one.
    ///
    /// Enabling from handler context is forbidden; the attempt is logged
    /// and ignored. An off-to-on transition is a billable event: the
    /// clock advances one tick and due interrupts are dispatched before
    /// this returns.
    pub fn set_mask(&self, kernel: &Arc<Kernel>, new: IntMask) -> IntMask {
        let old;
        {
            let mut control = self.control.lock();
            old = control.mask;
            if new == IntMask::On && control.in_handler {
                log::error!("interrupt handler attempted to enable interrupts; ignored");
                return old;
            }
            control.mask = new;
        }
        if old == IntMask::Off && new == IntMask::On {
            self.one_tick(kernel);
        }
        old
    }

    /// Current machine mode.
    pub fn mode(&self) -> MachineMode {
        self.control.lock().mode
    }

    /// Set the machine mode, returning the previous one.
    pub fn set_mode(&self, mode: MachineMode) -> MachineMode {
        let mut control = self.control.lock();
        let old = control.mode;
        control.mode = mode;
        old
    }

    pub fn in_handler(&self) -> bool {
        self.control.lock().in_handler
    }

    /// Request that the interrupted thread yield once the current
    /// dispatch unwinds. Only meaningful from handler context.
    pub fn yield_on_return(&self) {
        let mut control = self.control.lock();
        assert!(
            control.in_handler,
            "yield_on_return requested outside an interrupt handler"
        );
        control.yield_on_return = true;
    }

    /// Advance virtual time by one operation's cost and dispatch any
    /// interrupts that became due.
    ///
    /// The cost billed depends on the machine mode: a user instruction
    /// in `User` mode, a kernel operation otherwise. Dispatch runs with
    /// interrupts forced off; the mask is on when this returns. If a
    /// handler requested preemption, the running thread yields here,
    /// after the dispatch loop, in system mode.
    pub fn one_tick(&self, kernel: &Arc<Kernel>) {
        let mode = self.mode();
        match mode {
            MachineMode::User => kernel.stats.bill_user(kernel.config.user_tick),
            _ => kernel.stats.bill_system(kernel.config.system_tick),
        }

        self.control.lock().mask = IntMask::Off;
        while self.check_if_due(kernel, false) {}
        self.control.lock().mask = IntMask::On;

        let preempt = {
            let mut control = self.control.lock();
            let requested = control.yield_on_return;
            control.yield_on_return = false;
            requested
        };
        if preempt {
            let prior = self.set_mode(MachineMode::System);
            let current = kernel.scheduler.current_thread();
            current.yield_now(kernel);
            self.set_mode(prior);
        }
    }

    /// Dispatch the next pending interrupt if it is due.
    ///
    /// With `advance_clock` set, an in-the-future head entry drags the
    /// clock forward to its timestamp (billed as idle time) instead of
    /// being put back. Returns whether a record was consumed.
    fn check_if_due(&self, kernel: &Arc<Kernel>, advance_clock: bool) -> bool {
        let Some(entry) = self.pending.lock().pop() else {
            return false;
        };

        let now = kernel.stats.total_ticks();
        if entry.when > now {
            if advance_clock {
                kernel.stats.bill_idle(entry.when - now);
            } else {
                self.pending.lock().reinsert(entry);
                return false;
            }
        }

        // An idle machine whose only pending interrupt is the time-slice
        // timer has nothing left to wake: firing it would spin forever.
        if self.mode() == MachineMode::Idle
            && entry.kind == InterruptKind::Timer
            && self.pending.lock().is_empty()
        {
            self.pending.lock().reinsert(entry);
            return false;
        }

        if !entry.is_cancelled() {
            log::trace!(
                "dispatching {} interrupt scheduled for tick {}",
                entry.kind.name(),
                entry.when
            );
            let prior_mode = {
                let mut control = self.control.lock();
                control.in_handler = true;
                let prior = control.mode;
                control.mode = MachineMode::System;
                prior
            };
            (entry.handler)(kernel);
            {
                let mut control = self.control.lock();
                control.mode = prior_mode;
                control.in_handler = false;
            }
        }
        true
    }

    /// Called when the ready queue is empty and the current thread
    /// cannot continue. Jumps the clock to the next pending interrupt
    /// and dispatches it; if nothing can ever wake a thread again, the
    /// machine halts.
    pub fn idle(&self, kernel: &Arc<Kernel>) {
        log::trace!("machine idling at tick {}", kernel.stats.total_ticks());
        self.set_mode(MachineMode::Idle);
        if self.check_if_due(kernel, true) {
            while self.check_if_due(kernel, false) {}
            let mut control = self.control.lock();
            control.yield_on_return = false;
            control.mode = MachineMode::System;
            return;
        }
        self.halt(kernel)
    }

    /// End the simulation: log the statistics summary, release the
    /// `Kernel::run` caller, and park the calling simulated thread
    /// forever. Never returns to simulated code.
    pub fn halt(&self, kernel: &Arc<Kernel>) -> ! {
        log::info!("machine halting at tick {}", kernel.stats.total_ticks());
        kernel.stats.log_summary();
        kernel.open_halt_gate();
        loop {
            std::thread::park();
        }
    }

    /// Number of queued records, cancelled ones included.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
