/*
 * Thread Scheduler
 *
 * The dispatch mechanism: one ready queue whose discipline is a
 * function of the active policy, the current-thread slot, and the
 * context-switch protocol. Every entry point that touches shared
 * scheduler state requires interrupts off; masking is the kernel's
 * mutual exclusion, not locks.
 *
 * A context switch hands the CPU to the incoming thread's host thread
 * and parks the outgoing one. The code after the switch runs when the
 * outgoing thread is next dispatched: it destroys a finished
 * predecessor and restores user state. Under Round-Robin each dispatch
 * also arms a fresh quantum interrupt whose handler requests preemption.
 */

pub mod policy;
pub mod thread;

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use crate::interrupt::IntMask;
use crate::interrupt::pending::InterruptHandle;
use crate::interrupt::pending::InterruptKind;
use crate::kernel::Kernel;
use policy::SchedPolicy;
use thread::{KThread, ThreadStatus};

struct SchedInner {
    ready: VecDeque<Arc<KThread>>,
    current: Option<Arc<KThread>>,
    to_destroy: Option<Arc<KThread>>,
    quantum: Option<InterruptHandle>,
}

pub struct Scheduler {
    policy: SchedPolicy,
    inner: Mutex<SchedInner>,
}

impl Scheduler {
    pub(crate) fn new(policy: SchedPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(SchedInner {
                ready: VecDeque::new(),
                current: None,
                to_destroy: None,
                quantum: None,
            }),
        }
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    /// The thread currently holding the CPU.
    ///
    /// # Panics
    /// Panics if called before the kernel adopted its first thread.
    pub fn current_thread(&self) -> Arc<KThread> {
        self.inner
            .lock()
            .current
            .clone()
            .expect("no current thread")
    }

    /// Install the first current thread. Used once, at kernel creation.
    pub(crate) fn adopt_current(&self, thread: Arc<KThread>) {
        let mut inner = self.inner.lock();
        assert!(inner.current.is_none(), "current thread already adopted");
        inner.current = Some(thread);
    }

    /// Number of threads waiting in the ready queue.
    pub fn ready_count(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Mark `thread` Ready and enqueue it for dispatch.
    ///
    /// From handler context, additionally requests preemption if the
    /// thread would outrank the running one under the active policy;
    /// the actual switch happens after the handler unwinds.
    ///
    /// # Panics
    /// Panics if interrupts are enabled.
    pub fn ready_to_run(&self, kernel: &Arc<Kernel>, thread: Arc<KThread>) {
        assert_eq!(
            kernel.interrupt.mask(),
            IntMask::Off,
            "ready_to_run requires interrupts off"
        );
        log::debug!("readying thread '{}'", thread.name());
        thread.set_status(ThreadStatus::Ready);
        self.inner.lock().ready.push_back(thread.clone());

        if kernel.interrupt.in_handler() {
            let current = self.current_thread();
            if self.policy.should_switch(&current, &thread) {
                kernel.interrupt.yield_on_return();
            }
        }
    }

    /// Remove and return the next thread to dispatch, per the policy.
    pub fn find_next_to_run(&self) -> Option<Arc<KThread>> {
        let mut inner = self.inner.lock();
        self.policy.select_next(&mut inner.ready)
    }

    /// Switch the CPU from the calling thread to `next`.
    ///
    /// The caller has already moved itself to Ready or Blocked. Returns
    /// when the calling thread is dispatched again; the first thing it
    /// does then is complete the switch that resumed it (destroying a
    /// finished predecessor, restoring its own user state).
    ///
    /// # Panics
    /// Panics if interrupts are enabled.
    pub fn run(&self, kernel: &Arc<Kernel>, next: Arc<KThread>) {
        assert_eq!(
            kernel.interrupt.mask(),
            IntMask::Off,
            "run requires interrupts off"
        );
        let old = {
            let mut inner = self.inner.lock();
            let old = inner.current.take().expect("no current thread");
            inner.current = Some(next.clone());
            old
        };
        if kernel.config.user_program_enabled {
            old.save_user_state();
        }
        next.set_status(ThreadStatus::Running);
        log::debug!("context switch: '{}' -> '{}'", old.name(), next.name());
        if self.policy.preempts_on_timer() {
            self.arm_quantum(kernel);
        }

        next.hand_cpu();
        old.park_until_dispatched();

        // Running again, in the formerly outgoing thread.
        self.finish_switch();
        if kernel.config.user_program_enabled {
            old.restore_user_state();
        }
    }

    /// Hand the CPU to `next` without parking the caller. Used by the
    /// kernel bootstrap, whose host thread waits on the halt gate
    /// instead of a switchboard.
    pub(crate) fn dispatch_first(&self, kernel: &Arc<Kernel>, next: Arc<KThread>) {
        let mut inner = self.inner.lock();
        inner.current = Some(next.clone());
        drop(inner);
        next.set_status(ThreadStatus::Running);
        log::debug!("dispatching first thread '{}'", next.name());
        if self.policy.preempts_on_timer() {
            self.arm_quantum(kernel);
        }
        next.hand_cpu();
    }

    /// Post-switch bookkeeping, run by whichever thread just received
    /// the CPU: destroy a finished predecessor.
    pub(crate) fn finish_switch(&self) {
        let doomed = { self.inner.lock().to_destroy.take() };
        if let Some(thread) = doomed {
            log::debug!("destroying finished thread '{}'", thread.name());
            thread.destroy();
        }
    }

    /// Record the calling thread for destruction by its successor.
    pub(crate) fn mark_for_destruction(&self, thread: Arc<KThread>) {
        let mut inner = self.inner.lock();
        assert!(
            inner.to_destroy.is_none(),
            "two threads pending destruction"
        );
        inner.to_destroy = Some(thread);
    }

    /// Arm a fresh Round-Robin quantum for the incoming thread. The
    /// previous quantum interrupt is cancelled so a voluntary switch
    /// cannot shorten the next thread's slice.
    fn arm_quantum(&self, kernel: &Arc<Kernel>) {
        let previous = { self.inner.lock().quantum.take() };
        if let Some(handle) = previous {
            handle.cancel();
        }
        let handle = kernel.interrupt.schedule(
            kernel,
            Arc::new(|kernel: &Arc<Kernel>| kernel.interrupt.yield_on_return()),
            kernel.config.timer_ticks,
            InterruptKind::Timer,
        );
        self.inner.lock().quantum = Some(handle);
    }
}
