/*
 * Kernel Threads
 *
 * A KThread is a cooperative kernel thread: a name, a priority, a burst
 * estimate for SJF, a lifecycle status, and the rendezvous that parks
 * and releases its host OS thread. Each simulated thread is carried by
 * one host thread, but the rendezvous guarantees the uniprocessor
 * invariant: a host thread executes simulated code only while its
 * KThread is the running one.
 *
 * Lifecycle: JustCreated -> (fork) -> Ready -> Running <-> {Ready,
 * Blocked} -> (finish) -> destroyed. The suspension points are yield,
 * sleep, and finish; nothing else gives up the CPU.
 */

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::sync::{Condvar, Mutex as HostMutex};

use crate::config::Tick;
use crate::interrupt::IntMask;
use crate::kernel::Kernel;

/// Thread priority; numerically smaller is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Max = 0,
    Norm = 1,
    Min = 2,
}

/// Thread lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    JustCreated,
    Running,
    Ready,
    Blocked,
}

/// The body a forked thread executes.
pub type Runnable = Box<dyn FnOnce(&Arc<Kernel>) + Send + 'static>;

/// User-level CPU state attached to a thread by the (external) user
/// program layer. Saved and restored around context switches when user
/// program support is enabled.
pub trait AddressSpace: Send {
    fn save_user_state(&mut self);
    fn restore_user_state(&mut self);
}

/// Unwind payload used to tear a destroyed thread's host stack down.
struct ThreadExit;

/// Host-thread rendezvous states.
enum RunState {
    /// Waiting to be handed the CPU.
    Parked,
    /// Handed the CPU; the wait returns.
    Go,
    /// Destroyed; the wait unwinds the host thread.
    Dead,
}

/// One-slot handshake between the scheduler and a thread's host thread.
///
/// State-based rather than event-based: a wake that arrives before the
/// wait is not lost, and a thread switching to itself observes its own
/// `Go` immediately.
struct Switchboard {
    state: HostMutex<RunState>,
    cond: Condvar,
}

impl Switchboard {
    fn new() -> Self {
        Self {
            state: HostMutex::new(RunState::Parked),
            cond: Condvar::new(),
        }
    }

    /// Hand the CPU to this thread.
    fn wake(&self) {
        let mut state = self.state.lock().unwrap();
        *state = RunState::Go;
        self.cond.notify_one();
    }

    /// Destroy this thread; its host thread unwinds out of its entry
    /// closure the next time it checks the board.
    fn kill(&self) {
        let mut state = self.state.lock().unwrap();
        *state = RunState::Dead;
        self.cond.notify_one();
    }

    /// Park until handed the CPU. Unwinds with `ThreadExit` if the
    /// thread was destroyed instead.
    fn wait_for_cpu(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                RunState::Go => {
                    *state = RunState::Parked;
                    return;
                }
                RunState::Dead => {
                    drop(state);
                    resume_unwind(Box::new(ThreadExit));
                }
                RunState::Parked => {
                    state = self.cond.wait(state).unwrap();
                }
            }
        }
    }
}

struct ThreadCore {
    status: ThreadStatus,
    time_left: Tick,
    forked: bool,
}

/// A cooperative kernel thread.
pub struct KThread {
    name: String,
    priority: Priority,
    core: spin::Mutex<ThreadCore>,
    addr_space: spin::Mutex<Option<Box<dyn AddressSpace>>>,
    board: Switchboard,
}

impl KThread {
    /// Create a thread at normal priority with no burst estimate.
    pub fn new(name: &str) -> Arc<KThread> {
        Self::with_priority(name, Priority::Norm)
    }

    pub fn with_priority(name: &str, priority: Priority) -> Arc<KThread> {
        Arc::new(KThread {
            name: name.to_string(),
            priority,
            core: spin::Mutex::new(ThreadCore {
                status: ThreadStatus::JustCreated,
                time_left: 0,
                forked: false,
            }),
            addr_space: spin::Mutex::new(None),
            board: Switchboard::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Estimated remaining burst, the SJF dispatch key.
    pub fn time_left(&self) -> Tick {
        self.core.lock().time_left
    }

    /// Update the burst estimate. The simulator never maintains this
    /// itself; the layer billing user instructions does.
    pub fn set_time_left(&self, ticks: Tick) {
        self.core.lock().time_left = ticks;
    }

    pub fn status(&self) -> ThreadStatus {
        self.core.lock().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.core.lock().status = status;
    }

    /// Attach user-level CPU state to this thread.
    pub fn set_addr_space(&self, space: Box<dyn AddressSpace>) {
        *self.addr_space.lock() = Some(space);
    }

    pub(crate) fn save_user_state(&self) {
        if let Some(space) = self.addr_space.lock().as_mut() {
            space.save_user_state();
        }
    }

    pub(crate) fn restore_user_state(&self) {
        if let Some(space) = self.addr_space.lock().as_mut() {
            space.restore_user_state();
        }
    }

    /// Make this thread runnable, executing `runnable` on its own host
    /// thread once dispatched.
    ///
    /// If the new thread would preempt the running one under the active
    /// policy, the switch happens before `fork` returns (immediately, or
    /// after the current handler unwinds when called from handler
    /// context).
    ///
    /// # Panics
    /// Panics if the thread was already forked.
    pub fn fork<F>(self: &Arc<Self>, kernel: &Arc<Kernel>, runnable: F)
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        let old_mask = kernel.interrupt.set_mask(kernel, IntMask::Off);
        {
            let mut core = self.core.lock();
            assert!(!core.forked, "thread '{}' forked twice", self.name);
            core.forked = true;
        }
        log::debug!("forking thread '{}'", self.name);
        self.spawn_host(kernel, Box::new(runnable));

        let current = kernel.scheduler.current_thread();
        let policy = kernel.scheduler.policy();
        if kernel.interrupt.in_handler() {
            // Handlers never switch; ready_to_run requests the yield.
            kernel.scheduler.ready_to_run(kernel, self.clone());
        } else if policy.should_switch(&current, self) {
            current.set_status(ThreadStatus::Ready);
            kernel.scheduler.ready_to_run(kernel, current.clone());
            kernel.scheduler.run(kernel, self.clone());
        } else {
            kernel.scheduler.ready_to_run(kernel, self.clone());
        }
        kernel.interrupt.set_mask(kernel, old_mask);
    }

    /// Give up the CPU to the next ready thread, if any.
    pub fn yield_now(self: &Arc<Self>, kernel: &Arc<Kernel>) {
        let old_mask = kernel.interrupt.set_mask(kernel, IntMask::Off);
        assert!(
            Arc::ptr_eq(self, &kernel.scheduler.current_thread()),
            "yield from a thread that is not running"
        );
        log::trace!("thread '{}' yielding", self.name);
        if let Some(next) = kernel.scheduler.find_next_to_run() {
            kernel.scheduler.ready_to_run(kernel, self.clone());
            kernel.scheduler.run(kernel, next);
        }
        kernel.interrupt.set_mask(kernel, old_mask);
    }

    /// Block this thread until something re-readies it.
    ///
    /// If no thread is ready the machine idles, which advances the clock
    /// to the next pending interrupt; a handler there may wake someone
    /// (possibly this very thread). Returns once a wakeup has scheduled
    /// this thread again.
    ///
    /// # Panics
    /// Panics if interrupts are enabled on entry.
    pub fn sleep(self: &Arc<Self>, kernel: &Arc<Kernel>) {
        assert_eq!(
            kernel.interrupt.mask(),
            IntMask::Off,
            "sleep requires interrupts off"
        );
        assert!(
            Arc::ptr_eq(self, &kernel.scheduler.current_thread()),
            "sleep from a thread that is not running"
        );
        log::trace!("thread '{}' sleeping", self.name);
        self.set_status(ThreadStatus::Blocked);
        let next = loop {
            if let Some(next) = kernel.scheduler.find_next_to_run() {
                break next;
            }
            kernel.interrupt.idle(kernel);
        };
        kernel.scheduler.run(kernel, next);
    }

    /// Terminate this thread. Its resources are released by the next
    /// thread to run; never returns.
    pub fn finish(self: &Arc<Self>, kernel: &Arc<Kernel>) -> ! {
        kernel.interrupt.set_mask(kernel, IntMask::Off);
        assert!(
            Arc::ptr_eq(self, &kernel.scheduler.current_thread()),
            "finish from a thread that is not running"
        );
        log::debug!("thread '{}' finishing", self.name);
        kernel.scheduler.mark_for_destruction(self.clone());
        self.sleep(kernel);
        unreachable!("destroyed thread was rescheduled");
    }

    pub(crate) fn hand_cpu(&self) {
        self.board.wake();
    }

    pub(crate) fn destroy(&self) {
        self.board.kill();
    }

    pub(crate) fn park_until_dispatched(&self) {
        self.board.wait_for_cpu();
    }

    /// Spawn the host thread that will carry this KThread. It parks
    /// immediately and runs only once the scheduler dispatches it.
    fn spawn_host(self: &Arc<Self>, kernel: &Arc<Kernel>, runnable: Runnable) {
        let thread = self.clone();
        let kernel = kernel.clone();
        let host = std::thread::Builder::new()
            .name(format!("deuk-{}", self.name))
            .spawn(move || {
                let name = thread.name.clone();
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    thread.park_until_dispatched();
                    // First dispatch: complete the switch that got us
                    // here, then enter the body with interrupts on.
                    kernel.scheduler.finish_switch();
                    kernel.interrupt.set_mask(&kernel, IntMask::On);
                    runnable(&kernel);
                    thread.finish(&kernel);
                }));
                match outcome {
                    Err(payload) if payload.is::<ThreadExit>() => {
                        log::trace!("thread '{}' torn down", name);
                    }
                    Err(_) => {
                        // A panic in simulated code is a kernel bug; the
                        // simulation cannot continue past it.
                        log::error!("thread '{}' panicked; aborting simulation", name);
                        std::process::abort();
                    }
                    Ok(()) => unreachable!("finish returned"),
                }
            });
        host.expect("failed to spawn host thread");
    }
}

impl fmt::Debug for KThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KThread")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .field("time_left", &self.time_left())
            .finish()
    }
}
