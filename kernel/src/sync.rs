/*
 * Synchronization Primitives
 *
 * Semaphore and Lock built directly on thread sleep/wake. Mutual
 * exclusion inside the primitives is interrupt masking, the same
 * discipline as every other scheduler entry point; the internal spin
 * mutex only makes the host-thread sharing sound.
 *
 * `v` is handler-safe: it masks interrupts (a no-op inside a handler)
 * and only readies the waiter, so device completion handlers use it to
 * wake request issuers.
 */

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use crate::interrupt::IntMask;
use crate::kernel::Kernel;
use crate::scheduler::thread::KThread;

struct SemInner {
    value: u64,
    waiters: VecDeque<Arc<KThread>>,
}

/// Counting semaphore with a FIFO wait queue.
pub struct Semaphore {
    name: String,
    inner: Mutex<SemInner>,
}

impl Semaphore {
    pub fn new(name: &str, initial: u64) -> Semaphore {
        Semaphore {
            name: name.to_string(),
            inner: Mutex::new(SemInner {
                value: initial,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Decrement, sleeping until the count is positive.
    pub fn p(&self, kernel: &Arc<Kernel>) {
        let old_mask = kernel.interrupt.set_mask(kernel, IntMask::Off);
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.value > 0 {
                    inner.value -= 1;
                    break;
                }
                let current = kernel.scheduler.current_thread();
                log::trace!(
                    "thread '{}' waiting on semaphore '{}'",
                    current.name(),
                    self.name
                );
                inner.waiters.push_back(current);
            }
            kernel.scheduler.current_thread().sleep(kernel);
        }
        kernel.interrupt.set_mask(kernel, old_mask);
    }

    /// Increment, readying the longest-waiting thread if any.
    pub fn v(&self, kernel: &Arc<Kernel>) {
        let old_mask = kernel.interrupt.set_mask(kernel, IntMask::Off);
        let waiter = { self.inner.lock().waiters.pop_front() };
        if let Some(thread) = waiter {
            kernel.scheduler.ready_to_run(kernel, thread);
        }
        self.inner.lock().value += 1;
        kernel.interrupt.set_mask(kernel, old_mask);
    }
}

/// Binary lock with holder tracking.
///
/// Release asserts the caller is the holder; handing a held lock to
/// another thread for release is a kernel bug.
pub struct Lock {
    sem: Semaphore,
    holder: Mutex<Option<Arc<KThread>>>,
}

impl Lock {
    pub fn new(name: &str) -> Lock {
        Lock {
            sem: Semaphore::new(name, 1),
            holder: Mutex::new(None),
        }
    }

    pub fn acquire(&self, kernel: &Arc<Kernel>) {
        self.sem.p(kernel);
        *self.holder.lock() = Some(kernel.scheduler.current_thread());
    }

    pub fn release(&self, kernel: &Arc<Kernel>) {
        assert!(
            self.held_by_current(kernel),
            "lock released by a thread that does not hold it"
        );
        *self.holder.lock() = None;
        self.sem.v(kernel);
    }

    pub fn held_by_current(&self, kernel: &Arc<Kernel>) -> bool {
        self.holder
            .lock()
            .as_ref()
            .is_some_and(|t| Arc::ptr_eq(t, &kernel.scheduler.current_thread()))
    }
}
