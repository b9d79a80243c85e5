/*
 * Synchronization Scenarios
 *
 * Semaphores and locks exercised across real context switches: blocked
 * waiters, handler-driven wakeups, and critical sections spanning
 * voluntary yields.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};


use crate::kernel::Kernel;
use crate::scheduler::policy::SchedPolicy;
use crate::scheduler::thread::KThread;
use crate::sync::{Lock, Semaphore};

use super::{config_with, run_log};

#[test]
fn test_semaphore_blocks_until_signalled() {
    let kernel = Kernel::new(config_with(SchedPolicy::Fcfs));
    let order = run_log();
    let boot_order = order.clone();

    kernel.run(move |kernel| {
        let sem = Arc::new(Semaphore::new("handoff", 0));

        let waiter = KThread::new("waiter");
        let wait_sem = sem.clone();
        let wait_log = boot_order.clone();
        waiter.fork(kernel, move |kernel| {
            wait_sem.p(kernel);
            wait_log.lock().push("waiter");
        });

        let producer = KThread::new("producer");
        let prod_sem = sem.clone();
        let prod_log = boot_order.clone();
        producer.fork(kernel, move |kernel| {
            prod_log.lock().push("producer");
            prod_sem.v(kernel);
        });
    });

    // The waiter forked first but had to wait for the producer's signal.
    assert_eq!(*order.lock(), vec!["producer", "waiter"]);
}

#[test]
fn test_lock_keeps_critical_sections_exclusive() {
    let kernel = Kernel::new(config_with(SchedPolicy::Fcfs));
    let counter = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicBool::new(false));
    let total = counter.clone();

    const ROUNDS: u64 = 5;

    kernel.run(move |kernel| {
        let lock = Arc::new(Lock::new("counter lock"));
        for name in ["left", "right"] {
            let thread = KThread::new(name);
            let lock = lock.clone();
            let counter = counter.clone();
            let inside = inside.clone();
            thread.fork(kernel, move |kernel| {
                for _ in 0..ROUNDS {
                    lock.acquire(kernel);
                    assert!(!inside.swap(true, Ordering::SeqCst), "two threads in section");
                    let seen = counter.load(Ordering::SeqCst);
                    // Invite interleaving mid-section.
                    kernel.current_thread().yield_now(kernel);
                    counter.store(seen + 1, Ordering::SeqCst);
                    inside.store(false, Ordering::SeqCst);
                    lock.release(kernel);
                }
            });
        }
    });

    assert_eq!(total.load(Ordering::SeqCst), 2 * ROUNDS);
}

#[test]
#[should_panic(expected = "does not hold")]
fn test_lock_release_requires_holder() {
    let kernel = Kernel::new(config_with(SchedPolicy::Fcfs));
    let lock = Lock::new("orphan");
    lock.release(&kernel);
}
