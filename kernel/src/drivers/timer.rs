/*
 * Timer Device
 *
 * Self-rescheduling interrupt source feeding the scheduler. In fixed
 * mode the period is exactly `timer_ticks`; in random mode each delay
 * is drawn from [1, 2 * timer_ticks] by the machine's seeded generator.
 *
 * The device reschedules itself at the head of each interrupt, before
 * the subscriber runs: if the subscriber's yield request leads to a
 * context switch, the next timer interrupt is already queued.
 */

use std::sync::Arc;

use spin::Mutex;

use crate::config::Tick;
use crate::interrupt::pending::{InterruptHandle, InterruptHandler, InterruptKind};
use crate::kernel::Kernel;
use crate::random::Xorshift64;

struct TimerShared {
    subscriber: InterruptHandler,
    random: bool,
    period: Tick,
    rng: Mutex<Xorshift64>,
    handle: Mutex<Option<InterruptHandle>>,
}

pub struct TimerDevice {
    shared: Arc<TimerShared>,
}

impl TimerDevice {
    /// Create the timer and queue its first interrupt. `subscriber`
    /// runs on every timer interrupt, with interrupts masked.
    pub fn new(kernel: &Arc<Kernel>, subscriber: InterruptHandler, random: bool) -> TimerDevice {
        let shared = Arc::new(TimerShared {
            subscriber,
            random,
            period: kernel.config.timer_ticks,
            rng: Mutex::new(Xorshift64::with_seed(kernel.config.random_seed)),
            handle: Mutex::new(None),
        });
        schedule_next(&shared, kernel);
        TimerDevice { shared }
    }

    /// Stop the interrupt stream by cancelling the pending interrupt.
    pub fn cancel(&self) {
        if let Some(handle) = self.shared.handle.lock().as_ref() {
            handle.cancel();
        }
    }
}

fn schedule_next(shared: &Arc<TimerShared>, kernel: &Arc<Kernel>) {
    let delay = if shared.random {
        1 + shared.rng.lock().next() % (2 * shared.period)
    } else {
        shared.period
    };
    let rearm = shared.clone();
    let handle = kernel.interrupt.schedule(
        kernel,
        Arc::new(move |kernel: &Arc<Kernel>| on_interrupt(&rearm, kernel)),
        delay,
        InterruptKind::Timer,
    );
    *shared.handle.lock() = Some(handle);
}

fn on_interrupt(shared: &Arc<TimerShared>, kernel: &Arc<Kernel>) {
    // Reschedule first so a context switch in the subscriber cannot
    // stall the stream.
    schedule_next(shared, kernel);
    (shared.subscriber)(kernel);
}
