/*
 * Console Device
 *
 * Two independent interrupt streams over a byte source and a byte sink.
 * Input is polled: every `console_time` ticks the device looks at the
 * source and, if its one-character buffer is free and a byte is
 * available, latches it and tells the read subscriber. Output is
 * completion-driven: `put_char` emits the byte at once but the device
 * stays busy until the write interrupt `console_time` ticks later.
 *
 * Protocol misuse (writing while busy, reading an empty buffer) is the
 * caller's to handle and mutates nothing. A source that reports EOF or
 * errors simply never has a byte available; errors are logged.
 */

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use spin::Mutex;

use crate::config::Tick;
use crate::interrupt::pending::{InterruptHandler, InterruptKind};
use crate::kernel::Kernel;

/// Recoverable console protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    /// `put_char` while the previous character is still in flight.
    WriteBusy,
    /// `get_char` with no character latched.
    ReadEmpty,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::WriteBusy => write!(f, "console output busy"),
            ConsoleError::ReadEmpty => write!(f, "no console input available"),
        }
    }
}

impl std::error::Error for ConsoleError {}

struct ConsoleState {
    source: Box<dyn Read + Send>,
    sink: Box<dyn Write + Send>,
    put_busy: bool,
    char_avail: bool,
    incoming: u8,
}

struct ConsoleShared {
    read_subscriber: InterruptHandler,
    write_subscriber: InterruptHandler,
    period: Tick,
    state: Mutex<ConsoleState>,
}

pub struct ConsoleDevice {
    shared: Arc<ConsoleShared>,
}

impl ConsoleDevice {
    /// Create the console over `source`/`sink` and queue the first
    /// input poll. `read_subscriber` runs whenever a character is
    /// latched, `write_subscriber` whenever an output completes; both
    /// with interrupts masked.
    pub fn new(
        kernel: &Arc<Kernel>,
        source: Box<dyn Read + Send>,
        sink: Box<dyn Write + Send>,
        read_subscriber: InterruptHandler,
        write_subscriber: InterruptHandler,
    ) -> ConsoleDevice {
        let shared = Arc::new(ConsoleShared {
            read_subscriber,
            write_subscriber,
            period: kernel.config.console_time,
            state: Mutex::new(ConsoleState {
                source,
                sink,
                put_busy: false,
                char_avail: false,
                incoming: 0,
            }),
        });
        schedule_poll(&shared, kernel);
        ConsoleDevice { shared }
    }

    /// Emit `c` to the sink and start the completion clock.
    ///
    /// Fails without side effects while a previous character is still
    /// in flight.
    pub fn put_char(&self, kernel: &Arc<Kernel>, c: u8) -> Result<(), ConsoleError> {
        {
            let mut state = self.shared.state.lock();
            if state.put_busy {
                return Err(ConsoleError::WriteBusy);
            }
            state.sink.write_all(&[c]).expect("console sink write failed");
            state.sink.flush().expect("console sink flush failed");
            state.put_busy = true;
        }

        let shared = self.shared.clone();
        kernel.interrupt.schedule(
            kernel,
            Arc::new(move |kernel: &Arc<Kernel>| {
                shared.state.lock().put_busy = false;
                kernel.stats.count_console_write();
                (shared.write_subscriber)(kernel);
            }),
            self.shared.period,
            InterruptKind::ConsoleWrite,
        );
        Ok(())
    }

    /// Take the latched input character, freeing the buffer for the
    /// next poll. Fails without side effects if nothing is latched.
    pub fn get_char(&self) -> Result<u8, ConsoleError> {
        let mut state = self.shared.state.lock();
        if !state.char_avail {
            return Err(ConsoleError::ReadEmpty);
        }
        state.char_avail = false;
        Ok(state.incoming)
    }

    /// Whether an output character is still in flight.
    pub fn put_busy(&self) -> bool {
        self.shared.state.lock().put_busy
    }
}

fn schedule_poll(shared: &Arc<ConsoleShared>, kernel: &Arc<Kernel>) {
    let rearm = shared.clone();
    kernel.interrupt.schedule(
        kernel,
        Arc::new(move |kernel: &Arc<Kernel>| on_poll(&rearm, kernel)),
        shared.period,
        InterruptKind::ConsoleRead,
    );
}

fn on_poll(shared: &Arc<ConsoleShared>, kernel: &Arc<Kernel>) {
    schedule_poll(shared, kernel);

    let latched = {
        let mut state = shared.state.lock();
        if state.char_avail {
            return;
        }
        let mut byte = [0u8; 1];
        match state.source.read(&mut byte) {
            // EOF: no byte available, now or ever.
            Ok(0) => return,
            Ok(_) => {
                state.incoming = byte[0];
                state.char_avail = true;
                true
            }
            Err(err) => {
                log::warn!("console input poll failed: {}", err);
                return;
            }
        }
    };

    if latched {
        kernel.stats.count_console_read();
        (shared.read_subscriber)(kernel);
    }
}
