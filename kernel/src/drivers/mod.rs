/*
 * Device Models
 *
 * Asynchronous hardware simulated against the virtual clock. Each
 * device owns its own state, schedules its future interrupts with the
 * controller, and reports completions through a subscriber handler the
 * creator supplies. Requests are synchronous with respect to data
 * movement; only the passage of time is deferred.
 */

pub mod console;
pub mod disk;
pub mod timer;

pub use console::{ConsoleDevice, ConsoleError};
pub use disk::DiskDevice;
pub use timer::TimerDevice;
