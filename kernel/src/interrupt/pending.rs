/*
 * Pending Interrupt Queue
 *
 * A scheduled interrupt is a record of a future handler invocation:
 * which handler, at what virtual timestamp, from which device class.
 * Records sit in a min-heap keyed by (timestamp, insertion sequence),
 * which gives dispatch in strictly increasing time with FIFO ordering
 * among equal timestamps.
 *
 * Cancellation is a flag, never a heap mutation: a cancelled record
 * stays queued and is silently skipped when it reaches the head. The
 * handle returned to the caller shares that flag and can do nothing
 * else.
 */

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Tick;
use crate::kernel::Kernel;

/// An interrupt handler: a function object holding whatever device state
/// it needs. Handlers run with interrupts masked and must not enable
/// them, block, or call into the scheduler's dispatch path directly.
pub type InterruptHandler = Arc<dyn Fn(&Arc<Kernel>) + Send + Sync>;

/// Device class of a pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Timer,
    Disk,
    ConsoleWrite,
    ConsoleRead,
    NetworkSend,
    NetworkRecv,
}

impl InterruptKind {
    /// Short name for logging.
    pub fn name(self) -> &'static str {
        match self {
            InterruptKind::Timer => "timer",
            InterruptKind::Disk => "disk",
            InterruptKind::ConsoleWrite => "console write",
            InterruptKind::ConsoleRead => "console read",
            InterruptKind::NetworkSend => "network send",
            InterruptKind::NetworkRecv => "network recv",
        }
    }
}

/// A scheduled future interrupt. Immutable once queued, apart from the
/// shared cancellation flag.
pub struct PendingInterrupt {
    pub handler: InterruptHandler,
    pub when: Tick,
    pub kind: InterruptKind,
    cancelled: Arc<AtomicBool>,
    seq: u64,
}

impl PendingInterrupt {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancellation capability for one scheduled interrupt.
///
/// Dropping the handle does nothing; the interrupt fires unless
/// `cancel` is called before its timestamp is reached.
pub struct InterruptHandle {
    cancelled: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Heap slot wrapper ordering the earliest (when, seq) first.
struct QueueSlot(PendingInterrupt);

impl PartialEq for QueueSlot {
    fn eq(&self, other: &Self) -> bool {
        self.0.when == other.0.when && self.0.seq == other.0.seq
    }
}

impl Eq for QueueSlot {}

impl PartialOrd for QueueSlot {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueSlot {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; compare reversed so the smallest
        // (when, seq) pair surfaces at the head.
        other
            .0
            .when
            .cmp(&self.0.when)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Priority queue of pending interrupts.
pub(crate) struct PendingQueue {
    heap: BinaryHeap<QueueSlot>,
    next_seq: u64,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Queue a handler to run at virtual time `when`.
    pub(crate) fn insert(
        &mut self,
        handler: InterruptHandler,
        when: Tick,
        kind: InterruptKind,
    ) -> InterruptHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueSlot(PendingInterrupt {
            handler,
            when,
            kind,
            cancelled: cancelled.clone(),
            seq,
        }));
        InterruptHandle { cancelled }
    }

    /// Put back a popped record, keeping its original tie-break position.
    pub(crate) fn reinsert(&mut self, entry: PendingInterrupt) {
        self.heap.push(QueueSlot(entry));
    }

    /// Remove and return the earliest pending record.
    pub(crate) fn pop(&mut self) -> Option<PendingInterrupt> {
        self.heap.pop().map(|slot| slot.0)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> InterruptHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn test_pops_in_timestamp_order() {
        let mut q = PendingQueue::new();
        q.insert(noop(), 300, InterruptKind::Disk);
        q.insert(noop(), 100, InterruptKind::Timer);
        q.insert(noop(), 200, InterruptKind::ConsoleRead);

        assert_eq!(q.pop().unwrap().when, 100);
        assert_eq!(q.pop().unwrap().when, 200);
        assert_eq!(q.pop().unwrap().when, 300);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_equal_timestamps_pop_fifo() {
        let mut q = PendingQueue::new();
        q.insert(noop(), 50, InterruptKind::Timer);
        q.insert(noop(), 50, InterruptKind::Disk);
        q.insert(noop(), 50, InterruptKind::ConsoleWrite);

        assert_eq!(q.pop().unwrap().kind, InterruptKind::Timer);
        assert_eq!(q.pop().unwrap().kind, InterruptKind::Disk);
        assert_eq!(q.pop().unwrap().kind, InterruptKind::ConsoleWrite);
    }

    #[test]
    fn test_reinsert_keeps_tie_position() {
        let mut q = PendingQueue::new();
        q.insert(noop(), 50, InterruptKind::Timer);
        q.insert(noop(), 50, InterruptKind::Disk);

        let first = q.pop().unwrap();
        assert_eq!(first.kind, InterruptKind::Timer);
        q.reinsert(first);
        // Original insertion order must survive the round trip.
        assert_eq!(q.pop().unwrap().kind, InterruptKind::Timer);
        assert_eq!(q.pop().unwrap().kind, InterruptKind::Disk);
    }

    #[test]
    fn test_cancel_marks_record() {
        let mut q = PendingQueue::new();
        let handle = q.insert(noop(), 10, InterruptKind::Timer);
        handle.cancel();
        assert!(q.pop().unwrap().is_cancelled());
    }
}
