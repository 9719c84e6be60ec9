//! Event queues driving evaluation to a fixed point.
//!
//! Each schedulable item (instance or node) carries a byte of schedule bits,
//! one per queue. Pushing an item whose bit is already set is a no-op, so an
//! item sits in a queue at most once. Cancelling clears the bit and leaves
//! the entry behind; it is skipped when popped.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{InstanceId, NodeId};

/// Schedule bit of the drive queue (transistor stages).
pub const SCHED_DRIVE: u8 = 1;
/// Schedule bit of the node recompute queue.
pub const SCHED_NODE: u8 = 2;
/// Schedule bit of the evaluation queue.
pub const SCHED_EVAL: u8 = 4;
/// Schedule bit of the touched-node queue.
pub const SCHED_CYCLE: u8 = 8;

/// FIFO of items guarded by one schedule bit.
#[derive(Debug)]
pub struct EventQueue<T> {
    items: VecDeque<T>,
    bit: u8,
    count: usize,
    peak: usize,
    processed: u64,
}

impl<T: Copy> EventQueue<T> {
    pub fn new(bit: u8) -> Self {
        Self {
            items: VecDeque::new(),
            bit,
            count: 0,
            peak: 0,
            processed: 0,
        }
    }

    /// Queues `item` unless `bits` says it is already queued.
    pub fn push(&mut self, item: T, bits: &mut u8) -> bool {
        if *bits & self.bit != 0 {
            return false;
        }
        *bits |= self.bit;
        self.items.push_back(item);
        self.count += 1;
        self.peak = self.peak.max(self.count);
        true
    }

    /// Takes the next entry, which may be stale. Pair with [`Self::settle`].
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Claims a popped entry: clears its bit and reports whether it was
    /// still live.
    pub fn settle(&mut self, bits: &mut u8) -> bool {
        if *bits & self.bit == 0 {
            return false;
        }
        *bits &= !self.bit;
        self.count -= 1;
        self.processed += 1;
        true
    }

    /// Withdraws an item without removing its entry.
    pub fn cancel(&mut self, bits: &mut u8) -> bool {
        if *bits & self.bit == 0 {
            return false;
        }
        *bits &= !self.bit;
        self.count -= 1;
        true
    }

    /// Whether no live items remain. Stale entries may still be buffered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Live items.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Buffered entries, stale ones included.
    pub fn buffered(&self) -> usize {
        self.items.len()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn bit(&self) -> u8 {
        self.bit
    }

    /// Drops buffered entries once nothing live is left among them.
    pub fn compact(&mut self) {
        if self.count == 0 {
            self.items.clear();
        }
    }

    /// Removes every entry; the caller clears the bits of the returned items.
    pub fn drain(&mut self) -> Vec<T> {
        self.count = 0;
        self.items.drain(..).collect()
    }
}

/// The four queues of one simulation.
#[derive(Debug)]
pub struct Scheduler {
    /// Instances whose transistor stage must be re-solved.
    pub drive: EventQueue<InstanceId>,
    /// Nodes whose strengths changed.
    pub node: EventQueue<NodeId>,
    /// Instances awaiting a simulate call.
    pub eval: EventQueue<InstanceId>,
    /// Nodes whose voltage changed during the current step.
    pub cycle: EventQueue<NodeId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            drive: EventQueue::new(SCHED_DRIVE),
            node: EventQueue::new(SCHED_NODE),
            eval: EventQueue::new(SCHED_EVAL),
            cycle: EventQueue::new(SCHED_CYCLE),
        }
    }

    /// Drive resolution work is pending.
    pub fn drive_pending(&self) -> bool {
        !self.drive.is_empty() || !self.node.is_empty()
    }

    /// Any simulation work is pending.
    pub fn pending(&self) -> bool {
        self.drive_pending() || !self.eval.is_empty()
    }

    pub fn peaks(&self) -> QueuePeaks {
        QueuePeaks {
            drive: self.drive.peak(),
            node: self.node.peak(),
            eval: self.eval.peak(),
            cycle: self.cycle.peak(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Peak live depth of each queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePeaks {
    pub drive: usize,
    pub node: usize,
    pub eval: usize,
    pub cycle: usize,
}

/// Why a step stopped before reaching quiescence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// The interrupt flag was raised.
    UserInterrupt,
    /// A watched node changed logic value.
    Breakpoint,
    /// A node kept oscillating past the abort threshold.
    Cycle,
}

/// Result of one call to `evaluate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Every queue drained.
    Settled,
    /// Work remains; resume with `evaluate(false)`.
    Interrupted(StopReason),
}

impl StepOutcome {
    pub fn is_settled(self) -> bool {
        self == StepOutcome::Settled
    }
}

/// Persistent status flags of a simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Devices have run their startup routines.
    pub started: bool,
    /// The last step stopped early.
    pub interrupted: bool,
    /// An oscillation passed the abort threshold since the last fresh step.
    pub cycle_detected: bool,
}
