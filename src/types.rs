//! Core type definitions for the simulator.
//!
//! Handles into the network arenas, the strength byte and the terminal
//! reference used by the mutation API.

use serde::{Deserialize, Serialize};

use crate::arena::Id;
use crate::error::{Result, SimError};
use crate::network::{Element, Instance, Node};

/// Drive strength: 0 is a supply rail, 255 is undriven. Lower wins.
pub type Strength = u8;

/// Handle to a flattened electrical net.
pub type NodeId = Id<Node>;

/// Handle to a named net within one hierarchical scope.
pub type ElementId = Id<Element>;

/// Handle to a device or module occurrence.
pub type InstanceId = Id<Instance>;

/// Macro-step counter.
pub type StepCount = u64;

/// Identifier of a probe attached to an element.
pub type ProbeId = u32;

/// Most terminals one instance may carry; terminal indices and connection
/// array lengths are 16 bits.
pub const MAX_TERMINALS: usize = u16::MAX as usize;

/// One terminal of one instance.
///
/// This is how external drivers and device routines name the connection
/// whose strength they want to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnRef {
    pub inst: InstanceId,
    pub term: u16,
}

impl ConnRef {
    /// Reference to terminal `term`, which must be below [`MAX_TERMINALS`].
    pub(crate) fn new(inst: InstanceId, term: usize) -> Self {
        debug_assert!(term < MAX_TERMINALS);
        Self {
            inst,
            term: term as u16,
        }
    }

    /// Reference to terminal `term`, rejecting indices no instance can have.
    pub fn try_new(inst: InstanceId, term: usize) -> Result<Self> {
        match u16::try_from(term) {
            Ok(index) if term < MAX_TERMINALS => Ok(Self { inst, term: index }),
            _ => Err(SimError::TerminalOutOfRange {
                term,
                count: MAX_TERMINALS,
            }),
        }
    }
}

/// Which rail a supply node is tied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rail {
    Supply,
    Ground,
}
