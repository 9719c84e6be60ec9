//! Error taxonomy of the simulator.
//!
//! Only fatal and caller-signaled conditions become errors. Recoverable
//! conditions (oscillation, odd RAM accesses, failed merges) are logged,
//! counted in the statistics and simulated through with a fallback.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("node {node} is driven by both rails at full strength")]
    IllegalVoltage { node: String },

    #[error("state image has a bad header")]
    BadStateHeader,

    #[error("state image holds {found} nodes, network has {expected}")]
    StateNodeCount { expected: usize, found: usize },

    #[error("state image truncated: expected {expected} bytes, got {found}")]
    StateTruncated { expected: usize, found: usize },

    #[error("state image has invalid voltage code {code} at node {index}")]
    BadVoltageCode { index: usize, code: u8 },

    #[error("RAM word width {0} exceeds 32 bits")]
    RamWordWidth(usize),

    #[error("RAM needs at least one address line")]
    RamNoAddress,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("name {0} already exists in this scope")]
    DuplicateName(String),

    #[error("terminal {term} out of range for instance with {count} terminals")]
    TerminalOutOfRange { term: usize, count: usize },

    #[error("stale or invalid handle")]
    StaleHandle,

    #[error("bad attribute {name}: {reason}")]
    BadAttribute { name: String, reason: String },

    #[error("unknown device type: {0}")]
    UnknownDevice(String),

    #[error("operation not allowed after the simulation has started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    /// Fatal conditions abort the current operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::IllegalVoltage { .. }
                | SimError::BadStateHeader
                | SimError::StateNodeCount { .. }
                | SimError::StateTruncated { .. }
                | SimError::BadVoltageCode { .. }
                | SimError::RamWordWidth(_)
                | SimError::RamNoAddress
        )
    }

    pub(crate) fn bad_attr(name: &str, reason: impl Into<String>) -> Self {
        SimError::BadAttribute {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
