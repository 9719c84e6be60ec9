//! Node-voltage snapshots.
//!
//! The image is a fixed header, the node count as a little-endian `u32`,
//! then one voltage code byte per node in hierarchy order. Restoring
//! validates the whole image before touching the network.

use std::io::{Read, Write};

use tracing::info;

use crate::engine::Simulation;
use crate::error::{Result, SimError};
use crate::strength::{Logic, Voltage};

/// Leading bytes of every image.
pub const STATE_HEADER: &[u8; 16] = b"SWITCHSIM-STATE\0";

const PREFIX: usize = STATE_HEADER.len() + 4;

impl Simulation {
    /// Serializes every node's voltage.
    pub fn save_state(&self) -> Vec<u8> {
        let nodes = self.net.walk_nodes();
        let mut out = Vec::with_capacity(PREFIX + nodes.len());
        out.extend_from_slice(STATE_HEADER);
        out.extend_from_slice(&(nodes.len() as u32).to_le_bytes());
        out.extend(nodes.iter().map(|&n| self.net.nodes[n].voltage.code()));
        out
    }

    pub fn write_state<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.save_state())?;
        Ok(())
    }

    /// Loads node voltages from an image made by [`Simulation::save_state`]
    /// on the same network.
    ///
    /// Each node takes the stored voltage and the matching charge; every
    /// node is then recomputed and every device reruns its startup routine
    /// on the next evaluation. Pending work is discarded.
    pub fn restore_state(&mut self, image: &[u8]) -> Result<()> {
        let nodes = self.net.walk_nodes();
        let voltages = parse_image(image, nodes.len())?;

        self.abort_step();
        for (&id, voltage) in nodes.iter().zip(voltages) {
            let (high, low) = match voltage.logic() {
                Logic::One => (true, false),
                Logic::Zero => (false, true),
                Logic::X => (true, true),
            };
            let node = &mut self.net.nodes[id];
            node.voltage = voltage;
            node.charge_high = high;
            node.charge_low = low;
            self.net.recount(id);
            self.strength_changed(id, false);
        }
        if self.status.started {
            self.pending_startup = true;
        }
        info!(nodes = nodes.len(), "state restored");
        Ok(())
    }

    pub fn read_state<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image)?;
        self.restore_state(&image)
    }
}

fn parse_image(image: &[u8], expected: usize) -> Result<Vec<Voltage>> {
    if image.len() < PREFIX || &image[..STATE_HEADER.len()] != STATE_HEADER {
        return Err(SimError::BadStateHeader);
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&image[STATE_HEADER.len()..PREFIX]);
    let found = u32::from_le_bytes(count) as usize;
    if found != expected {
        return Err(SimError::StateNodeCount { expected, found });
    }
    let body = &image[PREFIX..];
    if body.len() < expected {
        return Err(SimError::StateTruncated {
            expected,
            found: body.len(),
        });
    }
    body[..expected]
        .iter()
        .enumerate()
        .map(|(index, &code)| match Voltage::from_code(code) {
            Some(v) if v != Voltage::Illegal => Ok(v),
            _ => Err(SimError::BadVoltageCode { index, code }),
        })
        .collect()
}
