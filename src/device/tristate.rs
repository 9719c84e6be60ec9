//! Tristate buffers and pass gates.
//!
//! Terminals are `[control, data, out0, out1?]`. An inactive control
//! withdraws the outputs instead of driving a third state. The pass-gate
//! variant forwards the data node's strength (attenuated like a switch)
//! rather than driving at a fixed strength, so its data terminal is
//! strength sensitive.

use std::collections::HashSet;

use super::{Behavior, Device, DeviceDescriptor, DeviceIo, TermRole};
use crate::network::{Connection, Network, TermKind};
use crate::strength::{through_switch, Level, Logic, NONE};
use crate::types::{ConnRef, InstanceId, NodeId, Strength};

pub const TRISTATE: DeviceDescriptor = DeviceDescriptor {
    name: "tristate",
    terminals: &[
        TermRole::new("control", TermKind::VoltageInput),
        TermRole::new("data", TermKind::VoltageInput),
        TermRole::new("out", TermKind::Output),
    ],
    expandable: Some(2),
    params: [0; 3],
};

pub const PASSGATE: DeviceDescriptor = DeviceDescriptor {
    name: "passgate",
    terminals: &[
        TermRole::new("control", TermKind::VoltageInput),
        TermRole::new("data", TermKind::DriveInput),
        TermRole::new("out", TermKind::Output),
    ],
    expandable: Some(2),
    params: [1, 0, 0],
};

const FIRST_OUT: usize = 2;

#[derive(Clone, Debug)]
pub struct Tristate {
    control_active_high: bool,
    pass: bool,
    /// Inversion per output; the length is the output count.
    invert: Vec<bool>,
    strength: Strength,
}

impl Tristate {
    /// Buffer driving its outputs at `strength`.
    pub fn buffer(control_active_high: bool, invert: &[bool], strength: Strength) -> Self {
        Self {
            control_active_high,
            pass: false,
            invert: Self::outputs(invert),
            strength,
        }
    }

    /// Pass gate forwarding the data node's strength.
    pub fn pass_gate(control_active_high: bool, invert: &[bool]) -> Self {
        Self {
            control_active_high,
            pass: true,
            invert: Self::outputs(invert),
            strength: 0,
        }
    }

    fn outputs(invert: &[bool]) -> Vec<bool> {
        match invert {
            [] => vec![false],
            [a] => vec![*a],
            [a, b, ..] => vec![*a, *b],
        }
    }

    pub fn output_count(&self) -> usize {
        self.invert.len()
    }

    pub fn is_pass(&self) -> bool {
        self.pass
    }
}

impl Behavior for Tristate {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        if self.pass {
            &PASSGATE
        } else {
            &TRISTATE
        }
    }

    fn terminal_count(&self) -> usize {
        FIRST_OUT + self.invert.len()
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        let control = io.logic(0).active(self.control_active_high);
        let (data_high, data_low) = if self.pass {
            io.network()
                .terminal_node(io.instance(), 1)
                .map_or((NONE, NONE), |data| {
                    source_strengths(io.network(), io.instance(), data)
                })
        } else {
            (NONE, NONE)
        };
        let data = io.logic(1);
        for (i, &invert) in self.invert.iter().enumerate() {
            let term = FIRST_OUT + i;
            match (control, self.pass) {
                (Logic::Zero, _) => io.undrive(term),
                (Logic::X, false) => io.drive(term, Level::Unknown, self.strength),
                (Logic::X, true) => {
                    let s = through_switch(data_high.min(data_low), false);
                    io.drive(term, Level::Unknown, s);
                }
                (Logic::One, false) => {
                    let level = data.to_level();
                    let level = if invert { level.invert() } else { level };
                    io.drive(term, level, self.strength);
                }
                (Logic::One, true) => {
                    let high = through_switch(data_high, false);
                    let low = through_switch(data_low, false);
                    if invert {
                        io.drive_raw(term, low, high);
                    } else {
                        io.drive_raw(term, high, low);
                    }
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} control {} outputs {:?}",
            self.descriptor().name,
            if self.control_active_high { "high" } else { "low" },
            self.invert
        )
    }
}

/// A pass gate's output as seen from the node it drives.
struct Feed {
    data: Option<NodeId>,
    control: Logic,
    invert: bool,
}

/// The feed behind `conn` if it is a pass-gate output.
fn pass_feed(net: &Network, cref: ConnRef, conn: &Connection) -> Option<Feed> {
    if conn.kind() != TermKind::Output {
        return None;
    }
    let Device::Tristate(gate) = &net.instance(cref.inst).ok()?.device else {
        return None;
    };
    if !gate.pass {
        return None;
    }
    let control = net
        .terminal_node(cref.inst, 0)
        .and_then(|n| net.node(n).ok())
        .map_or(Logic::X, |n| n.voltage().logic())
        .active(gate.control_active_high);
    let invert = gate
        .invert
        .get(usize::from(cref.term).checked_sub(FIRST_OUT)?)
        .copied()?;
    Some(Feed {
        data: net.terminal_node(cref.inst, 1),
        control,
        invert,
    })
}

/// Strongest high and low reaching `start` from its sources.
///
/// Pass-gate outputs are not sources. An enabled pass gate is followed back
/// to its own data node instead, so strength cannot circulate around a loop
/// of pass gates. The outputs of `own`, the gate asking, are skipped.
fn source_strengths(net: &Network, own: InstanceId, start: NodeId) -> (Strength, Strength) {
    let mut best = [NONE; 2];
    for (target, slot) in best.iter_mut().enumerate() {
        let mut seen = HashSet::new();
        let mut stack = vec![(start, target)];
        while let Some((node, side)) = stack.pop() {
            if !seen.insert((node, side)) {
                continue;
            }
            let Ok(n) = net.node(node) else {
                continue;
            };
            let pick = |(high, low): (Strength, Strength)| if side == 0 { high } else { low };
            let mut strength = pick(n.pseudo_drivers());
            for (cref, conn) in net.node_conns(node) {
                if cref.inst == own {
                    continue;
                }
                match pass_feed(net, cref, conn) {
                    None => strength = strength.min(pick(conn.strengths())),
                    Some(Feed { data: None, .. }) => {}
                    Some(Feed {
                        data: Some(data),
                        control,
                        invert,
                    }) => match control {
                        Logic::One => stack.push((data, side ^ usize::from(invert))),
                        Logic::X => stack.extend([(data, 0), (data, 1)]),
                        Logic::Zero => {}
                    },
                }
            }
            *slot = (*slot).min(strength);
        }
    }
    (best[0], best[1])
}
