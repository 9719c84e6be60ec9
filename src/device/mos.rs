//! MOS transistor networks.
//!
//! A transistor instance is a bidirectional switch between its source and
//! drain, controlled by a network shape over one or more gates. The device
//! itself only decides whether the network conducts; moving strength across
//! the switch is the job of the stage solver, which the device triggers by
//! scheduling itself on the drive queue whenever its conduction changes.

use serde::{Deserialize, Serialize};

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::network::TermKind;
use crate::shape::{shape, ShapeId, SHAPE_ON, SHAPE_SINGLE};
use crate::strength::Logic;

/// Source, drain, then gates.
pub const FIRST_GATE: usize = 2;

const MOS_TERMINALS: &[TermRole] = &[
    TermRole::new("source", TermKind::DriveLevel),
    TermRole::new("drain", TermKind::DriveLevel),
    TermRole::new("gate", TermKind::VoltageInput),
];

pub const NMOS: DeviceDescriptor = DeviceDescriptor {
    name: "nmos",
    terminals: MOS_TERMINALS,
    expandable: Some(FIRST_GATE),
    params: [0, 0, 0],
};

pub const PMOS: DeviceDescriptor = DeviceDescriptor {
    name: "pmos",
    terminals: MOS_TERMINALS,
    expandable: Some(FIRST_GATE),
    params: [1, 0, 0],
};

pub const NMOS_WEAK: DeviceDescriptor = DeviceDescriptor {
    name: "nmos_weak",
    terminals: MOS_TERMINALS,
    expandable: Some(FIRST_GATE),
    params: [0, 1, 0],
};

pub const PMOS_WEAK: DeviceDescriptor = DeviceDescriptor {
    name: "pmos_weak",
    terminals: MOS_TERMINALS,
    expandable: Some(FIRST_GATE),
    params: [1, 1, 0],
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// Conducts when its gate is high.
    N,
    /// Conducts when its gate is low.
    P,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conduction {
    #[default]
    Off,
    On,
    /// Unknown gates leave both possible.
    Unknown,
}

impl Conduction {
    /// Whether the switch may pass strength.
    pub fn may_conduct(self) -> bool {
        self != Conduction::Off
    }
}

#[derive(Clone, Debug)]
pub struct Mos {
    polarity: Polarity,
    weak: bool,
    shape: ShapeId,
    conduction: Conduction,
}

impl Mos {
    /// A single-gate transistor.
    pub fn new(polarity: Polarity, weak: bool) -> Self {
        Self::with_shape(polarity, weak, SHAPE_SINGLE)
    }

    /// A gateless, permanently conducting transistor (depletion load).
    pub fn always_on(polarity: Polarity, weak: bool) -> Self {
        Self::with_shape(polarity, weak, SHAPE_ON)
    }

    pub fn with_shape(polarity: Polarity, weak: bool, shape: ShapeId) -> Self {
        Self {
            polarity,
            weak,
            shape,
            conduction: Conduction::Off,
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    pub fn gate_count(&self) -> usize {
        shape(self.shape).inputs as usize
    }

    pub fn conduction(&self) -> Conduction {
        self.conduction
    }

    /// Conduction of the network for the given gate values.
    ///
    /// Gates at X contribute both possibilities; the result is `Unknown`
    /// unless every resolution agrees.
    pub fn conduction_for(&self, gates: &[Logic]) -> Conduction {
        let network = shape(self.shape);
        let active_high = self.polarity == Polarity::N;
        let mut active = 0u32;
        let mut unknown = 0u32;
        for (i, gate) in gates.iter().take(network.inputs as usize).enumerate() {
            match gate.active(active_high) {
                Logic::One => active |= 1 << i,
                Logic::X => unknown |= 1 << i,
                Logic::Zero => {}
            }
        }

        let (mut on, mut off) = (false, false);
        let mut subset = unknown;
        loop {
            if network.conducts(active | subset) {
                on = true;
            } else {
                off = true;
            }
            if subset == 0 || (on && off) {
                break;
            }
            subset = (subset - 1) & unknown;
        }
        match (on, off) {
            (true, false) => Conduction::On,
            (false, _) => Conduction::Off,
            (true, true) => Conduction::Unknown,
        }
    }

    fn read_gates(&self, io: &DeviceIo<'_>) -> Vec<Logic> {
        (0..self.gate_count())
            .map(|i| io.logic(FIRST_GATE + i))
            .collect()
    }
}

impl Behavior for Mos {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        match (self.polarity, self.weak) {
            (Polarity::N, false) => &NMOS,
            (Polarity::P, false) => &PMOS,
            (Polarity::N, true) => &NMOS_WEAK,
            (Polarity::P, true) => &PMOS_WEAK,
        }
    }

    fn terminal_count(&self) -> usize {
        FIRST_GATE + self.gate_count()
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        let conduction = self.conduction_for(&self.read_gates(io));
        if conduction != self.conduction {
            self.conduction = conduction;
            io.schedule_drive();
        }
    }

    fn startup(&mut self, io: &mut DeviceIo<'_>) {
        self.conduction = self.conduction_for(&self.read_gates(io));
        io.schedule_drive();
    }

    fn restart(&mut self) {
        self.conduction = Conduction::Off;
    }

    fn describe(&self) -> String {
        format!(
            "{} shape {} ({} gates) {:?}",
            self.descriptor().name,
            self.shape,
            self.gate_count(),
            self.conduction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{SHAPE_PARALLEL2, SHAPE_SERIES2};

    #[test]
    fn test_single_gate_polarity() {
        let n = Mos::new(Polarity::N, false);
        assert_eq!(n.conduction_for(&[Logic::One]), Conduction::On);
        assert_eq!(n.conduction_for(&[Logic::Zero]), Conduction::Off);
        assert_eq!(n.conduction_for(&[Logic::X]), Conduction::Unknown);

        let p = Mos::new(Polarity::P, false);
        assert_eq!(p.conduction_for(&[Logic::Zero]), Conduction::On);
        assert_eq!(p.conduction_for(&[Logic::One]), Conduction::Off);
    }

    #[test]
    fn test_unknown_resolved_by_dominant_gate() {
        let series = Mos::with_shape(Polarity::N, false, SHAPE_SERIES2);
        assert_eq!(series.conduction_for(&[Logic::X, Logic::Zero]), Conduction::Off);
        assert_eq!(series.conduction_for(&[Logic::X, Logic::One]), Conduction::Unknown);

        let parallel = Mos::with_shape(Polarity::N, false, SHAPE_PARALLEL2);
        assert_eq!(parallel.conduction_for(&[Logic::X, Logic::One]), Conduction::On);
        assert_eq!(parallel.conduction_for(&[Logic::X, Logic::Zero]), Conduction::Unknown);
    }

    #[test]
    fn test_always_on() {
        let load = Mos::always_on(Polarity::N, true);
        assert_eq!(load.gate_count(), 0);
        assert_eq!(load.terminal_count(), 2);
        assert_eq!(load.conduction_for(&[]), Conduction::On);
        assert_eq!(load.descriptor().name, "nmos_weak");
    }

    #[test]
    fn test_descriptor_params() {
        assert_eq!(PMOS.params[0], 1);
        assert_eq!(NMOS_WEAK.params[1], 1);
        assert!(Mos::new(Polarity::P, false).describe().starts_with("pmos shape 2"));
    }
}
