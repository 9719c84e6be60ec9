//! Testbench stimulus.

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::network::TermKind;
use crate::strength::Level;
use crate::types::Strength;

pub const INPUT: DeviceDescriptor = DeviceDescriptor {
    name: "input",
    terminals: &[TermRole::new("out", TermKind::Output)],
    expandable: None,
    params: [0; 3],
};

/// One-terminal driver set from outside the simulation.
#[derive(Clone, Debug)]
pub struct Input {
    level: Option<Level>,
    strength: Strength,
}

impl Input {
    /// An undriven input that will drive at `strength` once set.
    pub fn new(strength: Strength) -> Self {
        Self {
            level: None,
            strength,
        }
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }
}

impl Behavior for Input {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        &INPUT
    }

    fn terminal_count(&self) -> usize {
        1
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        match self.level {
            Some(level) => io.drive(0, level, self.strength),
            None => io.undrive(0),
        }
    }

    fn describe(&self) -> String {
        match self.level {
            Some(level) => format!("input {level:?} strength {}", self.strength),
            None => String::from("input released"),
        }
    }
}
