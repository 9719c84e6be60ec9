//! Unidirectional pull-up and pull-down devices.

use serde::{Deserialize, Serialize};

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::network::TermKind;
use crate::strength::{Level, Logic};
use crate::types::Strength;

const PULL_TERMINALS: &[TermRole] = &[
    TermRole::new("out", TermKind::Output),
    TermRole::new("gate", TermKind::VoltageInput),
];

pub const PULLUP: DeviceDescriptor = DeviceDescriptor {
    name: "pullup",
    terminals: PULL_TERMINALS,
    expandable: None,
    params: [1, 0, 0],
};

pub const PULLDOWN: DeviceDescriptor = DeviceDescriptor {
    name: "pulldown",
    terminals: PULL_TERMINALS,
    expandable: None,
    params: [0, 0, 0],
};

/// When the pull is engaged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullSense {
    /// No gate terminal; always engaged.
    #[default]
    Always,
    ActiveHigh,
    ActiveLow,
}

#[derive(Clone, Debug)]
pub struct Pull {
    level: Level,
    strength: Strength,
    sense: PullSense,
}

impl Pull {
    pub fn up(strength: Strength, sense: PullSense) -> Self {
        Self {
            level: Level::High,
            strength,
            sense,
        }
    }

    pub fn down(strength: Strength, sense: PullSense) -> Self {
        Self {
            level: Level::Low,
            strength,
            sense,
        }
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn sense(&self) -> PullSense {
        self.sense
    }

    fn engaged(&self, io: &DeviceIo<'_>) -> Logic {
        match self.sense {
            PullSense::Always => Logic::One,
            PullSense::ActiveHigh => io.logic(1),
            PullSense::ActiveLow => io.logic(1).not(),
        }
    }
}

impl Behavior for Pull {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        match self.level {
            Level::High => &PULLUP,
            _ => &PULLDOWN,
        }
    }

    fn terminal_count(&self) -> usize {
        match self.sense {
            PullSense::Always => 1,
            _ => 2,
        }
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        match self.engaged(io) {
            Logic::One => io.drive(0, self.level, self.strength),
            Logic::Zero => io.undrive(0),
            Logic::X => io.drive(0, Level::Unknown, self.strength),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} strength {} {:?}",
            self.descriptor().name,
            self.strength,
            self.sense
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::WEAK;

    #[test]
    fn test_terminal_count_follows_sense() {
        assert_eq!(Pull::up(WEAK, PullSense::Always).terminal_count(), 1);
        assert_eq!(Pull::down(1, PullSense::ActiveLow).terminal_count(), 2);
    }

    #[test]
    fn test_descriptor_by_level() {
        assert_eq!(Pull::up(WEAK, PullSense::Always).descriptor().name, "pullup");
        assert_eq!(Pull::down(WEAK, PullSense::Always).descriptor().name, "pulldown");
        assert_eq!(PULLDOWN.terminal_kind(1), TermKind::VoltageInput);
    }
}
