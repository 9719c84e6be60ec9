//! Generic latches and master-slave flip-flops.
//!
//! The terminal layout is chosen at construction: each terminal takes one
//! [`RoleSpec`], carrying its own polarity and, for set/reset, whether the
//! role is gated by the control input.

use serde::{Deserialize, Serialize};

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::error::{Result, SimError};
use crate::network::TermKind;
use crate::strength::Logic;
use crate::types::Strength;

pub const LATCH: DeviceDescriptor = DeviceDescriptor {
    name: "latch",
    terminals: &[
        TermRole::new("q", TermKind::Output),
        TermRole::new("qbar", TermKind::Output),
        TermRole::new("control", TermKind::VoltageInput),
        TermRole::new("set", TermKind::VoltageInput),
        TermRole::new("reset", TermKind::VoltageInput),
        TermRole::new("data", TermKind::VoltageInput),
        TermRole::new("controlbar", TermKind::VoltageInput),
    ],
    expandable: None,
    params: [0; 3],
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatchRole {
    Q,
    QBar,
    Control,
    Set,
    Reset,
    Data,
    ControlBar,
}

impl LatchRole {
    pub fn is_output(self) -> bool {
        matches!(self, LatchRole::Q | LatchRole::QBar)
    }

    pub fn parse(name: &str) -> Option<LatchRole> {
        Some(match name {
            "q" => LatchRole::Q,
            "qbar" | "qb" => LatchRole::QBar,
            "control" | "clk" | "en" => LatchRole::Control,
            "set" => LatchRole::Set,
            "reset" => LatchRole::Reset,
            "data" | "d" => LatchRole::Data,
            "controlbar" | "clkbar" => LatchRole::ControlBar,
            _ => return None,
        })
    }
}

/// One terminal's role and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: LatchRole,
    pub active_high: bool,
    /// Set/reset only take effect while control is active.
    pub synchronous: bool,
}

impl RoleSpec {
    pub fn new(role: LatchRole) -> Self {
        Self {
            role,
            active_high: role != LatchRole::ControlBar,
            synchronous: false,
        }
    }

    pub fn active_low(mut self) -> Self {
        self.active_high = false;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchMode {
    /// Output follows data while control is active.
    #[default]
    Transparent,
    /// Data is captured while control is active and appears at the output
    /// once control goes inactive.
    MasterSlave,
}

#[derive(Clone, Debug)]
pub struct Latch {
    roles: Vec<RoleSpec>,
    mode: LatchMode,
    strength: Strength,
    stored: Logic,
}

impl Latch {
    /// Builds a latch from its terminal roles.
    ///
    /// Each role may appear once, and at least one of `q`/`qbar` must be
    /// present.
    pub fn new(roles: Vec<RoleSpec>, mode: LatchMode, strength: Strength) -> Result<Self> {
        if roles.len() > LATCH.terminals.len() {
            return Err(SimError::bad_attr(
                "roles",
                format!("{} roles given, at most {}", roles.len(), LATCH.terminals.len()),
            ));
        }
        for (i, spec) in roles.iter().enumerate() {
            if roles[..i].iter().any(|earlier| earlier.role == spec.role) {
                return Err(SimError::bad_attr(
                    "roles",
                    format!("{:?} listed twice", spec.role),
                ));
            }
        }
        if !roles.iter().any(|spec| spec.role.is_output()) {
            return Err(SimError::bad_attr("roles", "no q or qbar output"));
        }
        Ok(Self::build(roles, mode, strength))
    }

    fn build(roles: Vec<RoleSpec>, mode: LatchMode, strength: Strength) -> Self {
        Self {
            roles,
            mode,
            strength,
            stored: Logic::X,
        }
    }

    /// D latch with terminals `[q, qbar, control, data]`.
    pub fn d_latch(strength: Strength) -> Self {
        Self::build(
            vec![
                RoleSpec::new(LatchRole::Q),
                RoleSpec::new(LatchRole::QBar),
                RoleSpec::new(LatchRole::Control),
                RoleSpec::new(LatchRole::Data),
            ],
            LatchMode::Transparent,
            strength,
        )
    }

    pub fn mode(&self) -> LatchMode {
        self.mode
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    /// Value held by a master-slave latch.
    pub fn stored(&self) -> Logic {
        self.stored
    }

    fn term(&self, role: LatchRole) -> Option<(usize, RoleSpec)> {
        self.roles
            .iter()
            .enumerate()
            .find(|(_, spec)| spec.role == role)
            .map(|(i, spec)| (i, *spec))
    }

    fn active(&self, io: &DeviceIo<'_>, role: LatchRole) -> Option<(Logic, bool)> {
        self.term(role)
            .map(|(term, spec)| (io.logic(term).active(spec.active_high), spec.synchronous))
    }

    /// Current output value as seen on the q (or inverted qbar) node.
    fn current(&self, io: &DeviceIo<'_>) -> Logic {
        match (self.term(LatchRole::Q), self.term(LatchRole::QBar)) {
            (Some((q, _)), _) => io.logic(q),
            (None, Some((qb, _))) => io.logic(qb).not(),
            (None, None) => Logic::X,
        }
    }

    fn drive(&self, io: &mut DeviceIo<'_>, value: Logic) {
        if let Some((q, _)) = self.term(LatchRole::Q) {
            io.drive(q, value.to_level(), self.strength);
        }
        if let Some((qb, _)) = self.term(LatchRole::QBar) {
            io.drive(qb, value.not().to_level(), self.strength);
        }
    }

    /// Set/reset activity, gated by control when synchronous.
    fn forced(&self, io: &DeviceIo<'_>, control: Option<Logic>, role: LatchRole) -> Logic {
        match self.active(io, role) {
            None => Logic::Zero,
            Some((value, true)) => value.and(control.unwrap_or(Logic::One)),
            Some((value, false)) => value,
        }
    }
}

fn merge(a: Logic, b: Logic) -> Logic {
    if a == b {
        a
    } else {
        Logic::X
    }
}

impl Behavior for Latch {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        &LATCH
    }

    fn terminal_count(&self) -> usize {
        self.roles.len()
    }

    fn terminal_kind(&self, term: usize) -> TermKind {
        match self.roles.get(term) {
            Some(spec) if spec.role.is_output() => TermKind::Output,
            Some(_) => TermKind::VoltageInput,
            None => TermKind::Output,
        }
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        let control = [LatchRole::Control, LatchRole::ControlBar]
            .into_iter()
            .filter_map(|role| self.active(io, role).map(|(v, _)| v))
            .reduce(Logic::or);
        let set = self.forced(io, control, LatchRole::Set);
        let reset = self.forced(io, control, LatchRole::Reset);

        let forced = match (reset, set) {
            (Logic::Zero, Logic::Zero) => None,
            (Logic::One, Logic::Zero) => Some(Logic::Zero),
            (Logic::Zero, Logic::One) => Some(Logic::One),
            _ => Some(Logic::X),
        };
        if let Some(value) = forced {
            if self.mode == LatchMode::MasterSlave {
                self.stored = value;
            }
            self.drive(io, value);
            return;
        }

        let data = self
            .term(LatchRole::Data)
            .map_or(Logic::X, |(term, spec)| io.logic(term).active(spec.active_high));
        match self.mode {
            LatchMode::Transparent => match control.unwrap_or(Logic::One) {
                Logic::One => self.drive(io, data),
                Logic::Zero => {}
                Logic::X => {
                    let current = self.current(io);
                    if current != data || data == Logic::X {
                        self.drive(io, Logic::X);
                    }
                }
            },
            LatchMode::MasterSlave => match control.unwrap_or(Logic::Zero) {
                Logic::One => self.stored = data,
                Logic::Zero => self.drive(io, self.stored),
                Logic::X => {
                    self.stored = merge(self.stored, data);
                    let current = self.current(io);
                    let out = merge(current, self.stored);
                    if out != current {
                        self.drive(io, out);
                    }
                }
            },
        }
    }

    fn restart(&mut self) {
        self.stored = Logic::X;
    }

    fn describe(&self) -> String {
        let roles: Vec<String> = self
            .roles
            .iter()
            .map(|spec| {
                let mut name = format!("{:?}", spec.role).to_lowercase();
                if !spec.active_high {
                    name.push('-');
                }
                if spec.synchronous {
                    name.push('@');
                }
                name
            })
            .collect();
        format!(
            "latch {:?} [{}] stored {:?}",
            self.mode,
            roles.join(" "),
            self.stored
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(LatchRole::parse("qb"), Some(LatchRole::QBar));
        assert_eq!(LatchRole::parse("clk"), Some(LatchRole::Control));
        assert_eq!(LatchRole::parse("zz"), None);
    }

    #[test]
    fn test_controlbar_defaults_active_low() {
        assert!(!RoleSpec::new(LatchRole::ControlBar).active_high);
        assert!(RoleSpec::new(LatchRole::Control).active_high);
        let spec = RoleSpec::new(LatchRole::Reset).active_low().synchronous();
        assert!(!spec.active_high && spec.synchronous);
    }

    #[test]
    fn test_terminal_kinds_follow_roles() {
        let latch = Latch::d_latch(1);
        assert_eq!(latch.terminal_count(), 4);
        assert_eq!(latch.terminal_kind(0), TermKind::Output);
        assert_eq!(latch.terminal_kind(1), TermKind::Output);
        assert_eq!(latch.terminal_kind(2), TermKind::VoltageInput);
        assert_eq!(latch.terminal_kind(3), TermKind::VoltageInput);
    }

    #[test]
    fn test_describe_marks_flags() {
        let latch = Latch::new(
            vec![
                RoleSpec::new(LatchRole::Q),
                RoleSpec::new(LatchRole::Reset).active_low().synchronous(),
            ],
            LatchMode::MasterSlave,
            1,
        )
        .unwrap();
        assert_eq!(latch.describe(), "latch MasterSlave [q reset-@] stored X");
    }

    #[test]
    fn test_new_rejects_bad_role_lists() {
        let q = RoleSpec::new(LatchRole::Q);
        let clk = RoleSpec::new(LatchRole::Control);
        let d = RoleSpec::new(LatchRole::Data);
        let mode = LatchMode::Transparent;

        let twice = Latch::new(vec![q, clk, d, clk.active_low()], mode, 1);
        assert!(matches!(twice, Err(SimError::BadAttribute { .. })));

        let no_output = Latch::new(vec![clk, d], mode, 1);
        assert!(matches!(no_output, Err(SimError::BadAttribute { .. })));

        let too_many = Latch::new(vec![q; 8], mode, 1);
        let err = too_many.unwrap_err().to_string();
        assert!(err.contains("at most 7"), "{err}");

        let qbar_only = Latch::new(vec![RoleSpec::new(LatchRole::QBar), clk, d], mode, 1);
        assert_eq!(qbar_only.unwrap().terminal_count(), 3);
    }
}
