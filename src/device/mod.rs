//! Device models.
//!
//! Every instance holds a [`Device`], a closed set of the kinds the
//! simulator knows about. Each kind implements [`Behavior`]: a simulate
//! routine run whenever one of its inputs changes, startup and restart
//! hooks, and a one-line description for diagnostics. Devices read their
//! inputs and change their outputs only through a [`DeviceIo`].
//!
//! # Available Devices
//!
//! - [`Mos`] - transistor networks, normal or weak, NMOS or PMOS
//! - [`Pull`] - unidirectional pull-up/pull-down
//! - [`Gate`] - AND/OR/NOT expression gates
//! - [`Latch`] - configurable latches and master-slave flip-flops
//! - [`Tristate`] - tristate buffers and pass gates
//! - [`Ram`] - word-addressed memory
//! - [`Input`] - testbench stimulus

pub mod gate;
pub mod input;
pub mod latch;
pub mod mos;
pub mod pull;
pub mod ram;
pub mod tristate;

pub use gate::{Expr, Gate};
pub use input::Input;
pub use latch::{Latch, LatchMode, LatchRole, RoleSpec};
pub use mos::{Conduction, Mos, Polarity};
pub use pull::{Pull, PullSense};
pub use ram::Ram;
pub use tristate::Tristate;

use tracing::warn;

use crate::engine::Simulation;
use crate::network::{Network, TermKind};
use crate::strength::{Level, Logic, Voltage, NONE};
use crate::types::{ConnRef, InstanceId, Strength};

/// Name and classification of one terminal position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermRole {
    pub name: &'static str,
    pub kind: TermKind,
}

impl TermRole {
    pub const fn new(name: &'static str, kind: TermKind) -> Self {
        Self { name, kind }
    }
}

/// Static description of a device kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    /// Terminal roles in connection order.
    pub terminals: &'static [TermRole],
    /// Role repeated for every terminal at or beyond this index.
    pub expandable: Option<usize>,
    /// Kind-specific parameters distinguishing variants that share code.
    pub params: [i32; 3],
}

impl DeviceDescriptor {
    /// Classification of terminal `term`.
    pub fn terminal_kind(&self, term: usize) -> TermKind {
        let index = match self.expandable {
            Some(e) if term >= e => e,
            _ => term,
        };
        self.terminals
            .get(index)
            .map_or(TermKind::Output, |role| role.kind)
    }

    /// Display name of terminal `term`.
    pub fn terminal_name(&self, term: usize) -> &'static str {
        let index = match self.expandable {
            Some(e) if term >= e => e,
            _ => term,
        };
        self.terminals.get(index).map_or("?", |role| role.name)
    }
}

/// Hierarchy container without behavior.
pub const MODULE: DeviceDescriptor = DeviceDescriptor {
    name: "module",
    terminals: &[],
    expandable: None,
    params: [0; 3],
};

/// Behavior shared by every device kind.
pub trait Behavior {
    fn descriptor(&self) -> &'static DeviceDescriptor;

    /// Number of terminals this device needs.
    fn terminal_count(&self) -> usize;

    fn terminal_kind(&self, term: usize) -> TermKind {
        self.descriptor().terminal_kind(term)
    }

    /// Reacts to a change on one of the inputs.
    fn simulate(&mut self, io: &mut DeviceIo<'_>);

    /// Runs once when the simulation starts, and again after a restart.
    fn startup(&mut self, io: &mut DeviceIo<'_>) {
        self.simulate(io);
    }

    /// Drops internal state ahead of a fresh startup.
    fn restart(&mut self) {}

    /// One-line description for diagnostics.
    fn describe(&self) -> String;
}

/// The closed set of device kinds.
#[derive(Debug)]
pub enum Device {
    Module,
    Mos(Mos),
    Pull(Pull),
    Gate(Gate),
    Latch(Latch),
    Tristate(Tristate),
    Ram(Ram),
    Input(Input),
}

impl Device {
    fn behavior(&self) -> Option<&dyn Behavior> {
        match self {
            Device::Module => None,
            Device::Mos(d) => Some(d),
            Device::Pull(d) => Some(d),
            Device::Gate(d) => Some(d),
            Device::Latch(d) => Some(d),
            Device::Tristate(d) => Some(d),
            Device::Ram(d) => Some(d),
            Device::Input(d) => Some(d),
        }
    }

    fn behavior_mut(&mut self) -> Option<&mut dyn Behavior> {
        match self {
            Device::Module => None,
            Device::Mos(d) => Some(d),
            Device::Pull(d) => Some(d),
            Device::Gate(d) => Some(d),
            Device::Latch(d) => Some(d),
            Device::Tristate(d) => Some(d),
            Device::Ram(d) => Some(d),
            Device::Input(d) => Some(d),
        }
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.behavior().map_or(&MODULE, Behavior::descriptor)
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn terminal_count(&self) -> usize {
        self.behavior().map_or(0, Behavior::terminal_count)
    }

    pub fn terminal_kind(&self, term: usize) -> TermKind {
        self.behavior()
            .map_or(TermKind::Output, |b| b.terminal_kind(term))
    }

    pub fn describe(&self) -> String {
        self.behavior()
            .map_or_else(|| String::from("module"), Behavior::describe)
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Device::Module)
    }

    pub fn as_mos(&self) -> Option<&Mos> {
        match self {
            Device::Mos(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        if let Some(b) = self.behavior_mut() {
            b.simulate(io);
        }
    }

    pub(crate) fn startup(&mut self, io: &mut DeviceIo<'_>) {
        if let Some(b) = self.behavior_mut() {
            b.startup(io);
        }
    }

    pub(crate) fn restart(&mut self) {
        if let Some(b) = self.behavior_mut() {
            b.restart();
        }
    }
}

/// A device's view of the simulation while one of its routines runs.
pub struct DeviceIo<'a> {
    sim: &'a mut Simulation,
    inst: InstanceId,
}

impl<'a> DeviceIo<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, inst: InstanceId) -> Self {
        Self { sim, inst }
    }

    pub fn instance(&self) -> InstanceId {
        self.inst
    }

    pub(crate) fn network(&self) -> &Network {
        self.sim.network()
    }

    /// Voltage of the node on terminal `term`; unconnected terminals read
    /// as uncharged X.
    pub fn voltage(&self, term: usize) -> Voltage {
        self.sim
            .network()
            .terminal_node(self.inst, term)
            .and_then(|n| self.sim.network().node(n).ok())
            .map_or(Voltage::ChargedX, |n| n.voltage())
    }

    pub fn logic(&self, term: usize) -> Logic {
        self.voltage(term).logic()
    }

    /// Drives terminal `term` to `level` at `strength`.
    pub fn drive(&mut self, term: usize, level: Level, strength: Strength) {
        let (high, low) = level.strengths(strength);
        self.drive_raw(term, high, low);
    }

    /// Sets terminal `term`'s high and low contributions directly.
    pub fn drive_raw(&mut self, term: usize, high: Strength, low: Strength) {
        self.sim
            .set_contribution(ConnRef::new(self.inst, term), high, low, false);
    }

    /// Withdraws terminal `term`'s contribution.
    pub fn undrive(&mut self, term: usize) {
        self.drive_raw(term, NONE, NONE);
    }

    /// Asks for this instance's transistor stage to be re-solved.
    pub fn schedule_drive(&mut self) {
        self.sim.schedule_drive(self.inst);
    }

    /// Reports a recoverable condition.
    pub fn warn(&mut self, message: &str) {
        let path = self.sim.network().instance_path(self.inst);
        warn!(instance = %path, "{message}");
        self.sim.note_warning();
    }
}
