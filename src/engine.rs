//! The simulation context.
//!
//! [`Simulation`] owns the network, the four event queues, configuration,
//! status flags and statistics. Netlist readers populate it through the
//! ingestion methods, optionally run the merge optimizer, and then drive it
//! with [`Simulation::evaluate`], which runs the queues to a fixed point.
//!
//! Within one step, transistor stages and node strengths always settle
//! before any device is re-evaluated: the evaluation queue is only consulted
//! once the drive and node queues are empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::SimConfig;
use crate::device::{Device, DeviceIo, Input};
use crate::error::{Result, SimError};
use crate::network::{Network, TermKind};
use crate::probe::ProbeSet;
use crate::scheduler::{
    QueuePeaks, Scheduler, Status, StepOutcome, StopReason, SCHED_DRIVE, SCHED_EVAL, SCHED_NODE,
};
use crate::stats::{MergeStats, NetworkStats, SimulationStats};
use crate::strength::{Level, Logic, Voltage, NONE};
use crate::types::{ConnRef, ElementId, InstanceId, NodeId, Rail, StepCount, Strength};

/// Counters kept by the scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Steps run to quiescence
    pub steps: u64,
    /// Steps stopped early
    pub interrupted_steps: u64,
    /// Interrupted steps whose remaining work was discarded
    pub aborted_steps: u64,
    /// Device simulate calls
    pub evaluations: u64,
    /// Transistor stages solved
    pub stage_solves: u64,
    /// Node recomputes
    pub node_recomputes: u64,
    /// Node voltage changes
    pub node_transitions: u64,
    /// Recoverable conditions reported
    pub warnings: u64,
    /// Oscillations that stopped a step
    pub cycle_reports: u64,
    /// Peak live queue depths
    pub peaks: QueuePeaks,
}

/// A switch-level simulation.
///
/// # Example
///
/// ```
/// use switchsim::{Simulation, Level, Voltage};
/// use switchsim::device::{Device, Gate};
///
/// let mut sim = Simulation::default();
/// let root = sim.network().root();
/// let a = sim.make_element(root, "a").unwrap();
/// let y = sim.make_element(root, "y").unwrap();
/// sim.add_device(root, "inv", Device::Gate(Gate::inverter(1)), &[y, a]).unwrap();
/// let stim = sim.add_input(root, "stim", a).unwrap();
///
/// sim.set_input(stim, Some(Level::High)).unwrap();
/// sim.evaluate(true).unwrap();
/// assert_eq!(sim.resolve_voltage(y).unwrap(), Voltage::Normal0);
/// ```
pub struct Simulation {
    pub(crate) net: Network,
    pub(crate) sched: Scheduler,
    pub(crate) config: SimConfig,
    pub(crate) status: Status,
    pub(crate) stats: EngineStats,
    pub(crate) merge_stats: MergeStats,
    pub(crate) probes: ProbeSet,
    stop: Option<StopReason>,
    fatal: Option<SimError>,
    interrupt: Arc<AtomicBool>,
    pub(crate) pending_startup: bool,
    steps: StepCount,
}

impl Simulation {
    /// Creates an empty simulation after validating `config`.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: SimConfig) -> Self {
        Self {
            net: Network::with_block_bytes(config.arena.block_bytes),
            sched: Scheduler::new(),
            config,
            status: Status::default(),
            stats: EngineStats::default(),
            merge_stats: MergeStats::default(),
            probes: ProbeSet::default(),
            stop: None,
            fatal: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            pending_startup: false,
            steps: 0,
        }
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Completed steps.
    pub fn steps(&self) -> StepCount {
        self.steps
    }

    pub fn is_started(&self) -> bool {
        self.status.started
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Creates a device or module instance under `parent`.
    pub fn make_instance(
        &mut self,
        parent: InstanceId,
        name: &str,
        device: Device,
    ) -> Result<InstanceId> {
        let inst = self.net.make_instance(parent, name, device)?;
        if self.status.started {
            self.schedule_eval(inst);
        }
        Ok(inst)
    }

    /// Declares a named net in `owner`'s scope.
    pub fn make_element(&mut self, owner: InstanceId, name: &str) -> Result<ElementId> {
        self.net.make_element(owner, name)
    }

    /// Resizes an instance's connection array, detaching every terminal.
    pub fn make_connection_array(&mut self, inst: InstanceId, len: usize) -> Result<()> {
        for node in self.net.make_connection_array(inst, len)? {
            self.strength_changed(node, false);
        }
        Ok(())
    }

    /// Binds terminal `term` of `inst` to `element`'s net.
    pub fn connect_term(&mut self, inst: InstanceId, term: usize, element: ElementId) -> Result<()> {
        let node = self.net.connect_term(inst, term, element)?;
        let conn = self.net.conn(ConnRef::new(inst, term));
        let drive_level = conn.kind == TermKind::DriveLevel;
        let contributes = conn.strengths() != (NONE, NONE);
        if self.status.started {
            self.schedule_eval(inst);
            if drive_level {
                self.schedule_drive(inst);
            }
        }
        if self.status.started || contributes {
            self.strength_changed(node, false);
        }
        Ok(())
    }

    /// Makes two elements name one net; `a`'s node survives.
    pub fn merge_equivalent(&mut self, a: ElementId, b: ElementId) -> Result<NodeId> {
        let gone = self.net.node_of(b)?;
        if gone != self.net.node_of(a)? {
            self.forget_node(gone);
        }
        let node = self.net.merge_equivalent(a, b)?;
        if self.status.started {
            self.strength_changed(node, false);
        }
        Ok(node)
    }

    /// Creates an instance and binds its terminals, in order, to `terminals`.
    pub fn add_device(
        &mut self,
        parent: InstanceId,
        name: &str,
        device: Device,
        terminals: &[ElementId],
    ) -> Result<InstanceId> {
        let count = device.terminal_count();
        if terminals.len() > count {
            return Err(SimError::TerminalOutOfRange {
                term: terminals.len() - 1,
                count,
            });
        }
        let inst = self.make_instance(parent, name, device)?;
        for (term, element) in terminals.iter().enumerate() {
            self.connect_term(inst, term, *element)?;
        }
        Ok(inst)
    }

    /// Adds a testbench input driving `element` at the configured input
    /// strength. It starts released.
    pub fn add_input(&mut self, parent: InstanceId, name: &str, element: ElementId) -> Result<InstanceId> {
        let input = Input::new(self.config.drive.input_strength);
        self.add_device(parent, name, Device::Input(input), &[element])
    }

    /// Ties `element`'s net to a rail, or releases it with `None`.
    pub fn set_rail(&mut self, element: ElementId, rail: Option<Rail>) -> Result<()> {
        let node = self.net.node_of(element)?;
        self.net.set_rail(node, rail)?;
        self.strength_changed(node, false);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Drives a connection at the configured gate strength.
    pub fn drive_output(&mut self, conn: ConnRef, level: Level) -> Result<()> {
        self.drive_with(conn, level, self.config.drive.gate_strength)
    }

    /// Drives a connection at the configured weak strength.
    pub fn weak_drive_output(&mut self, conn: ConnRef, level: Level) -> Result<()> {
        self.drive_with(conn, level, self.config.drive.weak_strength)
    }

    /// Withdraws a connection's contribution.
    pub fn undrive_output(&mut self, conn: ConnRef) -> Result<()> {
        self.net.try_conn(conn)?;
        self.set_contribution(conn, NONE, NONE, false);
        Ok(())
    }

    fn drive_with(&mut self, conn: ConnRef, level: Level, strength: Strength) -> Result<()> {
        self.net.try_conn(conn)?;
        let (high, low) = level.strengths(strength);
        self.set_contribution(conn, high, low, false);
        Ok(())
    }

    /// Sets a testbench input and applies it right away.
    pub fn set_input(&mut self, inst: InstanceId, level: Option<Level>) -> Result<()> {
        match self.net.instances.get_mut(inst).map(|i| &mut i.device) {
            Some(Device::Input(input)) => input.set_level(level),
            Some(_) => return Err(SimError::bad_attr("instance", "not an input device")),
            None => return Err(SimError::StaleHandle),
        }
        self.simulate_instance(inst);
        Ok(())
    }

    /// Watches `element`'s net: a logic change stops the step.
    pub fn set_breakpoint(&mut self, element: ElementId, enabled: bool) -> Result<()> {
        let node = self.net.node_of(element)?;
        self.net.nodes[node].breakpoint = enabled;
        Ok(())
    }

    /// Shared flag that stops the current step when raised.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn resolve_voltage(&self, element: ElementId) -> Result<Voltage> {
        let node = self.net.node_of(element)?;
        Ok(self.net.node(node)?.voltage())
    }

    pub fn resolve_display_char(&self, element: ElementId) -> Result<char> {
        Ok(self.resolve_voltage(element)?.letter())
    }

    pub fn logic(&self, element: ElementId) -> Result<Logic> {
        Ok(self.resolve_voltage(element)?.logic())
    }

    /// Voltage of an element given by dotted path.
    pub fn voltage_at(&self, path: &str) -> Result<Voltage> {
        self.resolve_voltage(self.net.find_element(path)?)
    }

    pub fn find_element(&self, path: &str) -> Result<ElementId> {
        self.net.find_element(path)
    }

    pub fn find_instance(&self, path: &str) -> Result<InstanceId> {
        self.net.find_instance(path)
    }

    pub fn element_path(&self, element: ElementId) -> String {
        self.net.element_path(element)
    }

    pub fn instance_path(&self, inst: InstanceId) -> String {
        self.net.instance_path(inst)
    }

    pub fn device(&self, inst: InstanceId) -> Result<&Device> {
        Ok(&self.net.instance(inst)?.device)
    }

    /// The device's one-line description.
    pub fn describe_instance(&self, inst: InstanceId) -> Result<String> {
        let instance = self.net.instance(inst)?;
        Ok(format!(
            "{}: {}",
            self.net.instance_path(inst),
            instance.device.describe()
        ))
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Runs the queues until nothing is left to do, or until a stop
    /// condition is raised.
    ///
    /// With `initialize` false, a step that was interrupted resumes where it
    /// stopped: oscillation counters carry over. With `initialize` true, the
    /// step starts fresh; work still queued from an interrupted step is kept.
    ///
    /// A fatal condition returns `Err` and leaves the step interrupted.
    pub fn evaluate(&mut self, initialize: bool) -> Result<StepOutcome> {
        if !self.status.started || self.pending_startup {
            self.start();
        }
        if initialize {
            if self.status.interrupted {
                debug!("fresh step after an interrupted one, resetting oscillation counters");
                self.reset_cycle_tracking();
            }
            self.status.cycle_detected = false;
        }
        self.stop = None;

        loop {
            self.settle_drive();
            if let Some(err) = self.fatal.take() {
                self.status.interrupted = true;
                error!(error = %err, "step aborted");
                return Err(err);
            }
            if self.interrupt.swap(false, Ordering::SeqCst) {
                self.stop.get_or_insert(StopReason::UserInterrupt);
            }
            if let Some(reason) = self.stop {
                self.status.interrupted = true;
                self.stats.interrupted_steps += 1;
                debug!(?reason, step = self.steps, "step interrupted");
                return Ok(StepOutcome::Interrupted(reason));
            }

            let Some(inst) = self.sched.eval.pop() else {
                break;
            };
            let Some(instance) = self.net.instances.get_mut(inst) else {
                continue;
            };
            if self.sched.eval.settle(&mut instance.sched) {
                self.simulate_instance(inst);
            }
        }

        self.finish_step();
        Ok(StepOutcome::Settled)
    }

    /// Discards the remaining work of an interrupted step.
    pub fn abort_step(&mut self) {
        if self.status.interrupted {
            self.stats.aborted_steps += 1;
        }
        for inst in self.sched.drive.drain() {
            if let Some(i) = self.net.instances.get_mut(inst) {
                i.sched &= !SCHED_DRIVE;
            }
        }
        for inst in self.sched.eval.drain() {
            if let Some(i) = self.net.instances.get_mut(inst) {
                i.sched &= !SCHED_EVAL;
            }
        }
        for node in self.sched.node.drain() {
            if let Some(n) = self.net.nodes.get_mut(node) {
                n.sched &= !SCHED_NODE;
            }
        }
        self.reset_cycle_tracking();
        self.stop = None;
        self.fatal = None;
        self.status.interrupted = false;
        debug!("pending work discarded");
    }

    /// Drops device state and reruns every startup routine on the next
    /// evaluation.
    pub fn restart(&mut self) {
        self.abort_step();
        for inst in self.net.walk_instances() {
            if let Some(instance) = self.net.instances.get_mut(inst) {
                instance.device.restart();
            }
        }
        self.pending_startup = true;
        info!("devices restarted");
    }

    fn start(&mut self) {
        let first = !self.status.started;
        self.status.started = true;
        self.pending_startup = false;
        if first {
            info!(
                instances = self.net.instance_count() - 1,
                nodes = self.net.node_count(),
                "starting simulation"
            );
        }
        for inst in self.net.walk_instances() {
            self.startup_instance(inst);
        }
    }

    /// Drains the drive queue and the node queue, drive first.
    fn settle_drive(&mut self) {
        while self.fatal.is_none() {
            if let Some(inst) = self.sched.drive.pop() {
                let Some(instance) = self.net.instances.get_mut(inst) else {
                    continue;
                };
                if self.sched.drive.settle(&mut instance.sched) {
                    self.solve_stage(inst);
                }
            } else if let Some(node) = self.sched.node.pop() {
                let Some(n) = self.net.nodes.get_mut(node) else {
                    continue;
                };
                if self.sched.node.settle(&mut n.sched) {
                    self.recompute_node(node);
                }
            } else {
                break;
            }
        }
    }

    fn finish_step(&mut self) {
        self.steps += 1;
        self.stats.steps += 1;
        self.stats.peaks = self.sched.peaks();
        self.probes.sample(self.steps, &self.net);
        self.reset_cycle_tracking();
        self.sched.drive.compact();
        self.sched.node.compact();
        self.sched.eval.compact();
        self.status.interrupted = false;
        trace!(step = self.steps, "step settled");
    }

    fn reset_cycle_tracking(&mut self) {
        while let Some(node) = self.sched.cycle.pop() {
            let Some(n) = self.net.nodes.get_mut(node) else {
                continue;
            };
            if self.sched.cycle.settle(&mut n.sched) {
                n.transitions = 0;
                n.wraps = 0;
                n.warned = false;
            }
        }
    }

    /// Recomputes a node's voltage from its strengths and wakes whatever
    /// depends on it.
    pub(crate) fn recompute_node(&mut self, id: NodeId) {
        let limit = self.config.simulation.cycle_limit;
        let collect = self.config.simulation.collect_stats;
        if collect {
            self.stats.node_recomputes += 1;
        }
        let Some(node) = self.net.nodes.get_mut(id) else {
            return;
        };
        let old = node.voltage;
        let new = node.resolved();
        if new == old {
            self.wake(id, false);
            return;
        }

        node.voltage = new;
        node.transitions += 1;
        let mut wrapped = None;
        if node.transitions >= limit {
            node.transitions = 0;
            node.wraps += 1;
            wrapped = Some(node.wraps);
        }
        self.sched.cycle.push(id, &mut node.sched);
        if collect {
            self.stats.node_transitions += 1;
        }
        trace!(node = %self.net.node_name(id), from = %old, to = %new, "node changed");

        if new == Voltage::Illegal {
            let name = self.net.node_name(id);
            error!(node = %name, "both rails driven at full strength");
            self.fatal = Some(SimError::IllegalVoltage { node: name });
            return;
        }
        if let Some(wraps) = wrapped {
            self.note_wrap(id, wraps);
        }

        let logic = new.logic();
        let logic_changed = old.logic() != logic;
        self.wake(id, logic_changed);

        let (high, low) = match logic {
            Logic::One => (true, false),
            Logic::Zero => (false, true),
            Logic::X => (true, true),
        };
        if self.net.set_charge(id, high, low) {
            self.strength_changed(id, true);
        }

        if logic_changed && self.net.nodes[id].breakpoint {
            debug!(node = %self.net.node_name(id), %new, "breakpoint");
            self.stop.get_or_insert(StopReason::Breakpoint);
        }
    }

    fn note_wrap(&mut self, id: NodeId, wraps: u32) {
        let abort = self.config.simulation.cycle_abort_wraps;
        if wraps >= abort {
            if !self.status.cycle_detected {
                warn!(node = %self.net.node_name(id), wraps, "oscillation detected, stopping step");
            }
            self.status.cycle_detected = true;
            self.stats.cycle_reports += 1;
            self.stop.get_or_insert(StopReason::Cycle);
        } else if wraps == 2 && !self.net.nodes[id].warned {
            self.net.nodes[id].warned = true;
            warn!(node = %self.net.node_name(id), "node appears to be oscillating");
            self.note_warning();
        } else {
            trace!(node = %self.net.node_name(id), wraps, "transition counter wrapped");
        }
    }

    /// Queues the devices reading a node: strength-sensitive terminals
    /// always, voltage-sensitive ones only on a logic change.
    fn wake(&mut self, node: NodeId, logic_changed: bool) {
        let mut cur = self.net.nodes.get(node).and_then(|n| n.head);
        while let Some(c) = cur {
            let conn = self.net.conn(c);
            cur = conn.next;
            let wake = match conn.kind {
                TermKind::DriveInput => true,
                TermKind::VoltageInput => logic_changed,
                TermKind::Output | TermKind::DriveLevel => false,
            };
            if wake {
                self.schedule_eval(c.inst);
            }
        }
    }

    /// Queues the conducting transistors attached to a node for a stage
    /// re-solve.
    fn wake_stages(&mut self, node: NodeId) {
        let mut cur = self.net.nodes.get(node).and_then(|n| n.head);
        while let Some(c) = cur {
            let conn = self.net.conn(c);
            cur = conn.next;
            if conn.kind != TermKind::DriveLevel {
                continue;
            }
            let conducting = self.net.instances[c.inst]
                .device
                .as_mos()
                .is_some_and(|m| m.conduction().may_conduct());
            if conducting {
                self.schedule_drive(c.inst);
            }
        }
    }

    /// Changes one connection's contribution. Changes made by the stage
    /// solver do not wake the stage again.
    pub(crate) fn set_contribution(
        &mut self,
        cref: ConnRef,
        high: Strength,
        low: Strength,
        from_stage: bool,
    ) {
        let Some((node, changed)) = self.net.update_contribution(cref, high, low) else {
            return;
        };
        if changed {
            self.schedule_node(node);
        }
        if !from_stage {
            self.wake_stages(node);
        }
    }

    /// A node's winning strengths changed outside a contribution update.
    pub(crate) fn strength_changed(&mut self, node: NodeId, from_stage: bool) {
        self.schedule_node(node);
        if !from_stage {
            self.wake_stages(node);
        }
    }

    fn schedule_node(&mut self, node: NodeId) {
        if let Some(n) = self.net.nodes.get_mut(node) {
            self.sched.node.push(node, &mut n.sched);
        }
    }

    pub(crate) fn schedule_eval(&mut self, inst: InstanceId) {
        if let Some(i) = self.net.instances.get_mut(inst) {
            self.sched.eval.push(inst, &mut i.sched);
        }
    }

    pub(crate) fn schedule_drive(&mut self, inst: InstanceId) {
        if let Some(i) = self.net.instances.get_mut(inst) {
            self.sched.drive.push(inst, &mut i.sched);
        }
    }

    /// Withdraws a node from every queue ahead of freeing it.
    pub(crate) fn forget_node(&mut self, node: NodeId) {
        if let Some(n) = self.net.nodes.get_mut(node) {
            self.sched.node.cancel(&mut n.sched);
            self.sched.cycle.cancel(&mut n.sched);
        }
    }

    /// Withdraws an instance from every queue ahead of freeing it.
    pub(crate) fn forget_instance(&mut self, inst: InstanceId) {
        if let Some(i) = self.net.instances.get_mut(inst) {
            self.sched.drive.cancel(&mut i.sched);
            self.sched.eval.cancel(&mut i.sched);
        }
    }

    pub(crate) fn note_warning(&mut self) {
        self.stats.warnings += 1;
    }

    pub(crate) fn simulate_instance(&mut self, inst: InstanceId) {
        let Some(instance) = self.net.instances.get_mut(inst) else {
            return;
        };
        let mut device = std::mem::replace(&mut instance.device, Device::Module);
        if self.config.simulation.collect_stats {
            self.stats.evaluations += 1;
        }
        device.simulate(&mut DeviceIo::new(self, inst));
        if let Some(instance) = self.net.instances.get_mut(inst) {
            instance.device = device;
        }
    }

    fn startup_instance(&mut self, inst: InstanceId) {
        let Some(instance) = self.net.instances.get_mut(inst) else {
            return;
        };
        let mut device = std::mem::replace(&mut instance.device, Device::Module);
        device.startup(&mut DeviceIo::new(self, inst));
        if let Some(instance) = self.net.instances.get_mut(inst) {
            instance.device = device;
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn network_stats(&self) -> NetworkStats {
        NetworkStats {
            instances: self.net.instance_count().saturating_sub(1),
            nodes: self.net.node_count(),
            elements: self.net.element_count(),
            connections: self.net.conns.live(),
            arena_blocks: self.net.arena_blocks(),
        }
    }

    pub fn merge_stats(&self) -> &MergeStats {
        &self.merge_stats
    }

    /// Snapshot of every statistic.
    pub fn simulation_stats(&self) -> SimulationStats {
        SimulationStats {
            engine: self.stats.clone(),
            merge: self.merge_stats.clone(),
            network: self.network_stats(),
            ..SimulationStats::default()
        }
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let network = self.network_stats();
        serde_json::json!({
            "engine": {
                "steps": self.stats.steps,
                "interrupted_steps": self.stats.interrupted_steps,
                "aborted_steps": self.stats.aborted_steps,
                "evaluations": self.stats.evaluations,
                "stage_solves": self.stats.stage_solves,
                "node_recomputes": self.stats.node_recomputes,
                "node_transitions": self.stats.node_transitions,
                "warnings": self.stats.warnings,
                "cycle_reports": self.stats.cycle_reports,
                "cycle_detected": self.status.cycle_detected,
                "peak_drive_queue": self.stats.peaks.drive,
                "peak_node_queue": self.stats.peaks.node,
                "peak_eval_queue": self.stats.peaks.eval,
            },
            "merge": self.merge_stats,
            "network": network,
        })
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::with_valid_config(SimConfig::default())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("network", &self.net)
            .field("status", &self.status)
            .field("steps", &self.steps)
            .finish()
    }
}
