//! Integration tests for the Simulation.
//!
//! These tests verify end-to-end scenarios including:
//! - Oscillation detection and resumption
//! - Breakpoints and user interrupts
//! - State images across networks
//! - Statistics export

use std::sync::atomic::Ordering;

use switchsim::device::{Device, Gate};
use switchsim::strength::DRIVE;
use switchsim::{
    ElementId, InstanceId, Level, Logic, SimConfig, SimError, Simulation, StepOutcome, StopReason,
    Voltage,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Inverter `y = !a` with a stimulus on `a`.
fn inverter() -> (Simulation, ElementId, ElementId, InstanceId) {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let a = sim.make_element(root, "a").unwrap();
    let y = sim.make_element(root, "y").unwrap();
    sim.add_device(root, "inv", Device::Gate(Gate::inverter(DRIVE)), &[y, a])
        .unwrap();
    let stim = sim.add_input(root, "stim", a).unwrap();
    (sim, a, y, stim)
}

/// An inverter whose output feeds its own input, held by a stimulus.
fn self_loop() -> (Simulation, ElementId, InstanceId) {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let n = sim.make_element(root, "n").unwrap();
    sim.add_device(root, "inv", Device::Gate(Gate::inverter(DRIVE)), &[n, n])
        .unwrap();
    let kick = sim.add_input(root, "kick", n).unwrap();
    sim.set_input(kick, Some(Level::High)).unwrap();
    assert_eq!(sim.evaluate(true).unwrap(), StepOutcome::Settled);
    (sim, n, kick)
}

fn counters(sim: &Simulation, element: ElementId) -> (u32, u32) {
    let node = sim.network().node_of(element).unwrap();
    let node = sim.network().node(node).unwrap();
    (node.wraps(), node.transitions())
}

// ============================================================================
// Oscillation
// ============================================================================

#[test]
fn test_self_loop_is_stopped_as_oscillation() {
    let (mut sim, n, kick) = self_loop();
    assert_eq!(sim.resolve_voltage(n).unwrap(), Voltage::Strong1);

    sim.set_input(kick, None).unwrap();
    let outcome = sim.evaluate(true).unwrap();
    assert_eq!(outcome, StepOutcome::Interrupted(StopReason::Cycle));
    assert!(!outcome.is_settled());

    let status = sim.status();
    assert!(status.cycle_detected);
    assert!(status.interrupted);
    assert_eq!(counters(&sim, n), (3, 0));
    // wrap 2 warned once
    assert!(sim.stats().warnings >= 1);
    assert_eq!(sim.stats().cycle_reports, 1);
}

#[test]
fn test_resume_keeps_oscillation_counters() {
    let (mut sim, n, kick) = self_loop();
    sim.set_input(kick, None).unwrap();
    sim.evaluate(true).unwrap();

    let outcome = sim.evaluate(false).unwrap();
    assert_eq!(outcome, StepOutcome::Interrupted(StopReason::Cycle));
    assert_eq!(counters(&sim, n), (4, 0));
}

#[test]
fn test_fresh_step_resets_oscillation_counters() {
    let (mut sim, n, kick) = self_loop();
    sim.set_input(kick, None).unwrap();
    sim.evaluate(true).unwrap();

    let outcome = sim.evaluate(true).unwrap();
    assert_eq!(outcome, StepOutcome::Interrupted(StopReason::Cycle));
    assert_eq!(counters(&sim, n), (3, 0));
}

#[test]
fn test_abort_then_hold_stops_oscillation() {
    let (mut sim, n, kick) = self_loop();
    sim.set_input(kick, None).unwrap();
    sim.evaluate(true).unwrap();

    sim.abort_step();
    assert!(!sim.status().interrupted);
    sim.set_input(kick, Some(Level::Low)).unwrap();
    assert_eq!(sim.evaluate(true).unwrap(), StepOutcome::Settled);
    assert_eq!(sim.resolve_voltage(n).unwrap(), Voltage::Strong0);
    assert!(!sim.status().cycle_detected);
    assert_eq!(sim.stats().aborted_steps, 1);
}

#[test]
fn test_ring_of_three_oscillates() {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let nodes: Vec<_> = (0..3)
        .map(|i| sim.make_element(root, &format!("n{i}")).unwrap())
        .collect();
    for i in 0..3 {
        let out = nodes[(i + 1) % 3];
        sim.add_device(
            root,
            &format!("inv{i}"),
            Device::Gate(Gate::inverter(DRIVE)),
            &[out, nodes[i]],
        )
        .unwrap();
    }
    let kick = sim.add_input(root, "kick", nodes[0]).unwrap();
    sim.set_input(kick, Some(Level::High)).unwrap();
    assert!(sim.evaluate(true).unwrap().is_settled());
    assert_eq!(sim.logic(nodes[1]).unwrap(), Logic::Zero);
    assert_eq!(sim.logic(nodes[2]).unwrap(), Logic::One);

    sim.set_input(kick, None).unwrap();
    assert_eq!(
        sim.evaluate(true).unwrap(),
        StepOutcome::Interrupted(StopReason::Cycle)
    );
    assert!(sim.status().cycle_detected);
}

#[test]
fn test_smaller_cycle_limit_stops_sooner() {
    let config = SimConfig::builder().cycle_limit(8).build().unwrap();
    let mut sim = Simulation::new(config).unwrap();
    let root = sim.network().root();
    let n = sim.make_element(root, "n").unwrap();
    sim.add_device(root, "inv", Device::Gate(Gate::inverter(DRIVE)), &[n, n])
        .unwrap();
    let kick = sim.add_input(root, "kick", n).unwrap();
    sim.set_input(kick, Some(Level::Low)).unwrap();
    sim.evaluate(true).unwrap();

    sim.set_input(kick, None).unwrap();
    sim.evaluate(true).unwrap();
    assert_eq!(counters(&sim, n), (3, 0));
    // three wraps of eight transitions
    assert!(sim.stats().node_transitions >= 24);
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let mut config = SimConfig::default();
    config.simulation.cycle_limit = 0;
    assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));

    let mut config = SimConfig::default();
    config.simulation.log_level = "chatty".to_string();
    assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));
}

// ============================================================================
// Late wiring
// ============================================================================

#[test]
fn test_output_connected_after_start_is_driven() {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let a = sim.make_element(root, "a").unwrap();
    let y = sim.make_element(root, "y").unwrap();
    let inv = sim
        .make_instance(root, "inv", Device::Gate(Gate::inverter(DRIVE)))
        .unwrap();
    sim.connect_term(inv, 1, a).unwrap();
    let stim = sim.add_input(root, "stim", a).unwrap();
    sim.set_input(stim, Some(Level::High)).unwrap();
    assert!(sim.evaluate(true).unwrap().is_settled());

    sim.connect_term(inv, 0, y).unwrap();
    assert!(sim.evaluate(true).unwrap().is_settled());
    assert_eq!(sim.resolve_voltage(y).unwrap(), Voltage::Normal0);
}

#[test]
fn test_wide_terminal_index_leaves_wiring_alone() {
    let (mut sim, a, y, stim) = inverter();
    let err = sim.connect_term(stim, 65536, y).unwrap_err();
    assert!(matches!(err, SimError::TerminalOutOfRange { term: 65536, .. }));

    sim.set_input(stim, Some(Level::High)).unwrap();
    assert!(sim.evaluate(true).unwrap().is_settled());
    assert_eq!(sim.resolve_voltage(a).unwrap(), Voltage::Strong1);
    assert_eq!(sim.logic(y).unwrap(), Logic::Zero);
}

// ============================================================================
// Stops
// ============================================================================

#[test]
fn test_breakpoint_stops_on_logic_change() {
    let (mut sim, _, y, stim) = inverter();
    sim.evaluate(true).unwrap();
    sim.set_breakpoint(y, true).unwrap();

    sim.set_input(stim, Some(Level::Low)).unwrap();
    assert_eq!(
        sim.evaluate(true).unwrap(),
        StepOutcome::Interrupted(StopReason::Breakpoint)
    );
    assert_eq!(sim.logic(y).unwrap(), Logic::One);

    assert_eq!(sim.evaluate(false).unwrap(), StepOutcome::Settled);
    assert_eq!(sim.resolve_voltage(y).unwrap(), Voltage::Normal1);
}

#[test]
fn test_cleared_breakpoint_does_not_stop() {
    let (mut sim, _, y, stim) = inverter();
    sim.set_breakpoint(y, true).unwrap();
    sim.set_breakpoint(y, false).unwrap();
    sim.set_input(stim, Some(Level::High)).unwrap();
    assert_eq!(sim.evaluate(true).unwrap(), StepOutcome::Settled);
    assert_eq!(sim.logic(y).unwrap(), Logic::Zero);
}

#[test]
fn test_user_interrupt_from_handle() {
    let (mut sim, a, y, stim) = inverter();
    sim.evaluate(true).unwrap();

    let handle = sim.interrupt_handle();
    sim.set_input(stim, Some(Level::High)).unwrap();
    handle.store(true, Ordering::SeqCst);
    assert_eq!(
        sim.evaluate(true).unwrap(),
        StepOutcome::Interrupted(StopReason::UserInterrupt)
    );
    // the flag is consumed by the stop
    assert!(!handle.load(Ordering::SeqCst));
    assert_eq!(sim.resolve_voltage(a).unwrap(), Voltage::Strong1);

    assert_eq!(sim.evaluate(false).unwrap(), StepOutcome::Settled);
    assert_eq!(sim.logic(y).unwrap(), Logic::Zero);
    assert_eq!(sim.stats().interrupted_steps, 1);
}

#[test]
fn test_illegal_node_is_fatal() {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let n = sim.make_element(root, "n").unwrap();
    let up = sim.add_input(root, "up", n).unwrap();
    let down = sim.add_input(root, "down", n).unwrap();
    sim.set_input(up, Some(Level::High)).unwrap();
    sim.set_input(down, Some(Level::Low)).unwrap();

    let err = sim.evaluate(true).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains('n'));
    assert!(sim.status().interrupted);
}

// ============================================================================
// State images
// ============================================================================

#[test]
fn test_state_image_moves_between_networks() {
    let (mut sim, _, _, stim) = inverter();
    sim.set_input(stim, Some(Level::Low)).unwrap();
    sim.evaluate(true).unwrap();
    let image = sim.save_state();

    let (mut copy, a, y, _) = inverter();
    copy.restore_state(&image).unwrap();
    assert_eq!(copy.resolve_voltage(a).unwrap(), Voltage::Strong0);
    assert_eq!(copy.resolve_voltage(y).unwrap(), Voltage::Normal1);

    // the copy's stimulus is released, so `a` keeps only its charge
    assert!(copy.evaluate(true).unwrap().is_settled());
    assert_eq!(copy.resolve_voltage(a).unwrap(), Voltage::Charged0);
    assert_eq!(copy.resolve_voltage(y).unwrap(), Voltage::Normal1);
}

#[test]
fn test_state_image_rejects_other_network() {
    let (mut sim, _, _, _) = inverter();
    let mut other = Simulation::default();
    let root = other.network().root();
    other.make_element(root, "lonely").unwrap();

    assert!(sim.restore_state(&other.save_state()).is_err());
}

// ============================================================================
// Queries and statistics
// ============================================================================

#[test]
fn test_paths_and_lookup() {
    let mut sim = Simulation::default();
    let root = sim.network().root();
    let cpu = sim.make_instance(root, "cpu", Device::Module).unwrap();
    let alu = sim.make_instance(cpu, "alu", Device::Module).unwrap();
    let carry = sim.make_element(alu, "carry").unwrap();

    assert_eq!(sim.element_path(carry), "cpu.alu.carry");
    assert_eq!(sim.find_element("cpu.alu.carry").unwrap(), carry);
    assert_eq!(sim.find_instance("cpu.alu").unwrap(), alu);
    assert_eq!(sim.voltage_at("cpu.alu.carry").unwrap(), Voltage::ChargedX);
    assert_eq!(sim.resolve_display_char(carry).unwrap(), '?');
    assert!(sim.find_element("cpu.fpu.carry").is_err());
    assert!(sim.make_element(alu, "carry").is_err());
}

#[test]
fn test_export_stats() {
    let (mut sim, _, _, stim) = inverter();
    sim.set_input(stim, Some(Level::High)).unwrap();
    sim.evaluate(true).unwrap();
    sim.set_input(stim, Some(Level::Low)).unwrap();
    sim.evaluate(true).unwrap();

    let json = sim.export_stats();
    assert_eq!(json["engine"]["steps"], 2);
    assert_eq!(json["network"]["nodes"], 2);
    assert_eq!(json["network"]["instances"], 2);

    let stats = sim.simulation_stats();
    assert_eq!(stats.engine.steps, 2);
    assert!(stats.engine.evaluations > 0);
    let csv = stats.to_csv();
    assert!(csv.contains("steps,2"));
    assert!(stats.summary().contains("--- Engine ---"));
}

#[test]
fn test_stats_collection_can_be_disabled() {
    let config = SimConfig::builder().collect_stats(false).build().unwrap();
    let mut sim = Simulation::new(config).unwrap();
    let root = sim.network().root();
    let a = sim.make_element(root, "a").unwrap();
    let stim = sim.add_input(root, "stim", a).unwrap();
    sim.set_input(stim, Some(Level::High)).unwrap();
    sim.evaluate(true).unwrap();

    assert_eq!(sim.stats().steps, 1);
    assert_eq!(sim.stats().evaluations, 0);
    assert_eq!(sim.stats().node_transitions, 0);
}

#[test]
fn test_probe_follows_inverter() {
    let (mut sim, _, y, stim) = inverter();
    let probe = sim.add_probe(y, "y").unwrap();
    for level in [Level::High, Level::Low, Level::Low, Level::High] {
        sim.set_input(stim, Some(level)).unwrap();
        sim.evaluate(true).unwrap();
    }
    let trace = sim.probe(probe).unwrap().trace();
    assert_eq!(trace, "?010");
}
