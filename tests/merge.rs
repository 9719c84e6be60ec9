//! Transistor merging against unmerged reference networks.

use switchsim::device::{Device, Mos, Polarity};
use switchsim::{ElementId, InstanceId, Level, Logic, Rail, SimConfig, SimError, Simulation};

fn nmos() -> Device {
    Device::Mos(Mos::new(Polarity::N, false))
}

fn pmos() -> Device {
    Device::Mos(Mos::new(Polarity::P, false))
}

/// A CMOS gate under test with its stimuli.
struct Cell {
    sim: Simulation,
    inputs: Vec<InstanceId>,
    out: ElementId,
}

impl Cell {
    fn apply(&mut self, bits: &[bool]) -> Logic {
        for (&stim, &bit) in self.inputs.iter().zip(bits) {
            self.sim.set_input(stim, Some(Level::from_bool(bit))).unwrap();
        }
        assert!(self.sim.evaluate(true).unwrap().is_settled());
        self.sim.logic(self.out).unwrap()
    }
}

fn rails(sim: &mut Simulation) -> (ElementId, ElementId) {
    let root = sim.network().root();
    let vdd = sim.make_element(root, "vdd").unwrap();
    let gnd = sim.make_element(root, "gnd").unwrap();
    sim.set_rail(vdd, Some(Rail::Supply)).unwrap();
    sim.set_rail(gnd, Some(Rail::Ground)).unwrap();
    (vdd, gnd)
}

fn stimuli(sim: &mut Simulation, names: &[&str]) -> (Vec<ElementId>, Vec<InstanceId>) {
    let root = sim.network().root();
    names
        .iter()
        .map(|name| {
            let el = sim.make_element(root, name).unwrap();
            let stim = sim.add_input(root, &format!("stim_{name}"), el).unwrap();
            (el, stim)
        })
        .unzip()
}

/// Two-input NAND: parallel pull-up, series pull-down through `m`.
fn nand(config: SimConfig) -> Cell {
    let mut sim = Simulation::new(config).unwrap();
    let (vdd, gnd) = rails(&mut sim);
    let (ins, inputs) = stimuli(&mut sim, &["a", "b"]);
    let root = sim.network().root();
    let y = sim.make_element(root, "y").unwrap();
    let m = sim.make_element(root, "m").unwrap();
    sim.add_device(root, "p1", pmos(), &[vdd, y, ins[0]]).unwrap();
    sim.add_device(root, "p2", pmos(), &[vdd, y, ins[1]]).unwrap();
    sim.add_device(root, "n1", nmos(), &[y, m, ins[0]]).unwrap();
    sim.add_device(root, "n2", nmos(), &[m, gnd, ins[1]]).unwrap();
    Cell { sim, inputs, out: y }
}

/// Three-input NOR: series pull-up, parallel pull-down.
fn nor3(config: SimConfig) -> Cell {
    let mut sim = Simulation::new(config).unwrap();
    let (vdd, gnd) = rails(&mut sim);
    let (ins, inputs) = stimuli(&mut sim, &["a", "b", "c"]);
    let root = sim.network().root();
    let y = sim.make_element(root, "y").unwrap();
    let u1 = sim.make_element(root, "u1").unwrap();
    let u2 = sim.make_element(root, "u2").unwrap();
    sim.add_device(root, "p1", pmos(), &[vdd, u1, ins[0]]).unwrap();
    sim.add_device(root, "p2", pmos(), &[u1, u2, ins[1]]).unwrap();
    sim.add_device(root, "p3", pmos(), &[u2, y, ins[2]]).unwrap();
    for (i, &gate) in ins.iter().enumerate() {
        sim.add_device(root, &format!("n{i}"), nmos(), &[y, gnd, gate]).unwrap();
    }
    Cell { sim, inputs, out: y }
}

fn all_inputs(width: usize) -> impl Iterator<Item = Vec<bool>> {
    (0..1u32 << width).map(move |v| (0..width).map(|bit| (v >> bit) & 1 == 1).collect())
}

#[test]
fn test_nand_merges_to_two_transistors() {
    let mut cell = nand(SimConfig::default());
    let stats = cell.sim.merge_transistors().unwrap();

    assert_eq!(stats.transistors_before, 4);
    assert_eq!(stats.transistors_after, 2);
    assert_eq!(stats.parallel_merges, 1);
    assert_eq!(stats.series_merges, 1);
    assert!(cell.sim.find_element("m").is_err());
    assert_eq!(cell.sim.merge_stats(), &stats);
}

#[test]
fn test_merged_nand_matches_reference() {
    let mut reference = nand(SimConfig::default());
    let mut merged = nand(SimConfig::default());
    merged.sim.merge_transistors().unwrap();

    for bits in all_inputs(2) {
        let expected = if bits.iter().all(|&b| b) {
            Logic::Zero
        } else {
            Logic::One
        };
        assert_eq!(reference.apply(&bits), expected, "{bits:?}");
        assert_eq!(merged.apply(&bits), expected, "{bits:?}");
    }
}

#[test]
fn test_merged_nor3_matches_reference() {
    let mut reference = nor3(SimConfig::default());
    let mut merged = nor3(SimConfig::default());
    let stats = merged.sim.merge_transistors().unwrap();
    assert!(stats.transistors_after < stats.transistors_before);

    for bits in all_inputs(3) {
        let expected = if bits.iter().any(|&b| b) {
            Logic::Zero
        } else {
            Logic::One
        };
        assert_eq!(reference.apply(&bits), expected, "{bits:?}");
        assert_eq!(merged.apply(&bits), expected, "{bits:?}");
    }
}

#[test]
fn test_unknown_input_gives_unknown_output() {
    let mut merged = nand(SimConfig::default());
    merged.sim.merge_transistors().unwrap();
    merged.apply(&[true, true]);
    merged.sim.set_input(merged.inputs[0], Some(Level::Unknown)).unwrap();
    merged.sim.evaluate(true).unwrap();
    assert_eq!(merged.sim.logic(merged.out).unwrap(), Logic::X);

    // a low input decides the output regardless of the other
    merged.sim.set_input(merged.inputs[1], Some(Level::Low)).unwrap();
    merged.sim.evaluate(true).unwrap();
    assert_eq!(merged.sim.logic(merged.out).unwrap(), Logic::One);
}

#[test]
fn test_merge_disabled_keeps_network() {
    let config = SimConfig::builder().merge(false).build().unwrap();
    let mut cell = nand(config);
    let nodes = cell.sim.network().node_count();
    let stats = cell.sim.merge_transistors().unwrap();

    assert_eq!(stats.transistors_before, 4);
    assert_eq!(stats.transistors_after, 4);
    assert_eq!(cell.sim.network().node_count(), nodes);
    assert_eq!(cell.apply(&[true, true]), Logic::Zero);
}

#[test]
fn test_merge_refused_after_start() {
    let mut cell = nand(SimConfig::default());
    cell.apply(&[false, false]);
    assert!(matches!(
        cell.sim.merge_transistors(),
        Err(SimError::AlreadyStarted)
    ));
}
