//! Device behavior inside full networks, built through the registry.

use std::collections::HashMap;

use switchsim::registry::{create_default_registry, Attrs, DeviceRegistry};
use switchsim::strength::{CHARGED, DRIVE, NONE, RAIL};
use switchsim::{ElementId, InstanceId, Level, Logic, Rail, Simulation, Voltage};

struct Bench {
    sim: Simulation,
    registry: DeviceRegistry,
}

impl Bench {
    fn new() -> Self {
        Self {
            sim: Simulation::default(),
            registry: create_default_registry(),
        }
    }

    fn element(&mut self, name: &str) -> ElementId {
        let root = self.sim.network().root();
        self.sim.make_element(root, name).unwrap()
    }

    fn input(&mut self, name: &str) -> (ElementId, InstanceId) {
        let el = self.element(name);
        let root = self.sim.network().root();
        let stim = self.sim.add_input(root, &format!("stim_{name}"), el).unwrap();
        (el, stim)
    }

    fn device(&mut self, name: &str, kind: &str, attrs: &[(&str, &str)], terms: &[ElementId]) -> InstanceId {
        let attrs: Attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let root = self.sim.network().root();
        self.registry
            .instantiate(&mut self.sim, root, name, kind, &attrs, terms)
            .unwrap()
    }

    fn set(&mut self, stim: InstanceId, level: Level) {
        self.sim.set_input(stim, Some(level)).unwrap();
    }

    fn settle(&mut self) {
        assert!(self.sim.evaluate(true).unwrap().is_settled());
    }

    fn logic(&self, el: ElementId) -> Logic {
        self.sim.logic(el).unwrap()
    }
}

// ============================================================================
// Latches
// ============================================================================

#[test]
fn test_d_latch_holds_when_closed() {
    let mut b = Bench::new();
    let q = b.element("q");
    let qb = b.element("qb");
    let (clk, clk_in) = b.input("clk");
    let (d, d_in) = b.input("d");
    b.device("l", "latch", &[], &[q, qb, clk, d]);

    b.set(clk_in, Level::High);
    b.set(d_in, Level::High);
    b.settle();
    assert_eq!(b.logic(q), Logic::One);
    assert_eq!(b.logic(qb), Logic::Zero);

    b.set(clk_in, Level::Low);
    b.settle();
    b.set(d_in, Level::Low);
    b.settle();
    assert_eq!(b.logic(q), Logic::One);

    b.set(clk_in, Level::High);
    b.settle();
    assert_eq!(b.logic(q), Logic::Zero);
    assert_eq!(b.logic(qb), Logic::One);
}

#[test]
fn test_latch_reset_overrides_data() {
    let mut b = Bench::new();
    let q = b.element("q");
    let (rst, rst_in) = b.input("rst");
    let (clk, clk_in) = b.input("clk");
    let (d, d_in) = b.input("d");
    b.device("l", "latch", &[("roles", "q,reset,clk,d")], &[q, rst, clk, d]);

    b.set(rst_in, Level::Low);
    b.set(clk_in, Level::High);
    b.set(d_in, Level::High);
    b.settle();
    assert_eq!(b.logic(q), Logic::One);

    b.set(rst_in, Level::High);
    b.settle();
    assert_eq!(b.logic(q), Logic::Zero);
}

#[test]
fn test_master_slave_output_follows_falling_clock() {
    let mut b = Bench::new();
    let q = b.element("q");
    let (clk, clk_in) = b.input("clk");
    let (d, d_in) = b.input("d");
    b.device("ff", "latch", &[("roles", "q,clk,d"), ("mode", "master_slave")], &[q, clk, d]);

    b.set(clk_in, Level::Low);
    b.set(d_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::NormalX);

    // captured, not yet visible
    b.set(clk_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::NormalX);

    b.set(clk_in, Level::Low);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::Normal1);

    // data changes while clk is low do not pass
    b.set(d_in, Level::Low);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::Normal1);
}

#[test]
fn test_synchronous_reset_waits_for_clock() {
    let mut b = Bench::new();
    let q = b.element("q");
    let (rst, rst_in) = b.input("rst");
    let (clk, clk_in) = b.input("clk");
    let (d, d_in) = b.input("d");
    b.device("l", "latch", &[("roles", "q,reset*,clk,d")], &[q, rst, clk, d]);

    b.set(rst_in, Level::Low);
    b.set(clk_in, Level::High);
    b.set(d_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::Normal1);

    b.set(clk_in, Level::Low);
    b.settle();
    b.set(rst_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::Normal1);

    b.set(clk_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(q).unwrap(), Voltage::Normal0);
}

#[test]
fn test_registry_rejects_bad_latch_roles() {
    let mut b = Bench::new();
    let root = b.sim.network().root();
    let nets: Vec<_> = (0..8).map(|i| b.element(&format!("n{i}"))).collect();
    for roles in ["q,clk,clk,d", "clk,d,reset", "q,qbar,clk,set,reset,d,clkbar,q"] {
        let attrs: Attrs = [("roles".to_string(), roles.to_string())].into();
        let count = roles.split(',').count();
        let err = b
            .registry
            .instantiate(&mut b.sim, root, "l", "latch", &attrs, &nets[..count])
            .unwrap_err();
        assert!(err.to_string().contains("roles"), "{roles}: {err}");
    }
}

// ============================================================================
// Memory
// ============================================================================

struct Memory {
    bench: Bench,
    read: InstanceId,
    write: InstanceId,
    addr: InstanceId,
    din: [InstanceId; 2],
    dout: [ElementId; 2],
    ram: InstanceId,
}

fn memory() -> Memory {
    memory_with(&[])
}

fn memory_with(extra: &[(&str, &str)]) -> Memory {
    let mut b = Bench::new();
    let (re, read) = b.input("re");
    let (we, write) = b.input("we");
    let (a0, addr) = b.input("a0");
    let (d0, din0) = b.input("d0");
    let (d1, din1) = b.input("d1");
    let q0 = b.element("q0");
    let q1 = b.element("q1");
    let mut attrs = vec![("addr_bits", "1"), ("word_bits", "2")];
    attrs.extend_from_slice(extra);
    let ram = b.device("mem", "ram", &attrs, &[re, we, a0, d0, d1, q0, q1]);
    Memory {
        bench: b,
        read,
        write,
        addr,
        din: [din0, din1],
        dout: [q0, q1],
        ram,
    }
}

impl Memory {
    fn write_word(&mut self, addr: bool, word: [bool; 2]) {
        let b = &mut self.bench;
        b.set(self.read, Level::Low);
        b.set(self.addr, Level::from_bool(addr));
        b.set(self.din[0], Level::from_bool(word[0]));
        b.set(self.din[1], Level::from_bool(word[1]));
        b.set(self.write, Level::High);
        b.settle();
        b.set(self.write, Level::Low);
        b.settle();
    }

    fn read_word(&mut self, addr: bool) -> [Logic; 2] {
        let b = &mut self.bench;
        b.set(self.addr, Level::from_bool(addr));
        b.set(self.read, Level::High);
        b.settle();
        let word = [b.logic(self.dout[0]), b.logic(self.dout[1])];
        b.set(self.read, Level::Low);
        b.settle();
        word
    }

    fn warnings(&self) -> u64 {
        self.bench.sim.stats().warnings
    }

    fn describe(&self) -> String {
        self.bench.sim.device(self.ram).unwrap().describe()
    }
}

#[test]
fn test_ram_write_then_read() {
    let mut m = memory();
    m.write_word(true, [true, false]);
    m.write_word(false, [false, true]);

    assert_eq!(m.read_word(true), [Logic::One, Logic::Zero]);
    assert_eq!(m.read_word(false), [Logic::Zero, Logic::One]);
    let ram = m.bench.sim.device(m.ram).unwrap();
    assert!(ram.describe().contains("writes 2"));
}

#[test]
fn test_ram_outputs_release_when_not_reading() {
    let mut m = memory();
    m.write_word(false, [true, true]);
    m.read_word(false);

    // released outputs keep their charge
    assert_eq!(
        m.bench.sim.resolve_voltage(m.dout[0]).unwrap(),
        Voltage::Charged1
    );
}

#[test]
fn test_ram_uninitialized_read_warns() {
    let mut m = memory();
    m.bench.set(m.write, Level::Low);
    let before = m.bench.sim.stats().warnings;
    assert_eq!(m.read_word(true), [Logic::Zero, Logic::Zero]);
    assert!(m.bench.sim.stats().warnings > before);
}

#[test]
fn test_ram_out_of_range_access_is_skipped() {
    let mut m = memory_with(&[("words", "1")]);
    m.write_word(false, [true, false]);
    let before = m.warnings();

    m.write_word(true, [false, true]);
    assert!(m.warnings() > before);
    assert!(m.describe().contains("writes 1"), "{}", m.describe());

    let before = m.warnings();
    m.read_word(true);
    assert!(m.warnings() > before);
    assert!(m.describe().contains("reads 0"), "{}", m.describe());

    // the in-range word was not disturbed
    assert_eq!(m.read_word(false), [Logic::One, Logic::Zero]);
}

#[test]
fn test_ram_unknown_address_is_skipped() {
    let mut m = memory();
    m.write_word(false, [true, true]);
    let b = &mut m.bench;
    b.set(m.addr, Level::Unknown);
    b.set(m.read, Level::Low);
    b.settle();
    b.set(m.din[0], Level::Low);
    b.set(m.din[1], Level::Low);
    let before = b.sim.stats().warnings;
    b.set(m.write, Level::High);
    b.settle();
    b.set(m.write, Level::Low);
    b.set(m.read, Level::High);
    b.settle();
    assert!(m.bench.sim.stats().warnings >= before + 2);
    let desc = m.describe();
    assert!(desc.contains("writes 1") && desc.contains("reads 0"), "{desc}");

    assert_eq!(m.read_word(false), [Logic::One, Logic::One]);
}

#[test]
fn test_ram_read_and_write_together_warns() {
    let mut m = memory();
    let b = &mut m.bench;
    b.set(m.read, Level::Low);
    b.set(m.write, Level::Low);
    b.set(m.addr, Level::High);
    b.set(m.din[0], Level::Low);
    b.set(m.din[1], Level::High);
    b.settle();
    let before = b.sim.stats().warnings;

    b.set(m.read, Level::High);
    b.set(m.write, Level::High);
    b.settle();
    assert!(m.warnings() > before);
    // the write lands first, so the read sees the new word
    assert_eq!(m.bench.logic(m.dout[0]), Logic::Zero);
    assert_eq!(m.bench.logic(m.dout[1]), Logic::One);
    let desc = m.describe();
    assert!(desc.contains("writes 1"), "{desc}");
}

#[test]
fn test_restart_clears_ram() {
    let mut m = memory();
    m.write_word(true, [true, true]);
    m.bench.sim.restart();
    m.bench.settle();

    let before = m.bench.sim.stats().warnings;
    assert_eq!(m.read_word(true), [Logic::Zero, Logic::Zero]);
    assert!(m.bench.sim.stats().warnings > before);
}

#[test]
fn test_ram_four_bit_words() {
    let mut b = Bench::new();
    let (re, re_in) = b.input("re");
    let (we, we_in) = b.input("we");
    let (addr, addr_in): (Vec<_>, Vec<_>) = (0..2).map(|i| b.input(&format!("a{i}"))).unzip();
    let (din, din_in): (Vec<_>, Vec<_>) = (0..4).map(|i| b.input(&format!("d{i}"))).unzip();
    let dout: Vec<_> = (0..4).map(|i| b.element(&format!("q{i}"))).collect();
    let terms: Vec<_> = [re, we]
        .into_iter()
        .chain(addr)
        .chain(din)
        .chain(dout.iter().copied())
        .collect();
    let ram = b.device("mem", "ram", &[("addr_bits", "2"), ("word_bits", "4")], &terms);

    // address 0b01, data 0b1010, least significant bit first
    b.set(re_in, Level::Low);
    b.set(addr_in[0], Level::High);
    b.set(addr_in[1], Level::Low);
    for (bit, &stim) in din_in.iter().enumerate() {
        b.set(stim, Level::from_bool((0b1010 >> bit) & 1 == 1));
    }
    b.set(we_in, Level::High);
    b.settle();
    b.set(we_in, Level::Low);
    b.settle();

    // scramble the data lines so a stray write would show
    for &stim in &din_in {
        b.set(stim, Level::High);
    }
    b.set(re_in, Level::High);
    b.settle();
    let word: Vec<_> = dout.iter().map(|&q| b.logic(q)).collect();
    assert_eq!(word, [Logic::Zero, Logic::One, Logic::Zero, Logic::One]);

    let desc = b.sim.device(ram).unwrap().describe();
    assert!(desc.contains("writes 1"), "{desc}");
    assert!(desc.contains("reads 1"), "{desc}");
}

// ============================================================================
// Buses, pulls and pass gates
// ============================================================================

#[test]
fn test_tristate_bus_with_pullup() {
    let mut b = Bench::new();
    let bus = b.element("bus");
    let (en0, en0_in) = b.input("en0");
    let (en1, en1_in) = b.input("en1");
    let (d0, d0_in) = b.input("d0");
    let (d1, d1_in) = b.input("d1");
    b.device("t0", "tristate", &[], &[en0, d0, bus]);
    b.device("t1", "tristate", &[], &[en1, d1, bus]);
    b.device("pu", "pullup", &[], &[bus]);

    b.set(en0_in, Level::Low);
    b.set(en1_in, Level::Low);
    b.set(d0_in, Level::Low);
    b.set(d1_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(bus).unwrap(), Voltage::Weak1);

    b.set(en0_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(bus).unwrap(), Voltage::Normal0);

    // two drivers fight
    b.set(en1_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(bus).unwrap(), Voltage::NormalX);

    b.set(en0_in, Level::Low);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(bus).unwrap(), Voltage::Normal1);
}

#[test]
fn test_inverting_tristate_active_low() {
    let mut b = Bench::new();
    let out = b.element("out");
    let (en, en_in) = b.input("en");
    let (d, d_in) = b.input("d");
    b.device("t", "tristate", &[("control", "low"), ("invert", "true")], &[en, d, out]);

    b.set(en_in, Level::Low);
    b.set(d_in, Level::High);
    b.settle();
    assert_eq!(b.logic(out), Logic::Zero);

    b.set(en_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(out).unwrap(), Voltage::Charged0);
}

#[test]
fn test_back_to_back_pass_gates_decay() {
    let mut b = Bench::new();
    let (en, en_in) = b.input("en");
    let (a, a_in) = b.input("a");
    let bb = b.element("b");
    b.device("p1", "passgate", &[], &[en, a, bb]);
    b.device("p2", "passgate", &[], &[en, bb, a]);

    let strengths = |b: &Bench, el: ElementId| {
        let net = b.sim.network();
        net.node(net.node_of(el).unwrap()).unwrap().strengths()
    };

    b.set(en_in, Level::High);
    b.set(a_in, Level::High);
    b.settle();
    assert_eq!(strengths(&b, a), (RAIL, NONE));
    assert_eq!(strengths(&b, bb), (DRIVE, NONE));
    assert_eq!(b.sim.resolve_voltage(a).unwrap(), Voltage::Strong1);
    assert_eq!(b.sim.resolve_voltage(bb).unwrap(), Voltage::Normal1);

    // with the source gone the ring only holds charge
    b.sim.set_input(a_in, None).unwrap();
    b.settle();
    assert_eq!(strengths(&b, a), (CHARGED, NONE));
    assert_eq!(strengths(&b, bb), (CHARGED, NONE));
    assert_eq!(b.sim.resolve_voltage(a).unwrap(), Voltage::Charged1);
    assert_eq!(b.sim.resolve_voltage(bb).unwrap(), Voltage::Charged1);
}

#[test]
fn test_transistor_inverter_with_depletion_load() {
    let mut b = Bench::new();
    let vdd = b.element("vdd");
    let gnd = b.element("gnd");
    b.sim.set_rail(vdd, Some(Rail::Supply)).unwrap();
    b.sim.set_rail(gnd, Some(Rail::Ground)).unwrap();
    let (a, a_in) = b.input("a");
    let y = b.element("y");
    b.device("load", "nmos_on", &[("weak", "true")], &[vdd, y]);
    b.device("pd", "nmos", &[], &[y, gnd, a]);

    b.set(a_in, Level::Low);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(y).unwrap(), Voltage::Weak1);

    b.set(a_in, Level::High);
    b.settle();
    assert_eq!(b.sim.resolve_voltage(y).unwrap(), Voltage::Normal0);
}

#[test]
fn test_gate_expression_from_registry() {
    let mut b = Bench::new();
    let y = b.element("y");
    let (a, a_in) = b.input("a");
    let (bb, b_in) = b.input("b");
    let (c, c_in) = b.input("c");
    b.device("g", "gate", &[("expr", "a & !(b | c)")], &[y, a, bb, c]);

    let cases = [
        ([true, false, false], Logic::One),
        ([true, true, false], Logic::Zero),
        ([true, false, true], Logic::Zero),
        ([false, false, false], Logic::Zero),
    ];
    for (bits, expected) in cases {
        b.set(a_in, Level::from_bool(bits[0]));
        b.set(b_in, Level::from_bool(bits[1]));
        b.set(c_in, Level::from_bool(bits[2]));
        b.settle();
        assert_eq!(b.logic(y), expected, "{bits:?}");
    }

    let desc = b.sim.describe_instance(b.sim.find_instance("g").unwrap()).unwrap();
    assert!(desc.starts_with("g: gate"));
}

#[test]
fn test_registry_rejects_unknown_kind() {
    let mut b = Bench::new();
    let root = b.sim.network().root();
    let x = b.element("x");
    let err = b
        .registry
        .instantiate(&mut b.sim, root, "q", "bjt", &HashMap::new(), &[x])
        .unwrap_err();
    assert!(err.to_string().contains("bjt"));
    assert!(b.sim.find_instance("q").is_err());
}
