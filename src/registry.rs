//! Device factory registry for netlist-driven construction.
//!
//! The registry maps device type names to factories that build a
//! [`Device`] from string attributes, so netlist readers can create
//! devices without knowing every kind up front.
//!
//! # Example
//!
//! ```
//! use switchsim::registry::create_default_registry;
//! use std::collections::HashMap;
//!
//! let registry = create_default_registry();
//! let mut attrs = HashMap::new();
//! attrs.insert("expr".to_string(), "!(a & b)".to_string());
//!
//! let nand = registry.create("gate", &attrs).unwrap();
//! assert_eq!(nand.terminal_count(), 3);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{
    Device, Expr, Gate, Input, Latch, LatchMode, LatchRole, Mos, Polarity, Pull, PullSense, Ram,
    RoleSpec, Tristate,
};
use crate::engine::Simulation;
use crate::error::{Result, SimError};
use crate::strength::{DRIVE, RAIL, WEAK, WEAK_MAX};
use crate::types::{ElementId, InstanceId, Strength};

/// Device attributes as read from a netlist.
pub type Attrs = HashMap<String, String>;

/// Type alias for device factory functions.
pub type DeviceFactory = Arc<dyn Fn(&Attrs) -> Result<Device> + Send + Sync>;

/// A registry for device factories.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device factory with the given name, replacing any
    /// earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Attrs) -> Result<Device> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builds a device by type name.
    pub fn create(&self, type_name: &str, attrs: &Attrs) -> Result<Device> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| SimError::UnknownDevice(type_name.to_string()))?;
        factory(attrs)
    }

    /// Builds a device and adds it to `sim` under `parent`, wired to
    /// `terminals` in order.
    pub fn instantiate(
        &self,
        sim: &mut Simulation,
        parent: InstanceId,
        name: &str,
        type_name: &str,
        attrs: &Attrs,
        terminals: &[ElementId],
    ) -> Result<InstanceId> {
        let device = self.create(type_name, attrs)?;
        sim.add_device(parent, name, device, terminals)
    }

    /// Returns true if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Returns an iterator over registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Unregisters a device type.
    pub fn unregister(&mut self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("registered_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn strength(attrs: &Attrs, default: Strength, max: Strength) -> Result<Strength> {
    let Some(text) = attrs.get("strength") else {
        return Ok(default);
    };
    match text.trim().parse::<Strength>() {
        Ok(s) if s <= max => Ok(s),
        _ => Err(SimError::bad_attr(
            "strength",
            format!("expected an integer in 0..={max}, got {text:?}"),
        )),
    }
}

fn count(attrs: &Attrs, name: &str) -> Result<Option<usize>> {
    attrs
        .get(name)
        .map(|text| {
            text.trim()
                .parse()
                .map_err(|_| SimError::bad_attr(name, format!("not a count: {text:?}")))
        })
        .transpose()
}

/// Reads an active level, `high` or `low`.
fn active_high(attrs: &Attrs, name: &str) -> Result<bool> {
    match attrs.get(name).map(|s| s.trim()) {
        None | Some("high") => Ok(true),
        Some("low") => Ok(false),
        Some(other) => Err(SimError::bad_attr(
            name,
            format!("expected high or low, got {other:?}"),
        )),
    }
}

fn invert_list(attrs: &Attrs) -> Result<Vec<bool>> {
    let Some(text) = attrs.get("invert") else {
        return Ok(Vec::new());
    };
    text.split(',')
        .map(|item| match item.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(SimError::bad_attr(
                "invert",
                format!("expected a boolean, got {other:?}"),
            )),
        })
        .collect()
}

fn pull_sense(attrs: &Attrs) -> Result<PullSense> {
    match attrs.get("sense").map(|s| s.trim()) {
        None | Some("always") => Ok(PullSense::Always),
        Some("high") => Ok(PullSense::ActiveHigh),
        Some("low") => Ok(PullSense::ActiveLow),
        Some(other) => Err(SimError::bad_attr(
            "sense",
            format!("expected always, high or low, got {other:?}"),
        )),
    }
}

/// Parses a role list such as `q,qbar,!reset,set*,clk,d`.
///
/// A leading `!` makes the terminal active low, a trailing `*` makes
/// set/reset synchronous.
fn latch_roles(text: &str) -> Result<Vec<RoleSpec>> {
    text.split(',')
        .map(|item| {
            let mut token = item.trim();
            let low = token.starts_with('!');
            if low {
                token = &token[1..];
            }
            let sync = token.ends_with('*');
            if sync {
                token = &token[..token.len() - 1];
            }
            let role = LatchRole::parse(token)
                .ok_or_else(|| SimError::bad_attr("roles", format!("unknown role {token:?}")))?;
            let mut spec = RoleSpec::new(role);
            if low {
                spec = spec.active_low();
            }
            if sync {
                spec = spec.synchronous();
            }
            Ok(spec)
        })
        .collect()
}

fn latch(attrs: &Attrs) -> Result<Device> {
    let strength = strength(attrs, DRIVE, WEAK_MAX)?;
    let mode = match attrs.get("mode").map(|s| s.trim()) {
        None | Some("transparent") => LatchMode::Transparent,
        Some("master_slave") => LatchMode::MasterSlave,
        Some(other) => {
            return Err(SimError::bad_attr(
                "mode",
                format!("expected transparent or master_slave, got {other:?}"),
            ))
        }
    };
    let latch = match attrs.get("roles") {
        Some(text) => Latch::new(latch_roles(text)?, mode, strength)?,
        None if mode == LatchMode::Transparent => Latch::d_latch(strength),
        None => return Err(SimError::bad_attr("roles", "required for master_slave")),
    };
    Ok(Device::Latch(latch))
}

fn ram(attrs: &Attrs) -> Result<Device> {
    let addr_bits = count(attrs, "addr_bits")?.ok_or(SimError::RamNoAddress)?;
    let word_bits = count(attrs, "word_bits")?.unwrap_or(1);
    let words = count(attrs, "words")?;
    let strength = strength(attrs, DRIVE, WEAK_MAX)?;
    let ram = Ram::new(addr_bits, word_bits, words, strength)?
        .with_polarity(active_high(attrs, "read")?, active_high(attrs, "write")?);
    Ok(Device::Ram(ram))
}

/// Creates a registry holding every built-in device kind.
///
/// Includes:
/// - `nmos`, `pmos`, `nmos_weak`, `pmos_weak` - single-gate transistors
/// - `nmos_on` - gateless depletion load
/// - `pullup`, `pulldown` - unidirectional pulls (`strength`, `sense`)
/// - `gate` - expression gate (`expr`, `strength`)
/// - `latch` - latches and flip-flops (`roles`, `mode`, `strength`)
/// - `tristate`, `passgate` - enabled buffers (`control`, `invert`)
/// - `ram` - memory (`addr_bits`, `word_bits`, `words`, `read`, `write`)
/// - `input` - testbench stimulus (`strength`)
pub fn create_default_registry() -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();

    registry.register("nmos", |_| Ok(Device::Mos(Mos::new(Polarity::N, false))));
    registry.register("pmos", |_| Ok(Device::Mos(Mos::new(Polarity::P, false))));
    registry.register("nmos_weak", |_| Ok(Device::Mos(Mos::new(Polarity::N, true))));
    registry.register("pmos_weak", |_| Ok(Device::Mos(Mos::new(Polarity::P, true))));
    registry.register("nmos_on", |attrs| {
        let weak = attrs.get("weak").is_some_and(|w| w == "true");
        Ok(Device::Mos(Mos::always_on(Polarity::N, weak)))
    });

    registry.register("pullup", |attrs| {
        Ok(Device::Pull(Pull::up(strength(attrs, WEAK, WEAK_MAX)?, pull_sense(attrs)?)))
    });
    registry.register("pulldown", |attrs| {
        Ok(Device::Pull(Pull::down(strength(attrs, WEAK, WEAK_MAX)?, pull_sense(attrs)?)))
    });

    registry.register("gate", |attrs| {
        let text = attrs
            .get("expr")
            .ok_or_else(|| SimError::bad_attr("expr", "required"))?;
        let expr = Expr::parse(text)?;
        Ok(Device::Gate(Gate::new(expr, strength(attrs, DRIVE, WEAK_MAX)?)?))
    });

    registry.register("latch", latch);

    registry.register("tristate", |attrs| {
        Ok(Device::Tristate(Tristate::buffer(
            active_high(attrs, "control")?,
            &invert_list(attrs)?,
            strength(attrs, DRIVE, WEAK_MAX)?,
        )))
    });
    registry.register("passgate", |attrs| {
        Ok(Device::Tristate(Tristate::pass_gate(
            active_high(attrs, "control")?,
            &invert_list(attrs)?,
        )))
    });

    registry.register("ram", ram);

    registry.register("input", |attrs| {
        Ok(Device::Input(Input::new(strength(attrs, RAIL, WEAK_MAX)?)))
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::{Level, Voltage};

    fn attrs(pairs: &[(&str, &str)]) -> Attrs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        registry.register("inv", |_| Ok(Device::Gate(Gate::inverter(DRIVE))));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("inv"));
        assert!(registry.unregister("inv"));
        assert!(!registry.unregister("inv"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.create("bjt", &Attrs::new()),
            Err(SimError::UnknownDevice(name)) if name == "bjt"
        ));
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        for name in [
            "nmos", "pmos", "nmos_weak", "pmos_weak", "nmos_on", "pullup", "pulldown", "gate",
            "latch", "tristate", "passgate", "ram", "input",
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert_eq!(registry.len(), 13);
    }

    #[test]
    fn test_bad_attributes() {
        let registry = create_default_registry();
        let cases = [
            ("gate", attrs(&[])),
            ("gate", attrs(&[("expr", "a &")])),
            ("pullup", attrs(&[("strength", "254")])),
            ("pullup", attrs(&[("sense", "sideways")])),
            ("tristate", attrs(&[("invert", "maybe")])),
            ("latch", attrs(&[("roles", "q,frob")])),
            ("latch", attrs(&[("mode", "master_slave")])),
            ("latch", attrs(&[("roles", "q,d,clk,d")])),
            ("latch", attrs(&[("roles", "clk,d")])),
            ("latch", attrs(&[("roles", "q,qb,clk,clkbar,set,reset,d,q")])),
        ];
        for (name, a) in cases {
            assert!(
                matches!(registry.create(name, &a), Err(SimError::BadAttribute { .. })),
                "{name} {a:?}"
            );
        }
        assert!(matches!(
            registry.create("ram", &attrs(&[("addr_bits", "2"), ("word_bits", "40")])),
            Err(SimError::RamWordWidth(40))
        ));
        assert!(matches!(
            registry.create("ram", &attrs(&[])),
            Err(SimError::RamNoAddress)
        ));
    }

    #[test]
    fn test_latch_roles() {
        let roles = latch_roles("q, qbar, !reset*, clk, d").unwrap();
        assert_eq!(roles.len(), 5);
        assert_eq!(roles[2].role, LatchRole::Reset);
        assert!(!roles[2].active_high);
        assert!(roles[2].synchronous);
        assert!(roles[3].active_high);
    }

    #[test]
    fn test_instantiate_gate() {
        let registry = create_default_registry();
        let mut sim = Simulation::default();
        let root = sim.network().root();
        let y = sim.make_element(root, "y").unwrap();
        let a = sim.make_element(root, "a").unwrap();
        let b = sim.make_element(root, "b").unwrap();
        let ia = registry
            .instantiate(&mut sim, root, "ia", "input", &Attrs::new(), &[a])
            .unwrap();
        let ib = registry
            .instantiate(&mut sim, root, "ib", "input", &Attrs::new(), &[b])
            .unwrap();
        registry
            .instantiate(&mut sim, root, "nand", "gate", &attrs(&[("expr", "!(a & b)")]), &[y, a, b])
            .unwrap();

        sim.set_input(ia, Some(Level::High)).unwrap();
        sim.set_input(ib, Some(Level::High)).unwrap();
        sim.evaluate(true).unwrap();
        assert_eq!(sim.resolve_voltage(y).unwrap(), Voltage::Normal0);

        sim.set_input(ib, Some(Level::Low)).unwrap();
        sim.evaluate(true).unwrap();
        assert_eq!(sim.resolve_voltage(y).unwrap(), Voltage::Normal1);
    }
}
