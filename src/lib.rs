//! # switchsim
//!
//! A zero-delay switch-level and logic-level simulator for digital
//! circuits built from MOS transistors and higher-level devices.
//!
//! ## Design Principles
//!
//! - **Strength-Based Resolution**: Every node carries the strongest pull
//!   toward 1 and toward 0; a fixed table turns the pair into one of twelve
//!   voltages.
//! - **Zero Delay**: Changes propagate through prioritized queues until the
//!   network settles. Time only advances between steps.
//! - **Transistor Stages**: Conducting transistors group nodes into stages
//!   that are solved together by strongest-path propagation.
//! - **Charge Retention**: An undriven node keeps a charged version of its
//!   last value.
//!
//! ## Quick Start
//!
//! ```rust
//! use switchsim::{Level, Simulation, Voltage};
//! use switchsim::device::{Device, Gate};
//!
//! let mut sim = Simulation::default();
//! let root = sim.network().root();
//! let a = sim.make_element(root, "a")?;
//! let y = sim.make_element(root, "y")?;
//! let stim = sim.add_input(root, "stim", a)?;
//! sim.add_device(root, "inv", Device::Gate(Gate::inverter(1)), &[y, a])?;
//!
//! sim.set_input(stim, Some(Level::High))?;
//! assert!(sim.evaluate(true)?.is_settled());
//! assert_eq!(sim.resolve_voltage(y)?, Voltage::Normal0);
//! # Ok::<(), switchsim::SimError>(())
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use switchsim::{SimConfig, Simulation};
//!
//! let config = SimConfig::from_file("sim.yaml")?;
//! switchsim::init_logging_from(&config);
//! let mut sim = Simulation::new(config)?;
//! ```

pub mod types;
pub mod error;
pub mod arena;
pub mod strength;
pub mod shape;
pub mod network;
pub mod scheduler;
pub mod engine;
pub mod stage;
pub mod device;
pub mod merge;
pub mod state;
pub mod probe;
pub mod config;
pub mod registry;
pub mod stats;

// Re-export commonly used types
pub use types::{ConnRef, ElementId, InstanceId, NodeId, ProbeId, Rail, StepCount, Strength};
pub use error::{Result, SimError};
pub use strength::{Level, Logic, Voltage};
pub use network::{Network, TermKind};
pub use scheduler::{Status, StepOutcome, StopReason};
pub use engine::{EngineStats, Simulation};
pub use device::Device;
pub use probe::{Probe, Sample};
pub use state::STATE_HEADER;
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use registry::{create_default_registry, DeviceRegistry};
pub use stats::{MergeStats, NetworkStats, SimulationStats, StatsCollector, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// switchsim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Initialize logging at the level named by `simulation.log_level`.
pub fn init_logging_from(config: &SimConfig) {
    init_logging(&config.simulation.log_level);
}
