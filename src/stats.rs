//! Statistics collection and export.
//!
//! This module gathers engine, merge and network counters into one
//! [`SimulationStats`] and exports it as JSON, CSV or a readable summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::engine::{EngineStats, Simulation};

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Simulation metadata
    pub metadata: SimulationMetadata,

    /// Scheduler counters
    pub engine: EngineStats,

    /// Transistor merging results
    pub merge: MergeStats,

    /// Network size
    pub network: NetworkStats,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,
}

/// Results of transistor merging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Transistors before merging
    pub transistors_before: usize,

    /// Transistors left afterwards
    pub transistors_after: usize,

    pub parallel_merges: usize,

    pub series_merges: usize,

    /// Attempts the shape table had no entry for
    pub lookup_failures: usize,

    /// Nodes removed by series merges
    pub nodes_removed: usize,

    /// Elements released with those nodes
    pub elements_removed: usize,

    /// Nodes found to be important
    pub important_nodes: usize,
}

impl MergeStats {
    /// Adds the counts of another pass.
    pub fn accumulate(&mut self, other: &MergeStats) {
        if self.transistors_before == 0 {
            self.transistors_before = other.transistors_before;
        }
        self.transistors_after = other.transistors_after;
        self.parallel_merges += other.parallel_merges;
        self.series_merges += other.series_merges;
        self.lookup_failures += other.lookup_failures;
        self.nodes_removed += other.nodes_removed;
        self.elements_removed += other.elements_removed;
        self.important_nodes = other.important_nodes;
    }

    /// Instances freed by merging.
    pub fn instances_removed(&self) -> usize {
        self.parallel_merges + self.series_merges
    }
}

/// Live sizes of the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Device and module instances, root excluded
    pub instances: usize,
    pub nodes: usize,
    pub elements: usize,
    /// Allocated connection slots
    pub connections: usize,
    /// Arena blocks across the three record arenas
    pub arena_blocks: usize,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Steps completed per wall-clock second
    pub steps_per_second: f64,

    /// Device evaluations per second
    pub evaluations_per_second: f64,

    /// Node transitions per second
    pub transitions_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(chrono_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(chrono_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.steps_per_second = self.engine.steps as f64 / seconds;
            self.timing.evaluations_per_second = self.engine.evaluations as f64 / seconds;
            self.timing.transitions_per_second = self.engine.node_transitions as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str("metric,value\n");

        let e = &self.engine;
        csv.push_str(&format!("steps,{}\n", e.steps));
        csv.push_str(&format!("interrupted_steps,{}\n", e.interrupted_steps));
        csv.push_str(&format!("aborted_steps,{}\n", e.aborted_steps));
        csv.push_str(&format!("evaluations,{}\n", e.evaluations));
        csv.push_str(&format!("stage_solves,{}\n", e.stage_solves));
        csv.push_str(&format!("node_recomputes,{}\n", e.node_recomputes));
        csv.push_str(&format!("node_transitions,{}\n", e.node_transitions));
        csv.push_str(&format!("warnings,{}\n", e.warnings));
        csv.push_str(&format!("cycle_reports,{}\n", e.cycle_reports));
        csv.push_str(&format!("peak_drive_queue,{}\n", e.peaks.drive));
        csv.push_str(&format!("peak_node_queue,{}\n", e.peaks.node));
        csv.push_str(&format!("peak_eval_queue,{}\n", e.peaks.eval));

        let m = &self.merge;
        csv.push_str(&format!("transistors_before,{}\n", m.transistors_before));
        csv.push_str(&format!("transistors_after,{}\n", m.transistors_after));
        csv.push_str(&format!("parallel_merges,{}\n", m.parallel_merges));
        csv.push_str(&format!("series_merges,{}\n", m.series_merges));
        csv.push_str(&format!("lookup_failures,{}\n", m.lookup_failures));

        let n = &self.network;
        csv.push_str(&format!("instances,{}\n", n.instances));
        csv.push_str(&format!("nodes,{}\n", n.nodes));
        csv.push_str(&format!("elements,{}\n", n.elements));
        csv.push_str(&format!("connections,{}\n", n.connections));

        // Timing stats
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("steps_per_second,{:.2}\n", self.timing.steps_per_second));
        csv.push_str(&format!(
            "evaluations_per_second,{:.2}\n",
            self.timing.evaluations_per_second
        ));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        let e = &self.engine;
        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Steps: {} ({} interrupted, {} aborted)", e.steps, e.interrupted_steps, e.aborted_steps)?;
        writeln!(w, "Device evaluations: {}", e.evaluations)?;
        writeln!(w, "Stage solves: {}", e.stage_solves)?;
        writeln!(w, "Node transitions: {}", e.node_transitions)?;
        writeln!(w, "Warnings: {}", e.warnings)?;
        writeln!(w, "Oscillations: {}", e.cycle_reports)?;
        writeln!(
            w,
            "Peak queues: drive {}, node {}, eval {}",
            e.peaks.drive, e.peaks.node, e.peaks.eval
        )?;
        writeln!(w)?;

        let m = &self.merge;
        writeln!(w, "--- Merge ---")?;
        writeln!(w, "Transistors: {} -> {}", m.transistors_before, m.transistors_after)?;
        writeln!(w, "Parallel: {}, Series: {}", m.parallel_merges, m.series_merges)?;
        writeln!(w, "Nodes removed: {}", m.nodes_removed)?;
        writeln!(w)?;

        let n = &self.network;
        writeln!(w, "--- Network ---")?;
        writeln!(w, "Instances: {}", n.instances)?;
        writeln!(w, "Nodes: {}", n.nodes)?;
        writeln!(w, "Elements: {}", n.elements)?;
        writeln!(w, "Connections: {}", n.connections)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Steps/sec: {:.2}", self.timing.steps_per_second)?;
        writeln!(w, "Evaluations/sec: {:.2}", self.timing.evaluations_per_second)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        if self.write_summary(&mut buf).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns current timestamp as string.
fn chrono_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Times a run and snapshots a simulation's counters.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    /// Creates a new collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.metadata.version = env!("CARGO_PKG_VERSION").to_string();
        self.stats.record_start();
    }

    /// Copies the current counters of `sim`, keeping metadata and timing.
    pub fn capture(&mut self, sim: &Simulation) {
        let snapshot = sim.simulation_stats();
        self.stats.engine = snapshot.engine;
        self.stats.merge = snapshot.merge;
        self.stats.network = snapshot.network;
    }

    /// Stops timing and computes final statistics.
    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(ref timer) = self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Consumes the collector and returns the statistics.
    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}
