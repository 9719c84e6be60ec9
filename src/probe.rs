//! Waveform probes.
//!
//! A probe watches one net and records a sample at the end of every step
//! in which the net's voltage differs from its last sample.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::engine::Simulation;
use crate::error::{Result, SimError};
use crate::network::Network;
use crate::strength::Voltage;
use crate::types::{ElementId, ProbeId, StepCount};

/// One recorded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub step: StepCount,
    pub voltage: Voltage,
}

#[derive(Clone, Debug)]
pub struct Probe {
    id: ProbeId,
    label: String,
    element: ElementId,
    samples: Vec<Sample>,
}

impl Probe {
    pub fn id(&self) -> ProbeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<Voltage> {
        self.samples.last().map(|s| s.voltage)
    }

    /// Display letters of the recorded values, oldest first.
    pub fn trace(&self) -> String {
        self.samples.iter().map(|s| s.voltage.letter()).collect()
    }
}

#[derive(Debug, Default)]
pub struct ProbeSet {
    probes: IndexMap<ProbeId, Probe>,
    next_id: ProbeId,
}

impl ProbeSet {
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn get(&self, id: ProbeId) -> Option<&Probe> {
        self.probes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Probe> {
        self.probes.values()
    }

    fn insert(&mut self, element: ElementId, label: &str) -> ProbeId {
        let id = self.next_id;
        self.next_id += 1;
        self.probes.insert(
            id,
            Probe {
                id,
                label: label.to_string(),
                element,
                samples: Vec::new(),
            },
        );
        id
    }

    /// Records changed values at the end of step `step`.
    pub(crate) fn sample(&mut self, step: StepCount, net: &Network) {
        for probe in self.probes.values_mut() {
            let Some(voltage) = net
                .node_of(probe.element)
                .and_then(|n| net.node(n))
                .ok()
                .map(|n| n.voltage())
            else {
                continue;
            };
            if probe.last() != Some(voltage) {
                probe.samples.push(Sample { step, voltage });
            }
        }
    }
}

impl Simulation {
    /// Starts recording `element`'s net. The current value is the first
    /// sample.
    pub fn add_probe(&mut self, element: ElementId, label: &str) -> Result<ProbeId> {
        let node = self.net.node_of(element)?;
        let voltage = self.net.node(node)?.voltage();
        let step = self.steps();
        self.net.nodes[node].probes += 1;
        let id = self.probes.insert(element, label);
        if let Some(probe) = self.probes.probes.get_mut(&id) {
            probe.samples.push(Sample { step, voltage });
        }
        Ok(id)
    }

    /// Stops recording and hands back what was recorded.
    pub fn remove_probe(&mut self, id: ProbeId) -> Result<Probe> {
        let probe = self
            .probes
            .probes
            .shift_remove(&id)
            .ok_or_else(|| SimError::NotFound(format!("probe {id}")))?;
        if let Some(node) = self
            .net
            .node_of(probe.element)
            .ok()
            .and_then(|n| self.net.nodes.get_mut(n))
        {
            node.probes = node.probes.saturating_sub(1);
        }
        Ok(probe)
    }

    pub fn probe(&self, id: ProbeId) -> Option<&Probe> {
        self.probes.get(id)
    }

    pub fn probes(&self) -> &ProbeSet {
        &self.probes
    }
}
