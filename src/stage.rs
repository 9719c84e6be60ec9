//! Transistor stage resolution.
//!
//! A stage is the set of nodes joined by conducting transistors, bounded by
//! supply and ground. Solving a stage finds, for each of its nodes, the
//! strongest high and low strength reaching it through the switches from
//! the external drivers, rails and stored charge of the whole stage. The
//! results become the contributions of the transistors' source/drain
//! connections, so the ordinary node recompute sees them like any other
//! driver.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::device::mos::FIRST_GATE;
use crate::device::Conduction;
use crate::engine::Simulation;
use crate::network::TermKind;
use crate::strength::{resolve, through_switch, NONE};
use crate::types::{ConnRef, InstanceId, NodeId, Strength};

/// A conducting transistor inside a stage.
#[derive(Clone, Copy, Debug)]
struct Switch {
    inst: InstanceId,
    /// Stage indices of source and drain.
    ends: [usize; 2],
    weak: bool,
    certain: bool,
}

/// Nodes and switches of one stage, with the strengths entering each node
/// from outside the transistors.
#[derive(Debug, Default)]
struct Stage {
    nodes: IndexMap<NodeId, usize>,
    bounded: Vec<bool>,
    external: Vec<(Strength, Strength)>,
    switches: Vec<Switch>,
    members: IndexSet<InstanceId>,
}

impl Stage {
    fn index_of(&mut self, node: NodeId, bounded: bool) -> (usize, bool) {
        if let Some(&i) = self.nodes.get(&node) {
            return (i, false);
        }
        let i = self.nodes.len();
        self.nodes.insert(node, i);
        self.bounded.push(bounded);
        (i, true)
    }

    /// Shortest-path propagation of one side's strengths across the
    /// switches. Boundary nodes only ever emit their own strength.
    fn propagate(&self, side: usize, include_uncertain: bool) -> Vec<Strength> {
        let mut best: Vec<Strength> = self
            .external
            .iter()
            .map(|&(h, l)| if side == 0 { h } else { l })
            .collect();
        let mut adjacent: Vec<Vec<(usize, bool)>> = vec![Vec::new(); best.len()];
        for sw in &self.switches {
            if sw.certain || include_uncertain {
                let [a, b] = sw.ends;
                adjacent[a].push((b, sw.weak));
                adjacent[b].push((a, sw.weak));
            }
        }

        let mut heap: BinaryHeap<Reverse<(Strength, usize)>> = best
            .iter()
            .enumerate()
            .filter(|(_, &s)| s != NONE)
            .map(|(i, &s)| Reverse((s, i)))
            .collect();
        while let Some(Reverse((strength, u))) = heap.pop() {
            if strength > best[u] {
                continue;
            }
            for &(v, weak) in &adjacent[u] {
                if self.bounded[v] {
                    continue;
                }
                let passed = through_switch(strength, weak);
                if passed < best[v] {
                    best[v] = passed;
                    heap.push(Reverse((passed, v)));
                }
            }
        }
        best
    }

    /// Final strengths per node. Uncertain switches are tried both ways;
    /// nodes whose logic depends on them go to X.
    fn solve(&self) -> Vec<(Strength, Strength)> {
        let maybe_high = self.propagate(0, true);
        let maybe_low = self.propagate(1, true);
        if self.switches.iter().all(|sw| sw.certain) {
            return maybe_high.into_iter().zip(maybe_low).collect();
        }
        let sure_high = self.propagate(0, false);
        let sure_low = self.propagate(1, false);
        (0..self.nodes.len())
            .map(|i| {
                let with = (maybe_high[i], maybe_low[i]);
                let without = (sure_high[i], sure_low[i]);
                if resolve(with.0, with.1).logic() != resolve(without.0, without.1).logic() {
                    let s = with.0.min(with.1).min(without.0).min(without.1);
                    (s, s)
                } else {
                    (with.0.min(without.0), with.1.min(without.1))
                }
            })
            .collect()
    }
}

impl Simulation {
    /// Re-solves the stage around transistor `seed`.
    pub(crate) fn solve_stage(&mut self, seed: InstanceId) {
        let Some(mos) = self
            .net
            .instances
            .get(seed)
            .and_then(|i| i.device.as_mos())
        else {
            return;
        };
        let seed_conducts = mos.conduction().may_conduct();
        if self.config.simulation.collect_stats {
            self.stats.stage_solves += 1;
        }
        if !seed_conducts {
            for term in 0..FIRST_GATE {
                self.set_contribution(ConnRef::new(seed, term), NONE, NONE, true);
            }
        }

        let stage = self.collect_stage(seed);
        let solved = stage.solve();
        trace!(
            seed = %self.net.instance_path(seed),
            nodes = stage.nodes.len(),
            switches = stage.switches.len(),
            "stage solved"
        );

        for sw in &stage.switches {
            for (term, &end) in sw.ends.iter().enumerate() {
                let (high, low) = if stage.bounded[end] {
                    (NONE, NONE)
                } else {
                    solved[end]
                };
                self.set_contribution(ConnRef::new(sw.inst, term), high, low, true);
            }
        }
    }

    /// Gathers the stage reachable from `seed`'s channel through
    /// conducting transistors, withdrawing its members from the drive
    /// queue.
    fn collect_stage(&mut self, seed: InstanceId) -> Stage {
        let mut stage = Stage::default();
        let mut frontier = Vec::new();
        for term in 0..FIRST_GATE {
            if let Some(node) = self.net.terminal_node(seed, term) {
                let bounded = self.net.nodes[node].rail.is_some();
                if stage.index_of(node, bounded).1 && !bounded {
                    frontier.push(node);
                }
            }
        }
        let seed_conducts = self
            .net
            .instances
            .get(seed)
            .and_then(|i| i.device.as_mos())
            .is_some_and(|m| m.conduction().may_conduct());
        if seed_conducts {
            self.add_switch(&mut stage, seed, &mut frontier);
        }

        while let Some(node) = frontier.pop() {
            for (cref, kind) in self.net.conn_list(node) {
                if kind != TermKind::DriveLevel || stage.members.contains(&cref.inst) {
                    continue;
                }
                let conducts = self.net.instances[cref.inst]
                    .device
                    .as_mos()
                    .is_some_and(|m| m.conduction().may_conduct());
                if conducts {
                    self.add_switch(&mut stage, cref.inst, &mut frontier);
                }
            }
        }

        stage.external = stage
            .nodes
            .keys()
            .map(|&node| self.external_strengths(node))
            .collect();
        stage
    }

    fn add_switch(&mut self, stage: &mut Stage, inst: InstanceId, frontier: &mut Vec<NodeId>) {
        let ends = [
            self.net.terminal_node(inst, 0),
            self.net.terminal_node(inst, 1),
        ];
        let [Some(source), Some(drain)] = ends else {
            return;
        };
        let Some(instance) = self.net.instances.get_mut(inst) else {
            return;
        };
        self.sched.drive.cancel(&mut instance.sched);
        let Some(mos) = instance.device.as_mos() else {
            return;
        };
        let weak = mos.is_weak();
        let certain = mos.conduction() == Conduction::On;
        stage.members.insert(inst);

        let mut ends = [0; 2];
        for (slot, node) in ends.iter_mut().zip([source, drain]) {
            let bounded = self.net.nodes[node].rail.is_some();
            let (index, fresh) = stage.index_of(node, bounded);
            if fresh && !bounded {
                frontier.push(node);
            }
            *slot = index;
        }
        stage.switches.push(Switch {
            inst,
            ends,
            weak,
            certain,
        });
    }

    /// Strengths on a node from everything but transistor channels.
    fn external_strengths(&self, node: NodeId) -> (Strength, Strength) {
        let n = &self.net.nodes[node];
        let (mut high, mut low) = n.pseudo_drivers();
        for (_, conn) in self.net.node_conns(node) {
            if conn.kind != TermKind::DriveLevel {
                high = high.min(conn.high);
                low = low.min(conn.low);
            }
        }
        (high, low)
    }
}
