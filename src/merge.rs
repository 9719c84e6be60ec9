//! Series/parallel transistor reduction.
//!
//! Before the simulation starts, chains of same-type transistors are
//! collapsed into single instances whose network shape captures the
//! combined on/off function. Two transistors sharing both channel nodes
//! merge in parallel; two sharing a node nothing else touches merge in
//! series, and that node disappears. Resulting shapes come from the shape
//! table only.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::device::mos::FIRST_GATE;
use crate::device::{Device, Mos, Polarity};
use crate::engine::Simulation;
use crate::error::{Result, SimError};
use crate::network::TermKind;
use crate::shape::{combine, shape, Combine, ShapeId, SHAPE_OFF, SHAPE_ON};
use crate::stats::MergeStats;
use crate::types::{ConnRef, InstanceId, NodeId};

/// What the merger needs to know about one transistor.
#[derive(Clone, Debug)]
struct Candidate {
    polarity: Polarity,
    weak: bool,
    shape: ShapeId,
    source: NodeId,
    drain: NodeId,
    gates: Vec<NodeId>,
}

impl Candidate {
    fn same_type(&self, other: &Candidate) -> bool {
        self.polarity == other.polarity && self.weak == other.weak
    }

    fn other_end(&self, node: NodeId) -> NodeId {
        if self.source == node {
            self.drain
        } else {
            self.source
        }
    }
}

/// Importance of each node, computed on first use.
#[derive(Default)]
struct Importance {
    known: HashMap<NodeId, bool>,
}

impl Simulation {
    /// Collapses series and parallel transistor groups.
    ///
    /// Only valid before the first evaluation. Returns the counts of this
    /// pass; the totals are kept in [`Simulation::merge_stats`].
    pub fn merge_transistors(&mut self) -> Result<MergeStats> {
        if self.status.started {
            return Err(SimError::AlreadyStarted);
        }
        let mut stats = MergeStats::default();
        let order = self.net.walk_instances();
        stats.transistors_before = self.count_transistors(&order);
        if !self.config.merge.enabled {
            info!("transistor merging disabled");
            stats.transistors_after = stats.transistors_before;
            return Ok(stats);
        }

        let mut importance = Importance::default();
        for inst in order {
            if !self.net.instances.contains(inst) {
                continue;
            }
            loop {
                let parallel = self.try_parallel(inst, &mut stats)?;
                let series = self.try_series(inst, &mut importance, &mut stats)?;
                if !parallel && !series {
                    break;
                }
            }
        }

        stats.important_nodes = importance.known.values().filter(|&&v| v).count();
        let remaining = self.net.walk_instances();
        stats.transistors_after = self.count_transistors(&remaining);
        info!(
            before = stats.transistors_before,
            after = stats.transistors_after,
            parallel = stats.parallel_merges,
            series = stats.series_merges,
            "transistors merged"
        );
        self.merge_stats.accumulate(&stats);
        Ok(stats)
    }

    fn count_transistors(&self, order: &[InstanceId]) -> usize {
        order
            .iter()
            .filter(|&&i| self.net.instances.get(i).is_some_and(|i| i.device.as_mos().is_some()))
            .count()
    }

    /// A transistor eligible for merging: fully connected, not a fixed
    /// placeholder, with room for more inputs.
    fn candidate(&self, inst: InstanceId) -> Option<Candidate> {
        let mos = self.net.instances.get(inst)?.device.as_mos()?;
        if mos.shape() == SHAPE_OFF
            || mos.shape() == SHAPE_ON
            || mos.gate_count() >= self.config.merge.max_inputs
        {
            return None;
        }
        let source = self.net.terminal_node(inst, 0)?;
        let drain = self.net.terminal_node(inst, 1)?;
        let gates = (0..mos.gate_count())
            .map(|i| self.net.terminal_node(inst, FIRST_GATE + i))
            .collect::<Option<Vec<_>>>()?;
        Some(Candidate {
            polarity: mos.polarity(),
            weak: mos.is_weak(),
            shape: mos.shape(),
            source,
            drain,
            gates,
        })
    }

    fn is_important(&self, node: NodeId, importance: &mut Importance) -> bool {
        if let Some(&known) = importance.known.get(&node) {
            return known;
        }
        let n = &self.net.nodes[node];
        let mut important = n.rail.is_some()
            || n.fanout as usize > self.config.merge.max_fanout
            || n.breakpoint
            || n.probes > 0;
        let mut polarity = None;
        for (cref, _) in self.net.node_conns(node) {
            if important {
                break;
            }
            match self.net.instances[cref.inst].device.as_mos() {
                None => important = true,
                Some(m) => match polarity {
                    None => polarity = Some(m.polarity()),
                    Some(p) if p != m.polarity() => important = true,
                    Some(_) => {}
                },
            }
        }
        importance.known.insert(node, important);
        important
    }

    /// Merges `inst` with a same-type transistor across the same two nodes.
    fn try_parallel(&mut self, inst: InstanceId, stats: &mut MergeStats) -> Result<bool> {
        let Some(mine) = self.candidate(inst) else {
            return Ok(false);
        };
        if mine.source == mine.drain {
            return Ok(false);
        }
        let partners: Vec<InstanceId> = self
            .net
            .node_conns(mine.source)
            .filter(|(c, conn)| conn.kind == TermKind::DriveLevel && c.inst != inst)
            .map(|(c, _)| c.inst)
            .collect();
        for other in partners {
            let Some(theirs) = self.candidate(other) else {
                continue;
            };
            let same_ends = (theirs.source == mine.source && theirs.drain == mine.drain)
                || (theirs.source == mine.drain && theirs.drain == mine.source);
            if !same_ends || !mine.same_type(&theirs) {
                continue;
            }
            let Some(merged) = self.lookup(&mine, &theirs, Combine::Parallel, stats) else {
                continue;
            };
            let merged_shape = merged.0;
            self.rebuild(inst, &mine, merged, mine.source, mine.drain)?;
            self.forget_instance(other);
            self.net.free_instance(other);
            stats.parallel_merges += 1;
            debug!(
                survivor = %self.net.instance_path(inst),
                shape = merged_shape,
                "parallel merge"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Merges `inst` with the only other transistor on one of its channel
    /// nodes, removing that node.
    fn try_series(
        &mut self,
        inst: InstanceId,
        importance: &mut Importance,
        stats: &mut MergeStats,
    ) -> Result<bool> {
        let Some(mine) = self.candidate(inst) else {
            return Ok(false);
        };
        for middle in [mine.source, mine.drain] {
            if mine.source == mine.drain || self.is_important(middle, importance) {
                continue;
            }
            let conns: Vec<(ConnRef, TermKind)> = self.net.conn_list(middle);
            if conns.len() != 2 || conns.iter().any(|(_, kind)| *kind != TermKind::DriveLevel) {
                continue;
            }
            let Some(other) = conns.iter().map(|(c, _)| c.inst).find(|&i| i != inst) else {
                continue;
            };
            let Some(theirs) = self.candidate(other) else {
                continue;
            };
            if !mine.same_type(&theirs) || theirs.source == theirs.drain {
                continue;
            }
            let near = mine.other_end(middle);
            let far = theirs.other_end(middle);
            if near == far {
                continue;
            }
            let Some(merged) = self.lookup(&mine, &theirs, Combine::Series, stats) else {
                continue;
            };

            let merged_shape = merged.0;
            self.rebuild(inst, &mine, merged, near, far)?;
            self.forget_instance(other);
            self.net.free_instance(other);
            if self.net.node(middle)?.fanout() != 0 {
                return Err(SimError::bad_attr("merge", "series node still connected"));
            }
            self.forget_node(middle);
            let name = self.net.node_name(middle);
            stats.elements_removed += self.net.free_node(middle);
            stats.nodes_removed += 1;
            stats.series_merges += 1;
            debug!(
                survivor = %self.net.instance_path(inst),
                removed = %name,
                shape = merged_shape,
                "series merge"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Resulting shape and gate order, or `None` when the table has no
    /// entry or the result is too wide.
    fn lookup(
        &self,
        mine: &Candidate,
        theirs: &Candidate,
        how: Combine,
        stats: &mut MergeStats,
    ) -> Option<(ShapeId, Vec<NodeId>)> {
        let Some((merged, mine_first)) = combine(mine.shape, theirs.shape, how) else {
            stats.lookup_failures += 1;
            debug!(
                left = mine.shape,
                right = theirs.shape,
                ?how,
                "no combined shape"
            );
            return None;
        };
        if shape(merged).inputs as usize > self.config.merge.max_inputs {
            stats.lookup_failures += 1;
            return None;
        }
        let (first, second) = if mine_first {
            (&mine.gates, &theirs.gates)
        } else {
            (&theirs.gates, &mine.gates)
        };
        Some((merged, first.iter().chain(second).copied().collect()))
    }

    /// Gives `inst` its merged shape and a fresh connection array.
    fn rebuild(
        &mut self,
        inst: InstanceId,
        mine: &Candidate,
        merged: (ShapeId, Vec<NodeId>),
        source: NodeId,
        drain: NodeId,
    ) -> Result<()> {
        let (merged_shape, gates) = merged;
        let len = FIRST_GATE + gates.len();
        // pre-start: nothing is driving, so no strengths move
        self.net.make_connection_array(inst, len)?;
        self.net.instances[inst].device =
            Device::Mos(Mos::with_shape(mine.polarity, mine.weak, merged_shape));
        let ends = [source, drain];
        for (term, node) in ends.into_iter().chain(gates).enumerate() {
            self.net.attach(ConnRef::new(inst, term), node)?;
        }
        Ok(())
    }
}
