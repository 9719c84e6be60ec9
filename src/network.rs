//! Hierarchical network: nodes, elements, instances and connections.
//!
//! Instances form a tree under a root module. Each instance owns a
//! contiguous connection array, one entry per terminal, allocated from a
//! [`SlicePool`]. Connections attached to the same node are threaded into a
//! singly linked list through [`ConnRef`] handles.
//!
//! Elements are named nets within one scope. Elements made equivalent form a
//! class: the representative element points at the owning node, the others
//! point at the representative, and all of them are chained through
//! `next_in_class` so the class can be walked and freed as a unit.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::arena::{Arena, SlicePool, SliceRange, DEFAULT_BLOCK_BYTES};
use crate::device::Device;
use crate::error::{Result, SimError};
use crate::strength::{resolve, Voltage, CHARGED, NONE, RAIL};
use crate::types::{ConnRef, ElementId, InstanceId, NodeId, Rail, Strength, MAX_TERMINALS};

/// Path separator for hierarchical names.
pub const PATH_SEPARATOR: char = '.';

/// How a terminal reacts to, and acts on, its node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermKind {
    /// Drives the node; never woken by it.
    #[default]
    Output,
    /// Re-evaluated when the node's logic value changes.
    VoltageInput,
    /// Re-evaluated whenever the node's strength changes.
    DriveInput,
    /// Transistor source/drain: part of a bidirectional stage.
    DriveLevel,
}

/// One terminal attachment.
#[derive(Clone, Debug)]
pub struct Connection {
    pub(crate) node: Option<NodeId>,
    pub(crate) kind: TermKind,
    pub(crate) high: Strength,
    pub(crate) low: Strength,
    pub(crate) drives_high: bool,
    pub(crate) drives_low: bool,
    pub(crate) next: Option<ConnRef>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            node: None,
            kind: TermKind::Output,
            high: NONE,
            low: NONE,
            drives_high: false,
            drives_low: false,
            next: None,
        }
    }
}

impl Connection {
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn kind(&self) -> TermKind {
        self.kind
    }

    /// High and low strength contributed by this terminal.
    pub fn strengths(&self) -> (Strength, Strength) {
        (self.high, self.low)
    }

    /// Whether this terminal currently holds the node's winning high/low.
    pub fn is_driving(&self) -> (bool, bool) {
        (self.drives_high, self.drives_low)
    }
}

/// A flattened electrical net.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) voltage: Voltage,
    pub(crate) high: Strength,
    pub(crate) low: Strength,
    pub(crate) high_count: u16,
    pub(crate) low_count: u16,
    pub(crate) rail: Option<Rail>,
    pub(crate) charge_high: bool,
    pub(crate) charge_low: bool,
    pub(crate) rep: ElementId,
    pub(crate) head: Option<ConnRef>,
    pub(crate) fanout: u32,
    pub(crate) transitions: u32,
    pub(crate) wraps: u32,
    pub(crate) warned: bool,
    pub(crate) sched: u8,
    pub(crate) breakpoint: bool,
    pub(crate) probes: u16,
}

impl Node {
    fn new(rep: ElementId) -> Self {
        Self {
            voltage: Voltage::ChargedX,
            high: CHARGED,
            low: CHARGED,
            high_count: 1,
            low_count: 1,
            rail: None,
            charge_high: true,
            charge_low: true,
            rep,
            head: None,
            fanout: 0,
            transitions: 0,
            wraps: 0,
            warned: false,
            sched: 0,
            breakpoint: false,
            probes: 0,
        }
    }

    pub fn voltage(&self) -> Voltage {
        self.voltage
    }

    pub fn strengths(&self) -> (Strength, Strength) {
        (self.high, self.low)
    }

    /// Contributors sitting at the winning high/low strength.
    pub fn driver_counts(&self) -> (u16, u16) {
        (self.high_count, self.low_count)
    }

    pub fn rail(&self) -> Option<Rail> {
        self.rail
    }

    pub fn charge(&self) -> (bool, bool) {
        (self.charge_high, self.charge_low)
    }

    pub fn representative(&self) -> ElementId {
        self.rep
    }

    /// Number of attached connections.
    pub fn fanout(&self) -> u32 {
        self.fanout
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    /// Strengths contributed by the rail tie and stored charge.
    pub(crate) fn pseudo_drivers(&self) -> (Strength, Strength) {
        let high = match (self.rail, self.charge_high) {
            (Some(Rail::Supply), _) => RAIL,
            (_, true) => CHARGED,
            _ => NONE,
        };
        let low = match (self.rail, self.charge_low) {
            (Some(Rail::Ground), _) => RAIL,
            (_, true) => CHARGED,
            _ => NONE,
        };
        (high, low)
    }

    /// The voltage the current strengths resolve to.
    pub fn resolved(&self) -> Voltage {
        resolve(self.high, self.low)
    }
}

/// Where an element's equivalence link leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquivLink {
    /// Representative of its class.
    Node(NodeId),
    /// Member of the class whose representative is given.
    Parent(ElementId),
}

/// A named net within one scope.
#[derive(Clone, Debug)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) owner: InstanceId,
    pub(crate) equiv: EquivLink,
    pub(crate) next_in_class: Option<ElementId>,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub fn link(&self) -> EquivLink {
        self.equiv
    }
}

/// One device or module occurrence.
#[derive(Debug)]
pub struct Instance {
    pub(crate) name: String,
    pub(crate) parent: Option<InstanceId>,
    pub(crate) device: Device,
    pub(crate) conns: SliceRange,
    pub(crate) sched: u8,
    pub(crate) children: IndexMap<String, InstanceId>,
    pub(crate) elements: IndexMap<String, ElementId>,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<InstanceId> {
        self.parent
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn terminal_count(&self) -> usize {
        self.conns.len()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, InstanceId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn elements(&self) -> impl Iterator<Item = (&str, ElementId)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Owner of every node, element, instance and connection.
pub struct Network {
    pub(crate) instances: Arena<Instance>,
    pub(crate) nodes: Arena<Node>,
    pub(crate) elements: Arena<Element>,
    pub(crate) conns: SlicePool<Connection>,
    root: InstanceId,
}

impl Network {
    pub fn new() -> Self {
        Self::with_block_bytes(DEFAULT_BLOCK_BYTES)
    }

    pub fn with_block_bytes(block_bytes: usize) -> Self {
        let mut instances = Arena::with_block_bytes(block_bytes);
        let root = instances.insert(Instance {
            name: String::new(),
            parent: None,
            device: Device::Module,
            conns: SliceRange::EMPTY,
            sched: 0,
            children: IndexMap::new(),
            elements: IndexMap::new(),
        });
        Self {
            instances,
            nodes: Arena::with_block_bytes(block_bytes),
            elements: Arena::with_block_bytes(block_bytes),
            conns: SlicePool::with_block_bytes(block_bytes),
            root,
        }
    }

    /// The top-level module.
    pub fn root(&self) -> InstanceId {
        self.root
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances.get(id).ok_or(SimError::StaleHandle)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(SimError::StaleHandle)
    }

    pub fn element(&self, id: ElementId) -> Result<&Element> {
        self.elements.get(id).ok_or(SimError::StaleHandle)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Live instances, the root module included.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Creates a child instance holding `device`, with one connection per
    /// terminal the device declares.
    pub fn make_instance(
        &mut self,
        parent: InstanceId,
        name: &str,
        device: Device,
    ) -> Result<InstanceId> {
        let scope = self.instances.get(parent).ok_or(SimError::StaleHandle)?;
        if scope.children.contains_key(name) {
            return Err(SimError::DuplicateName(name.to_string()));
        }
        let count = device.terminal_count();
        if count > MAX_TERMINALS {
            return Err(SimError::TerminalOutOfRange {
                term: count - 1,
                count: MAX_TERMINALS,
            });
        }
        let conns = self.conns.alloc(count);
        let id = self.instances.insert(Instance {
            name: name.to_string(),
            parent: Some(parent),
            device,
            conns,
            sched: 0,
            children: IndexMap::new(),
            elements: IndexMap::new(),
        });
        self.instances[parent].children.insert(name.to_string(), id);
        trace!(instance = name, terminals = conns.len(), "instance created");
        Ok(id)
    }

    /// Declares a named net in `owner`'s scope, backed by a fresh node.
    pub fn make_element(&mut self, owner: InstanceId, name: &str) -> Result<ElementId> {
        let scope = self.instances.get(owner).ok_or(SimError::StaleHandle)?;
        if scope.elements.contains_key(name) {
            return Err(SimError::DuplicateName(name.to_string()));
        }
        let element = self.elements.insert(Element {
            name: name.to_string(),
            owner,
            equiv: EquivLink::Node(NodeId::INVALID),
            next_in_class: None,
        });
        let node = self.nodes.insert(Node::new(element));
        self.elements[element].equiv = EquivLink::Node(node);
        self.instances[owner].elements.insert(name.to_string(), element);
        Ok(element)
    }

    /// Replaces an instance's connection array with `len` fresh connections.
    ///
    /// Existing connections are detached first; nodes whose strengths
    /// changed are returned.
    pub fn make_connection_array(&mut self, inst: InstanceId, len: usize) -> Result<Vec<NodeId>> {
        let old = self.instances.get(inst).ok_or(SimError::StaleHandle)?.conns;
        if len > MAX_TERMINALS {
            return Err(SimError::TerminalOutOfRange {
                term: len - 1,
                count: MAX_TERMINALS,
            });
        }
        let touched = self.detach_all(inst);
        self.conns.free(old);
        let fresh = self.conns.alloc(len);
        self.instances[inst].conns = fresh;
        Ok(touched)
    }

    /// Binds terminal `term` of `inst` to the node behind `element`.
    pub fn connect_term(&mut self, inst: InstanceId, term: usize, element: ElementId) -> Result<NodeId> {
        let cref = ConnRef::try_new(inst, term)?;
        let node = self.node_of(element)?;
        self.attach(cref, node)?;
        Ok(node)
    }

    /// Threads a connection into `node`'s list. The terminal kind comes
    /// from the instance's device.
    ///
    /// A drive made while the terminal was unbound takes effect here.
    /// Returns whether the node's winning strengths changed.
    pub(crate) fn attach(&mut self, cref: ConnRef, node: NodeId) -> Result<bool> {
        let instance = self.instances.get(cref.inst).ok_or(SimError::StaleHandle)?;
        let count = instance.terminal_count();
        let term = cref.term as usize;
        if term >= count {
            return Err(SimError::TerminalOutOfRange { term, count });
        }
        let kind = instance.device.terminal_kind(term);
        if !self.nodes.contains(node) {
            return Err(SimError::StaleHandle);
        }
        if self.conn(cref).node.is_some() {
            self.detach(cref);
        }
        let head = self.nodes[node].head;
        let conn = self.conn_mut(cref);
        conn.node = Some(node);
        conn.kind = kind;
        conn.next = head;
        let contributes = conn.high != NONE || conn.low != NONE;
        let n = &mut self.nodes[node];
        n.head = Some(cref);
        n.fanout += 1;
        Ok(contributes && self.recount(node))
    }

    /// Unthreads a connection from its node. Returns the node if its
    /// strengths changed as a result.
    pub(crate) fn detach(&mut self, cref: ConnRef) -> Option<NodeId> {
        let conn = self.conn(cref);
        let node = conn.node?;
        let next = conn.next;
        let contributed = conn.high != NONE || conn.low != NONE;

        if self.nodes[node].head == Some(cref) {
            self.nodes[node].head = next;
        } else {
            let mut cur = self.nodes[node].head;
            while let Some(c) = cur {
                if self.conn(c).next == Some(cref) {
                    self.conn_mut(c).next = next;
                    break;
                }
                cur = self.conn(c).next;
            }
        }
        self.nodes[node].fanout -= 1;
        *self.conn_mut(cref) = Connection::default();
        (contributed && self.recount(node)).then_some(node)
    }

    /// Detaches every terminal of `inst`.
    pub(crate) fn detach_all(&mut self, inst: InstanceId) -> Vec<NodeId> {
        let count = self.instances.get(inst).map_or(0, Instance::terminal_count);
        (0..count)
            .filter_map(|term| self.detach(ConnRef::new(inst, term)))
            .collect()
    }

    /// Connection behind a terminal reference.
    ///
    /// Panics on a stale reference; callers hold references taken from live
    /// node lists or validated instances.
    pub fn conn(&self, cref: ConnRef) -> &Connection {
        let range = self.instances[cref.inst].conns;
        &self.conns.get(range)[cref.term as usize]
    }

    pub(crate) fn conn_mut(&mut self, cref: ConnRef) -> &mut Connection {
        let range = self.instances[cref.inst].conns;
        &mut self.conns.get_mut(range)[cref.term as usize]
    }

    /// Checked variant of [`Network::conn`].
    pub fn try_conn(&self, cref: ConnRef) -> Result<&Connection> {
        let instance = self.instances.get(cref.inst).ok_or(SimError::StaleHandle)?;
        self.conns
            .get(instance.conns)
            .get(cref.term as usize)
            .ok_or(SimError::TerminalOutOfRange {
                term: cref.term as usize,
                count: instance.terminal_count(),
            })
    }

    /// Node a terminal is bound to, if any.
    pub fn terminal_node(&self, inst: InstanceId, term: usize) -> Option<NodeId> {
        self.try_conn(ConnRef::try_new(inst, term).ok()?).ok()?.node
    }

    /// Iterates the connections attached to a node.
    pub fn node_conns(&self, node: NodeId) -> NodeConns<'_> {
        NodeConns {
            net: self,
            cur: self.nodes.get(node).and_then(|n| n.head),
        }
    }

    /// Connections of a node as an owned list, for callers that mutate
    /// the network while walking it.
    pub(crate) fn conn_list(&self, node: NodeId) -> Vec<(ConnRef, TermKind)> {
        self.node_conns(node).map(|(c, conn)| (c, conn.kind)).collect()
    }

    /// Follows an element's equivalence links to its node.
    pub fn node_of(&self, element: ElementId) -> Result<NodeId> {
        let mut cur = element;
        for _ in 0..=self.elements.len() {
            match self.elements.get(cur).ok_or(SimError::StaleHandle)?.equiv {
                EquivLink::Node(node) => return Ok(node),
                EquivLink::Parent(parent) => cur = parent,
            }
        }
        Err(SimError::StaleHandle)
    }

    /// Makes two elements name the same net.
    ///
    /// The surviving node is `a`'s. `b`'s class is reparented onto `a`'s
    /// representative and its connections move over; `b`'s node is freed.
    pub fn merge_equivalent(&mut self, a: ElementId, b: ElementId) -> Result<NodeId> {
        let keep = self.node_of(a)?;
        let gone = self.node_of(b)?;
        if keep == gone {
            return Ok(keep);
        }
        let rep_keep = self.nodes[keep].rep;
        let rep_gone = self.nodes[gone].rep;

        let mut tail = rep_keep;
        while let Some(next) = self.elements[tail].next_in_class {
            tail = next;
        }
        self.elements[tail].next_in_class = Some(rep_gone);
        let mut cur = Some(rep_gone);
        while let Some(el) = cur {
            let element = &mut self.elements[el];
            element.equiv = EquivLink::Parent(rep_keep);
            cur = element.next_in_class;
        }

        let Some(absorbed) = self.nodes.remove(gone) else {
            return Err(SimError::StaleHandle);
        };
        let mut last = None;
        let mut cur = absorbed.head;
        while let Some(c) = cur {
            let conn = self.conn_mut(c);
            conn.node = Some(keep);
            last = Some(c);
            cur = conn.next;
        }
        if let Some(last) = last {
            let head = self.nodes[keep].head;
            self.conn_mut(last).next = head;
            self.nodes[keep].head = absorbed.head;
        }

        let node = &mut self.nodes[keep];
        node.fanout += absorbed.fanout;
        node.breakpoint |= absorbed.breakpoint;
        node.probes += absorbed.probes;
        match (node.rail, absorbed.rail) {
            (None, rail) => node.rail = rail,
            (Some(mine), Some(theirs)) if mine != theirs => {
                warn!(?mine, ?theirs, "merged nets tied to different rails, keeping the first");
            }
            _ => {}
        }
        self.recount(keep);
        Ok(keep)
    }

    /// Ties a node to a rail, or releases it.
    pub(crate) fn set_rail(&mut self, node: NodeId, rail: Option<Rail>) -> Result<bool> {
        self.nodes.get_mut(node).ok_or(SimError::StaleHandle)?.rail = rail;
        Ok(self.recount(node))
    }

    /// Rescans a node's contributors, refreshing its winning strengths, the
    /// active-driver flags and the counts. Returns whether the winning
    /// strengths changed.
    pub(crate) fn recount(&mut self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        let (pseudo_high, pseudo_low) = node.pseudo_drivers();
        let (mut high, mut low) = (pseudo_high, pseudo_low);
        let mut cur = node.head;
        while let Some(c) = cur {
            let conn = self.conn(c);
            high = high.min(conn.high);
            low = low.min(conn.low);
            cur = conn.next;
        }

        let mut high_count = u16::from(high != NONE && pseudo_high == high);
        let mut low_count = u16::from(low != NONE && pseudo_low == low);
        let mut cur = self.nodes[id].head;
        while let Some(c) = cur {
            let conn = self.conn_mut(c);
            conn.drives_high = high != NONE && conn.high == high;
            conn.drives_low = low != NONE && conn.low == low;
            high_count += u16::from(conn.drives_high);
            low_count += u16::from(conn.drives_low);
            cur = conn.next;
        }

        let node = &mut self.nodes[id];
        let changed = node.high != high || node.low != low;
        node.high = high;
        node.low = low;
        node.high_count = high_count;
        node.low_count = low_count;
        changed
    }

    /// Changes one connection's contribution, keeping the node's winning
    /// strengths and driver counts current. Returns the node and whether
    /// its winning strengths changed.
    pub(crate) fn update_contribution(
        &mut self,
        cref: ConnRef,
        high: Strength,
        low: Strength,
    ) -> Option<(NodeId, bool)> {
        let conn = self.conn_mut(cref);
        if conn.high == high && conn.low == low {
            return None;
        }
        conn.high = high;
        conn.low = low;
        let node_id = conn.node?;
        let mut drives_high = conn.drives_high;
        let mut drives_low = conn.drives_low;

        let node = &mut self.nodes[node_id];
        let rescan = update_side(&mut node.high, &mut node.high_count, &mut drives_high, high)
            | update_side(&mut node.low, &mut node.low_count, &mut drives_low, low);
        if rescan {
            return Some((node_id, self.recount(node_id)));
        }
        let conn = self.conn_mut(cref);
        conn.drives_high = drives_high;
        conn.drives_low = drives_low;
        Some((node_id, false))
    }

    /// Replaces a node's charge bits. Returns whether its strengths changed.
    pub(crate) fn set_charge(&mut self, node: NodeId, high: bool, low: bool) -> bool {
        let n = &mut self.nodes[node];
        if n.charge_high == high && n.charge_low == low {
            return false;
        }
        n.charge_high = high;
        n.charge_low = low;
        self.recount(node)
    }

    /// Instances in hierarchy order, depth first, root excluded.
    pub fn walk_instances(&self) -> Vec<InstanceId> {
        let mut out = Vec::with_capacity(self.instances.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if id != self.root {
                out.push(id);
            }
            if let Some(instance) = self.instances.get(id) {
                stack.extend(instance.children.values().rev().copied());
            }
        }
        out
    }

    /// Nodes in hierarchy order: each node is listed where its
    /// representative element is declared.
    pub fn walk_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(instance) = self.instances.get(id) else {
                continue;
            };
            for element in instance.elements.values() {
                if let Some(EquivLink::Node(node)) = self.elements.get(*element).map(|e| e.equiv) {
                    out.push(node);
                }
            }
            stack.extend(instance.children.values().rev().copied());
        }
        out
    }

    /// Removes a leaf instance and its connection array.
    pub(crate) fn free_instance(&mut self, inst: InstanceId) -> Vec<NodeId> {
        let touched = self.detach_all(inst);
        let Some(instance) = self.instances.remove(inst) else {
            return touched;
        };
        self.conns.free(instance.conns);
        if let Some(parent) = instance.parent.and_then(|p| self.instances.get_mut(p)) {
            parent.children.shift_remove(&instance.name);
        }
        touched
    }

    /// Removes an unconnected node together with every element naming it.
    /// Returns the number of elements released.
    pub(crate) fn free_node(&mut self, node: NodeId) -> usize {
        let Some(n) = self.nodes.remove(node) else {
            return 0;
        };
        let mut freed = 0;
        let mut cur = Some(n.rep);
        while let Some(el) = cur {
            let Some(element) = self.elements.remove(el) else {
                break;
            };
            if let Some(owner) = self.instances.get_mut(element.owner) {
                owner.elements.shift_remove(&element.name);
            }
            freed += 1;
            cur = element.next_in_class;
        }
        freed
    }

    /// Resolves a dotted instance path; the empty path is the root.
    pub fn find_instance(&self, path: &str) -> Result<InstanceId> {
        let mut cur = self.root;
        if path.is_empty() {
            return Ok(cur);
        }
        for part in path.split(PATH_SEPARATOR) {
            cur = *self
                .instances
                .get(cur)
                .and_then(|i| i.children.get(part))
                .ok_or_else(|| SimError::NotFound(path.to_string()))?;
        }
        Ok(cur)
    }

    /// Resolves a dotted element path such as `cpu.alu.carry`.
    pub fn find_element(&self, path: &str) -> Result<ElementId> {
        let (scope, name) = match path.rsplit_once(PATH_SEPARATOR) {
            Some((scope, name)) => (self.find_instance(scope), name),
            None => (Ok(self.root), path),
        };
        let scope = scope.map_err(|_| SimError::NotFound(path.to_string()))?;
        self.instances[scope]
            .elements
            .get(name)
            .copied()
            .ok_or_else(|| SimError::NotFound(path.to_string()))
    }

    pub fn instance_path(&self, inst: InstanceId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(inst);
        while let Some(id) = cur {
            let Some(instance) = self.instances.get(id) else {
                break;
            };
            if instance.parent.is_some() {
                parts.push(instance.name.as_str());
            }
            cur = instance.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn element_path(&self, element: ElementId) -> String {
        let Some(el) = self.elements.get(element) else {
            return String::from("<freed>");
        };
        let scope = self.instance_path(el.owner);
        if scope.is_empty() {
            el.name.clone()
        } else {
            format!("{scope}{PATH_SEPARATOR}{}", el.name)
        }
    }

    /// Path of a node's representative element.
    pub fn node_name(&self, node: NodeId) -> String {
        match self.nodes.get(node) {
            Some(n) => self.element_path(n.rep),
            None => String::from("<freed>"),
        }
    }

    /// Arena blocks grown across all structures.
    pub fn arena_blocks(&self) -> usize {
        self.instances.blocks() + self.nodes.blocks() + self.elements.blocks()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("instances", &self.instances.len())
            .field("nodes", &self.nodes.len())
            .field("elements", &self.elements.len())
            .field("connections", &self.conns.live())
            .finish()
    }
}

/// Applies one side of a contribution change. Returns true when the node
/// needs a full rescan.
fn update_side(best: &mut Strength, count: &mut u16, active: &mut bool, new: Strength) -> bool {
    if new < *best {
        return true;
    }
    if new == *best && new != NONE {
        if !*active {
            *active = true;
            *count += 1;
        }
        return false;
    }
    if *active {
        *active = false;
        *count = count.saturating_sub(1);
        return *count == 0;
    }
    false
}

/// Iterator over the connections threaded on one node.
pub struct NodeConns<'a> {
    net: &'a Network,
    cur: Option<ConnRef>,
}

impl<'a> Iterator for NodeConns<'a> {
    type Item = (ConnRef, &'a Connection);

    fn next(&mut self) -> Option<Self::Item> {
        let cref = self.cur?;
        let conn = self.net.conn(cref);
        self.cur = conn.next;
        Some((cref, conn))
    }
}
