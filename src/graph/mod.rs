//! Graph store: owns every node and edge, enforces the graph's structural
//! invariants, and carries the graph-wide running-statistics struct and
//! the process-wide singleton STOP node.

pub mod edge;
pub mod node;

pub use edge::{Edge, EdgeFlags, EdgeHandle};
pub use node::{NodeFlags, NodeHandle, Payload};

use std::collections::HashMap;

use ahash::RandomState;

use crate::errors::{GraphError, GraphResult};
use crate::stats::RunningStats;

/// Which side of a node's edge list to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PayloadKey {
    len: u8,
    bytes: [u8; node::MAX_PAYLOAD_LEN],
    level: u8,
}

impl PayloadKey {
    fn new(payload: &Payload, level: u8) -> Self {
        let mut bytes = [0u8; node::MAX_PAYLOAD_LEN];
        let slice = payload.as_slice();
        bytes[..slice.len()].copy_from_slice(slice);
        Self { len: slice.len() as u8, bytes, level }
    }
}

/// The graph store. Owns all nodes and edges as two flat, tombstoned
/// collections keyed by stable handle; cycles exist only in the logical
/// graph, never in the ownership graph.
pub struct GraphStore {
    nodes: Vec<Option<node::Node>>,
    edges: Vec<Option<edge::Edge>>,
    free_node_slots: Vec<u32>,
    free_edge_slots: Vec<u32>,
    payload_index: HashMap<PayloadKey, NodeHandle, RandomState>,
    stop_node: NodeHandle,
    /// Bumped on every mutation that can invalidate a node's cached
    /// outgoing-weight sum; invalidates the cache via a generation check
    /// rather than eager recomputation.
    generation: u64,
    pub stats: RunningStats,
    live_node_count: usize,
    live_edge_count: usize,
}

impl GraphStore {
    pub fn new() -> Self {
        let mut store = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            free_node_slots: Vec::new(),
            free_edge_slots: Vec::new(),
            payload_index: HashMap::with_hasher(RandomState::new()),
            stop_node: NodeHandle(0),
            generation: 0,
            stats: RunningStats::new(),
            live_node_count: 0,
            live_edge_count: 0,
        };
        let stop = store.insert_node(node::Node::new_stop(), None);
        store.stop_node = stop;
        store
    }

    pub fn stop_node(&self) -> NodeHandle {
        self.stop_node
    }

    pub fn node_count(&self) -> usize {
        self.live_node_count
    }

    pub fn edge_count(&self) -> usize {
        self.live_edge_count
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&node::Node> {
        self.nodes.get(handle.0 as usize).and_then(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut node::Node> {
        self.nodes.get_mut(handle.0 as usize).and_then(|n| n.as_mut())
    }

    pub fn edge(&self, handle: EdgeHandle) -> Option<&edge::Edge> {
        self.edges.get(handle.0 as usize).and_then(|e| e.as_ref())
    }

    pub fn edge_mut(&mut self, handle: EdgeHandle) -> Option<&mut edge::Edge> {
        self.edges.get_mut(handle.0 as usize).and_then(|e| e.as_mut())
    }

    fn insert_node(&mut self, node: node::Node, key: Option<PayloadKey>) -> NodeHandle {
        let handle = if let Some(slot) = self.free_node_slots.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeHandle(slot)
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(Some(node));
            NodeHandle(idx)
        };
        self.live_node_count += 1;
        if let Some(key) = key {
            self.payload_index.insert(key, handle);
        }
        handle
    }

    /// Constant-time amortised via the payload-hash table; creates a
    /// level-0 node if absent.
    pub fn find_or_create_node(&mut self, payload: &[u8], port: u8) -> NodeHandle {
        self.find_or_create_node_at_level(payload, 0, port)
    }

    /// Hierarchy formation needs the level-aware variant directly, since a
    /// hierarchy's payload bytes may coincide with a lower-level node's.
    pub fn find_or_create_node_at_level(&mut self, payload: &[u8], level: u8, port: u8) -> NodeHandle {
        let p = Payload::from_slice(payload);
        let key = PayloadKey::new(&p, level);
        if let Some(&handle) = self.payload_index.get(&key) {
            return handle;
        }
        let node = if level == 0 {
            node::Node::new_leaf(p, port)
        } else {
            node::Node::new_hierarchy(p, level, port)
        };
        self.insert_node(node, Some(key))
    }

    pub fn find_node(&self, payload: &[u8], level: u8) -> Option<NodeHandle> {
        let p = Payload::from_slice(payload);
        let key = PayloadKey::new(&p, level);
        self.payload_index.get(&key).copied()
    }

    /// Local search over the source's outgoing list, O(outdegree).
    pub fn find_edge(&self, source: NodeHandle, target: NodeHandle) -> Option<EdgeHandle> {
        let node = self.node(source)?;
        node.outgoing()
            .iter()
            .copied()
            .find(|&eh| self.edge(eh).map(|e| e.target == target).unwrap_or(false))
    }

    /// Fails with `DuplicateEdge` if one already exists; performs no
    /// mutation on failure.
    pub fn create_edge(&mut self, source: NodeHandle, target: NodeHandle, initial_weight: f64, timestamp: u64) -> GraphResult<EdgeHandle> {
        if self.node(source).is_none() {
            return Err(GraphError::NoSuchNode(source));
        }
        if self.node(target).is_none() {
            return Err(GraphError::NoSuchNode(target));
        }
        if self.find_edge(source, target).is_some() {
            return Err(GraphError::DuplicateEdge { source, target });
        }

        let mut e = edge::Edge::new(source, target, initial_weight, timestamp);
        if self.node(target).map(|n| n.is_stop()).unwrap_or(false) {
            e.flags.insert(EdgeFlags::TO_STOP);
        }

        let handle = if let Some(slot) = self.free_edge_slots.pop() {
            self.edges[slot as usize] = Some(e);
            EdgeHandle(slot)
        } else {
            let idx = self.edges.len() as u32;
            self.edges.push(Some(e));
            EdgeHandle(idx)
        };
        self.live_edge_count += 1;

        self.node_mut(source).unwrap().outgoing.push(handle);
        self.node_mut(target).unwrap().incoming.push(handle);
        self.touch_generation(source);

        Ok(handle)
    }

    /// Unlinks from endpoint lists, invalidates cached sums, then releases
    /// the slot.
    pub fn remove_edge(&mut self, handle: EdgeHandle) -> GraphResult<()> {
        let Some(e) = self.edges.get(handle.0 as usize).and_then(|e| e.as_ref()).cloned() else {
            return Err(GraphError::NoSuchEdge(handle));
        };
        if let Some(src) = self.node_mut(e.source) {
            src.outgoing.retain(|&h| h != handle);
        }
        if let Some(tgt) = self.node_mut(e.target) {
            tgt.incoming.retain(|&h| h != handle);
        }
        self.edges[handle.0 as usize] = None;
        self.free_edge_slots.push(handle.0);
        self.live_edge_count -= 1;
        self.touch_generation(e.source);
        Ok(())
    }

    /// Only reachable through disuse-driven pruning; removes all incident
    /// edges first so no edge is ever left pointing at a dead node.
    pub fn remove_node(&mut self, handle: NodeHandle) -> GraphResult<()> {
        if handle == self.stop_node {
            return Err(GraphError::NoSuchNode(handle));
        }
        let Some(node) = self.nodes.get(handle.0 as usize).and_then(|n| n.as_ref()) else {
            return Err(GraphError::NoSuchNode(handle));
        };
        let incident: Vec<EdgeHandle> = node.outgoing().iter().chain(node.incoming()).copied().collect();
        for eh in incident {
            // Already-removed edges (shared between out/in dedup) are
            // simply skipped.
            let _ = self.remove_edge(eh);
        }
        let removed = self.nodes[handle.0 as usize].take();
        if let Some(n) = removed {
            let key = PayloadKey::new(&n.payload, n.level);
            self.payload_index.remove(&key);
        }
        self.free_node_slots.push(handle.0);
        self.live_node_count -= 1;
        Ok(())
    }

    /// The store just honours the limit handed to it by the
    /// adaptive-thresholds facade.
    pub fn iterate_neighbours(&self, node: NodeHandle, direction: Direction, limit: usize) -> Vec<EdgeHandle> {
        let Some(n) = self.node(node) else { return Vec::new() };
        let list = match direction {
            Direction::Outgoing => n.outgoing(),
            Direction::Incoming => n.incoming(),
        };
        list.iter().copied().filter(|&eh| self.edge(eh).map(|e| !e.is_marked_for_deletion()).unwrap_or(false)).take(limit).collect()
    }

    /// Average outgoing-edge weight for `node` — the `local_avg` every
    /// adaptive threshold below is relative to. Cached against the store's
    /// generation counter; recomputed lazily on staleness.
    pub fn local_avg_weight(&mut self, node: NodeHandle) -> f64 {
        let generation = self.generation;
        if let Some(n) = self.node(node) {
            if let Some((gen, sum)) = n.cached_outgoing_sum {
                if gen == generation {
                    let count = n.out_degree().max(1);
                    return sum / count as f64;
                }
            }
        }
        let sum: f64 = self
            .node(node)
            .map(|n| n.outgoing().iter().filter_map(|&eh| self.edge(eh)).map(|e| e.weight()).sum())
            .unwrap_or(0.0);
        let count = self.node(node).map(|n| n.out_degree()).unwrap_or(0).max(1);
        if let Some(n) = self.node_mut(node) {
            n.cached_outgoing_sum = Some((generation, sum));
        }
        sum / count as f64
    }

    fn touch_generation(&mut self, affected: NodeHandle) {
        self.generation += 1;
        if let Some(n) = self.node_mut(affected) {
            n.invalidate_cache();
        }
    }

    /// Post-wave cleanup pass: unlinks and releases every edge in
    /// `candidates` that is still `marked_for_deletion`, then prunes any
    /// endpoint left with no outgoing and no incoming edges at all — a node
    /// whose local edge lists are both empty has no way to ever participate
    /// in a future wave or decode, so it is disuse-pruned rather than kept
    /// forever. The STOP node and anything in `protected` (this call's seed
    /// nodes, still needed by the decoder that runs right after) are never
    /// pruned. Must never be called mid-wave.
    pub fn cleanup_marked(&mut self, candidates: &[EdgeHandle], protected: &[NodeHandle]) -> usize {
        let mut removed = 0;
        let mut touched_endpoints = Vec::new();
        for &eh in candidates {
            if self.edge(eh).map(|e| e.is_marked_for_deletion()).unwrap_or(false) {
                if let Some(e) = self.edge(eh) {
                    touched_endpoints.push(e.source);
                    touched_endpoints.push(e.target);
                }
                if self.remove_edge(eh).is_ok() {
                    removed += 1;
                }
            }
        }
        for node in touched_endpoints {
            if node == self.stop_node || protected.contains(&node) {
                continue;
            }
            let is_orphan = self.node(node).map(|n| n.outgoing().is_empty() && n.incoming().is_empty()).unwrap_or(false);
            if is_orphan {
                let _ = self.remove_node(node);
            }
        }
        removed
    }

    /// All live node handles, in stable ascending order (needed for
    /// persistence and for replay-deterministic iteration).
    pub fn live_node_handles(&self) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeHandle(i as u32)))
            .collect()
    }

    pub fn live_edge_handles(&self) -> Vec<EdgeHandle> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| EdgeHandle(i as u32)))
            .collect()
    }

    /// Rebuilds a store from an explicit set of node/edge records — used
    /// only by [`crate::persistence::load`], which must reproduce stable
    /// identities exactly.
    pub(crate) fn from_raw_parts(
        nodes: Vec<Option<node::Node>>,
        edges: Vec<Option<edge::Edge>>,
        stats: RunningStats,
    ) -> GraphResult<Self> {
        let mut payload_index = HashMap::with_hasher(RandomState::new());
        let mut stop_node = None;
        let mut live_node_count = 0;
        let mut free_node_slots = Vec::new();
        for (i, slot) in nodes.iter().enumerate() {
            match slot {
                Some(n) => {
                    live_node_count += 1;
                    if n.is_stop() {
                        stop_node = Some(NodeHandle(i as u32));
                    } else {
                        payload_index.insert(PayloadKey::new(&n.payload, n.level), NodeHandle(i as u32));
                    }
                }
                None => free_node_slots.push(i as u32),
            }
        }
        let stop_node = stop_node.ok_or_else(|| GraphError::Corrupt("missing STOP node".into()))?;

        let mut live_edge_count = 0;
        let mut free_edge_slots = Vec::new();
        for (i, slot) in edges.iter().enumerate() {
            if slot.is_some() {
                live_edge_count += 1;
            } else {
                free_edge_slots.push(i as u32);
            }
        }

        // Re-link outgoing/incoming lists from the edge table; the on-disk
        // format doesn't duplicate them.
        let mut nodes = nodes;
        for (i, slot) in edges.iter().enumerate() {
            if let Some(e) = slot {
                let eh = EdgeHandle(i as u32);
                if let Some(Some(src)) = nodes.get_mut(e.source.0 as usize) {
                    src.outgoing.push(eh);
                }
                if let Some(Some(tgt)) = nodes.get_mut(e.target.0 as usize) {
                    tgt.incoming.push(eh);
                }
            }
        }

        Ok(Self {
            nodes,
            edges,
            free_node_slots,
            free_edge_slots,
            payload_index,
            stop_node,
            generation: 0,
            stats,
            live_node_count,
            live_edge_count,
        })
    }

    pub(crate) fn raw_nodes(&self) -> &[Option<node::Node>] {
        &self.nodes
    }

    pub(crate) fn raw_edges(&self) -> &[Option<edge::Edge>] {
        &self.edges
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
