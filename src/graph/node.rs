use bitflags::bitflags;
use smallvec::SmallVec;

use super::EdgeHandle;

/// Stable identifier for a node. Indexes directly into the graph store's
/// flat node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u32);

/// Maximum raw byte payload a node may carry (typically 1-16 bytes). Fixed
/// so the persisted node record has a constant size.
pub const MAX_PAYLOAD_LEN: usize = 16;

/// A node's byte payload: 1..=16 raw bytes for a leaf node, or the
/// concatenation of two children's payloads for a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Payload {
    len: u8,
    bytes: [u8; MAX_PAYLOAD_LEN],
}

impl Payload {
    /// Builds a payload from a slice, truncating silently past
    /// `MAX_PAYLOAD_LEN` — callers (hierarchy formation) are responsible
    /// for not growing payloads past the point where truncation would
    /// change emitted bytes; ingest always deals in single bytes.
    pub fn from_slice(data: &[u8]) -> Self {
        let len = data.len().min(MAX_PAYLOAD_LEN);
        let mut bytes = [0u8; MAX_PAYLOAD_LEN];
        bytes[..len].copy_from_slice(&data[..len]);
        Self { len: len as u8, bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenates two payloads, truncating to `MAX_PAYLOAD_LEN` if the
    /// combination would overflow. A hierarchy node's payload is always
    /// the concatenation of its two children's.
    pub fn concat(a: &Payload, b: &Payload) -> Self {
        let mut bytes = [0u8; MAX_PAYLOAD_LEN];
        let a_slice = a.as_slice();
        let b_slice = b.as_slice();
        let a_len = a_slice.len().min(MAX_PAYLOAD_LEN);
        bytes[..a_len].copy_from_slice(&a_slice[..a_len]);
        let remaining = MAX_PAYLOAD_LEN - a_len;
        let b_len = b_slice.len().min(remaining);
        bytes[a_len..a_len + b_len].copy_from_slice(&b_slice[..b_len]);
        Self { len: (a_len + b_len) as u8, bytes }
    }
}

bitflags! {
    /// Packed per-node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// The process-wide singleton STOP node.
        const IS_STOP = 0b0000_0001;
    }
}

/// A node in the graph store.
///
/// Essential fields are persisted as-is. Runtime-only fields (edge handles,
/// cached sums, activation, context trace) are recomputable and never
/// written to disk.
#[derive(Debug, Clone)]
pub struct Node {
    pub payload: Payload,
    pub level: u8,
    pub port: u8,
    pub stop_weight: f32,
    pub flags: NodeFlags,

    // --- runtime-only ---
    pub(crate) outgoing: Vec<EdgeHandle>,
    pub(crate) incoming: Vec<EdgeHandle>,
    /// Cached sum of outgoing edge weights, paired with the store
    /// generation it was computed at. `None` means never computed.
    pub(crate) cached_outgoing_sum: Option<(u64, f64)>,
    /// Activation strength for the current wave. Reset at the start of
    /// each ENCODE.
    pub(crate) activation: f32,
    /// Small fixed-length ring of recently co-active neighbours, used by
    /// Hebbian's context-match bonus and the decoder's context-match
    /// scoring component. A passive record, not a per-edge context tag.
    pub(crate) context_trace: SmallVec<[NodeHandle; 4]>,
}

impl Node {
    pub fn new_leaf(payload: Payload, port: u8) -> Self {
        Self {
            payload,
            level: 0,
            port,
            stop_weight: 0.5,
            flags: NodeFlags::empty(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            cached_outgoing_sum: None,
            activation: 0.0,
            context_trace: SmallVec::new(),
        }
    }

    pub fn new_stop() -> Self {
        let mut n = Self::new_leaf(Payload::from_slice(&[]), 0);
        n.flags.insert(NodeFlags::IS_STOP);
        n
    }

    pub fn new_hierarchy(payload: Payload, level: u8, port: u8) -> Self {
        let mut n = Self::new_leaf(payload, port);
        n.level = level;
        n
    }

    /// Reconstructs a node from its persisted fields, used only by
    /// [`crate::persistence::load`]. Runtime-only fields (edge lists,
    /// cached sums, activation, context trace) start empty/default, as
    /// they are recomputable and never persisted.
    pub(crate) fn from_persisted(payload: Payload, level: u8, port: u8, stop_weight: f32, flags: NodeFlags) -> Self {
        Self {
            payload,
            level,
            port,
            stop_weight,
            flags,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            cached_outgoing_sum: None,
            activation: 0.0,
            context_trace: SmallVec::new(),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.flags.contains(NodeFlags::IS_STOP)
    }

    pub fn outgoing(&self) -> &[EdgeHandle] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[EdgeHandle] {
        &self.incoming
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }

    /// Pushes a neighbour onto the context trace, evicting the oldest
    /// entry once the ring is full.
    pub fn record_context(&mut self, neighbour: NodeHandle) {
        const CAPACITY: usize = 4;
        if self.context_trace.len() == CAPACITY {
            self.context_trace.remove(0);
        }
        self.context_trace.push(neighbour);
    }

    pub fn context_trace(&self) -> &[NodeHandle] {
        &self.context_trace
    }

    pub fn activation(&self) -> f32 {
        self.activation
    }

    pub(crate) fn invalidate_cache(&mut self) {
        self.cached_outgoing_sum = None;
    }
}
