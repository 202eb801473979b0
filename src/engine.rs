//! Library surface: the `Graph` handle ties the graph store, Hebbian
//! learning, hierarchy formation, the activation/wave engine, and the
//! decoder into the single `open`/`ingest`/`produce`/`feedback`/`stats`
//! contract external callers depend on.
//!
//! Within one call, the phases run in strict sequential order: store
//! update (find/create nodes, create/strengthen sequential edges) →
//! Hebbian → hierarchy formation → activation/wave → decoder → trail
//! write. No phase yields or suspends; the call is atomic from the
//! caller's perspective.

use std::collections::VecDeque;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::decoder::{self, DecodeTrail};
use crate::errors::GraphResult;
use crate::graph::{EdgeHandle, GraphStore, NodeHandle};
use crate::hebbian;
use crate::hierarchy;
use crate::persistence;
use crate::stats::Stream;
use crate::wave;

/// Read-only view of node/edge counts and running statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub node_count: usize,
    pub edge_count: usize,
    pub total_ingests: u64,
    pub graph_maturity: f64,
    pub numerical_resets: u64,
    pub activation_mean: f64,
    pub activation_stddev: f64,
    pub confidence_mean: f64,
    pub confidence_stddev: f64,
    pub error_mean: f64,
    pub error_stddev: f64,
    pub path_length_mean: f64,
    pub path_length_stddev: f64,
}

impl PartialEq for StatsSnapshot {
    /// Used by the persistence round-trip check: two snapshots are equal
    /// when every field that a caller could observe matches, node/edge
    /// counts foremost.
    fn eq(&self, other: &Self) -> bool {
        self.node_count == other.node_count
            && self.edge_count == other.edge_count
            && self.total_ingests == other.total_ingests
            && self.numerical_resets == other.numerical_resets
    }
}

/// The engine's single handle: an in-memory graph store plus the
/// configuration and PRNG state needed to ingest and decode against it.
pub struct Graph {
    store: GraphStore,
    config: Config,
    rng: ChaCha8Rng,
    last_trail: Option<DecodeTrail>,
    /// Nodes emitted by the most recent decodes, across calls — REFINE's
    /// habituation step attenuates whatever is still in this window, so
    /// content produced recently stays suppressed on the next `produce`
    /// rather than only within a single decode loop.
    habituation: VecDeque<NodeHandle>,
}

impl Graph {
    /// Builds a fresh, empty graph — purely in-memory unless `config`
    /// carries a `persistence_path`, in which case [`Graph::close`] will
    /// flush to it.
    pub fn new(config: Config) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { store: GraphStore::new(), config, rng, last_trail: None, habituation: VecDeque::new() }
    }

    /// Opens the persisted graph at `path` if it exists, or creates a
    /// fresh one bound to that path (flushed on the next [`Graph::close`]).
    /// Failures from a present but unreadable/corrupt file are surfaced,
    /// never silently discarded.
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let config = Config::default().with_persistence_path(path.to_path_buf());
        if path.exists() {
            let store = persistence::load(path)?;
            let rng = match config.rng_seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            Ok(Self { store, config, rng, last_trail: None, habituation: VecDeque::new() })
        } else {
            Ok(Self::new(config))
        }
    }

    /// Flushes cleanly to the configured persistence path, if any, then
    /// consumes the handle. A graph with no `persistence_path` configured
    /// closes as a no-op — closing a purely in-memory graph (e.g. in
    /// tests) cannot fail.
    pub fn close(self) -> GraphResult<()> {
        if let Some(path) = &self.config.persistence_path {
            persistence::save(&self.store, path)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The single write entry point. `ingest(G, p, [])` is a no-op. No
    /// return value on success; the phases run in the order store-update
    /// → Hebbian → hierarchy formation, with no wave or decode — those
    /// belong to [`Graph::produce`] only.
    #[tracing::instrument(level = "debug", skip(self, bytes), fields(port_id, len = bytes.len()))]
    pub fn ingest(&mut self, port_id: u8, bytes: &[u8]) -> GraphResult<()> {
        self.ingest_inner(port_id, bytes)?;
        Ok(())
    }

    /// Shared by `ingest` and `produce`: performs the store-update,
    /// Hebbian, and hierarchy-formation phases, returning the node handles
    /// for each byte of `bytes` in order (needed by `produce` to seed the
    /// wave) and the set of edges touched this call.
    fn ingest_inner(&mut self, port_id: u8, bytes: &[u8]) -> GraphResult<(Vec<NodeHandle>, Vec<EdgeHandle>)> {
        if bytes.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        self.store.stats.record_ingest();
        let timestamp = self.store.stats.total_ingests();

        let mut nodes = Vec::with_capacity(bytes.len());
        let mut touched = Vec::with_capacity(bytes.len());

        let mut prev = self.store.find_or_create_node(&bytes[0..1], port_id);
        nodes.push(prev);
        for byte in &bytes[1..] {
            let next = self.store.find_or_create_node(std::slice::from_ref(byte), port_id);
            touched.push(self.strengthen_co_activation(prev, next, timestamp)?);
            nodes.push(next);
            prev = next;
        }

        // The last byte of this call's sequence is observed as a
        // terminator: strengthen/create its edge to STOP.
        let stop = self.store.stop_node();
        touched.push(self.strengthen_co_activation(prev, stop, timestamp)?);

        let formed = hierarchy::form_hierarchies(&mut self.store, self.config.bootstrap_count, port_id, &touched, timestamp);
        tracing::debug!(hierarchies_formed = formed.len(), "hierarchy formation pass complete");

        Ok((nodes, touched))
    }

    /// Co-activates `src -> tgt`: creates the edge at an adaptive initial
    /// weight if this is the first observation, then applies the Hebbian
    /// update and records both endpoints' context traces as a passive
    /// signal for later context-match scoring.
    fn strengthen_co_activation(&mut self, src: NodeHandle, tgt: NodeHandle, timestamp: u64) -> GraphResult<EdgeHandle> {
        let local_avg = self.store.local_avg_weight(src).max(1.0);
        let edge = match self.store.find_edge(src, tgt) {
            Some(eh) => eh,
            None => self.store.create_edge(src, tgt, hebbian::initial_weight(local_avg), timestamp)?,
        };

        let context_match = self
            .store
            .node(tgt)
            .map(|t| hebbian::context_similarity(&[src], t.context_trace()))
            .unwrap_or(0.0);
        hebbian::strengthen(&mut self.store, self.config.bootstrap_count, edge, context_match, None, timestamp);

        if let Some(n) = self.store.node_mut(src) {
            n.record_context(tgt);
        }
        if let Some(n) = self.store.node_mut(tgt) {
            n.record_context(src);
        }

        Ok(edge)
    }

    /// Runs the ingest phases then ENCODE/REFINE/DECODE, returning the
    /// generated payload. An empty graph or empty query returns an empty
    /// output rather than erroring.
    #[tracing::instrument(level = "debug", skip(self, bytes), fields(port_id, len = bytes.len()))]
    pub fn produce(&mut self, port_id: u8, bytes: &[u8]) -> GraphResult<Vec<u8>> {
        let (nodes, _touched) = self.ingest_inner(port_id, bytes)?;
        let Some(&seed_last) = nodes.last() else {
            self.last_trail = None;
            return Ok(Vec::new());
        };

        let mut field = wave::encode(&mut self.store, &self.config, &nodes);
        tracing::trace!(phase = "wave", visited = field.visited().len(), "ENCODE complete");

        // REFINE attenuates nodes still sitting in the habituation window
        // left over from the *previous* call's decode; DECODE below then
        // extends/evicts that same window for the next call.
        let marked = wave::refine(&mut self.store, &self.config, &mut field, &self.habituation);
        let removed = self.store.cleanup_marked(&marked, &nodes);
        tracing::trace!(phase = "wave", edges_pruned = removed, "REFINE complete, post-wave cleanup run");

        let (output, trail) = decoder::decode(
            &mut self.store,
            &self.config,
            &field,
            seed_last,
            bytes.len().max(1),
            &mut self.rng,
            &mut self.habituation,
        );
        tracing::debug!(phase = "decode", emitted = output.len(), "DECODE complete");
        self.last_trail = Some(trail);

        Ok(output)
    }

    /// Consults the trail of the most recent `produce` call and applies
    /// correction to the edges it walked. A no-op when no decode has
    /// happened yet.
    pub fn feedback(&mut self, error_signal: f32) {
        let timestamp = self.store.stats.total_ingests();
        let trail = self.last_trail.clone();
        crate::feedback::feedback_error(&mut self.store, &self.config, trail.as_ref(), error_signal, timestamp);
    }

    /// Read-only view of node/edge counts and running statistics.
    pub fn stats(&self) -> StatsSnapshot {
        let bc = self.config.bootstrap_count;
        StatsSnapshot {
            node_count: self.store.node_count(),
            edge_count: self.store.edge_count(),
            total_ingests: self.store.stats.total_ingests(),
            graph_maturity: crate::thresholds::graph_maturity(&self.store.stats),
            numerical_resets: self.store.stats.numerical_resets(),
            activation_mean: self.store.stats.mean(Stream::Activation, bc),
            activation_stddev: self.store.stats.stddev(Stream::Activation, bc),
            confidence_mean: self.store.stats.mean(Stream::Confidence, bc),
            confidence_stddev: self.store.stats.stddev(Stream::Confidence, bc),
            error_mean: self.store.stats.mean(Stream::Error, bc),
            error_stddev: self.store.stats.stddev(Stream::Error, bc),
            path_length_mean: self.store.stats.mean(Stream::PathLength, bc),
            path_length_stddev: self.store.stats.stddev(Stream::PathLength, bc),
        }
    }

    /// Draws a `[0, 1)` sample from the engine's own PRNG — exposed only
    /// for property tests that want to exercise [`Graph::feedback`] with
    /// varied but reproducible signals.
    #[cfg(test)]
    pub(crate) fn test_rng_sample(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ingest_is_a_no_op() {
        let mut g = Graph::new(Config::default());
        let before = g.stats();
        g.ingest(0, &[]).unwrap();
        let after = g.stats();
        assert_eq!(before.node_count, after.node_count);
        assert_eq!(before.edge_count, after.edge_count);
    }

    #[test]
    fn produce_on_empty_graph_returns_empty_output() {
        let mut g = Graph::new(Config::default());
        let out = g.produce(0, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn single_byte_trained_repeatedly_prefers_learned_successor() {
        let mut g = Graph::new(Config::default().with_rng_seed(7));
        for _ in 0..10 {
            g.ingest(0, b"AB").unwrap();
        }
        let out = g.produce(0, b"A").unwrap();
        assert_eq!(out, b"B");
    }

    #[test]
    fn feedback_without_prior_decode_does_not_panic_or_mutate() {
        let mut g = Graph::new(Config::default());
        g.ingest(0, b"hi").unwrap();
        let before = g.stats();
        g.feedback(0.5);
        let after = g.stats();
        assert_eq!(before.node_count, after.node_count);
        assert_eq!(before.edge_count, after.edge_count);
    }
}
