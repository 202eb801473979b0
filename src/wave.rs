//! Activation/wave engine.
//!
//! ENCODE seeds an activation field from the input nodes of the current
//! ingest; REFINE iterates spreading, habituation, and suppression until
//! the field stabilises or a hard iteration cap is hit. Edges observed to
//! have fallen below their adaptive floor are flagged during propagation
//! and unlinked only by the post-wave cleanup pass — never mid-step. This
//! ordering is load-bearing: unlinking mid-step would invalidate the
//! neighbour iteration still in progress.

use std::collections::{HashMap, VecDeque};

use ahash::RandomState;

use crate::config::Config;
use crate::graph::{Direction, EdgeHandle, GraphStore, NodeHandle};
use crate::stats::Stream;
use crate::thresholds;

/// A sparse mapping from node handle to activation strength, produced
/// fresh per ingest.
#[derive(Debug, Default)]
pub struct ActivationField {
    activations: HashMap<NodeHandle, f32, RandomState>,
    /// Nodes visited in order, used both for decode initialisation and for
    /// external-feedback path recording.
    visited_order: Vec<NodeHandle>,
    /// The seed set for this ingest — always excluded from decode
    /// candidates, so the decoder never just echoes the query back.
    input_nodes: Vec<NodeHandle>,
}

impl ActivationField {
    pub fn activation(&self, node: NodeHandle) -> f32 {
        self.activations.get(&node).copied().unwrap_or(0.0)
    }

    pub fn set_activation(&mut self, node: NodeHandle, value: f32) {
        if !self.activations.contains_key(&node) {
            self.visited_order.push(node);
        }
        self.activations.insert(node, value);
    }

    pub fn visited(&self) -> &[NodeHandle] {
        &self.visited_order
    }

    pub fn is_input_node(&self, node: NodeHandle) -> bool {
        self.input_nodes.contains(&node)
    }

    pub fn input_nodes(&self) -> &[NodeHandle] {
        &self.input_nodes
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.activations.keys().copied()
    }

    fn sum_abs(&self) -> f64 {
        self.activations.values().map(|v| v.abs() as f64).sum()
    }
}

/// ENCODE: seeds `input_nodes` with `temporal_trace(i) * position_weight(i)`
/// clamped into `[0, 1]`, then spreads once from the last seed along its
/// outgoing edges with a maturity-derived boost so continuation nodes
/// dominate input-node self-activation. The boost is always derived from
/// graph maturity, never a fixed constant.
pub fn encode(store: &mut GraphStore, config: &Config, input_nodes: &[NodeHandle]) -> ActivationField {
    let mut field = ActivationField { input_nodes: input_nodes.to_vec(), ..Default::default() };
    if input_nodes.is_empty() {
        return field;
    }

    let n = input_nodes.len();
    for (i, &node) in input_nodes.iter().enumerate() {
        let temporal_trace = (i + 1) as f64 / n as f64;
        let position_weight = 1.0 - ((n - 1 - i) as f64 / (2.0 * n as f64));
        let activation = (temporal_trace * position_weight).clamp(0.0, 1.0);
        field.set_activation(node, activation as f32);
    }

    let last = *input_nodes.last().unwrap();
    let boost = spread_boost(store, config);
    let neighbours = store.iterate_neighbours(
        last,
        Direction::Outgoing,
        thresholds::neighbour_limit(store.node(last).map(|n| n.out_degree()).unwrap_or(0), store.node(last).map(|n| n.level).unwrap_or(0), &store.stats),
    );
    for eh in neighbours {
        let Some(e) = store.edge(eh) else { continue };
        let target = e.target;
        if field.is_input_node(target) {
            continue;
        }
        let local_avg = store.local_avg_weight(last).max(1.0);
        let spread = (e.weight() / local_avg * boost).clamp(0.0, 1.0);
        let existing = field.activation(target) as f64;
        field.set_activation(target, (existing + spread).clamp(0.0, 1.0) as f32);
    }

    field
}

/// Derived spread boost: asymptotically approaches, but never equals, a
/// ceiling as the graph matures.
fn spread_boost(store: &GraphStore, _config: &Config) -> f64 {
    1.0 + 9.0 * thresholds::graph_maturity(&store.stats)
}

/// REFINE: iterates 2-8 steps (bounded additionally by
/// `config.max_refine_iterations`), applying habituation and suppression
/// each step, and halts early once the field's own change falls below its
/// running stddev. Returns the set of edges that were flagged
/// `marked_for_deletion` during propagation, for the caller's post-wave
/// cleanup pass.
pub fn refine(
    store: &mut GraphStore,
    config: &Config,
    field: &mut ActivationField,
    habituation_window: &VecDeque<NodeHandle>,
) -> Vec<EdgeHandle> {
    let mut touched_edges = Vec::new();
    let maturity = thresholds::graph_maturity(&store.stats);
    let iterations = ((2.0 + maturity * 6.0).round() as usize).clamp(2, 8).min(config.max_refine_iterations.max(1));

    let suppression_cutoff = thresholds::activation_suppression_cutoff(&store.stats, config.bootstrap_count);
    let suppression_factor = thresholds::suppression_factor(&store.stats, config.bootstrap_count);

    for _ in 0..iterations {
        let prior_sum = field.sum_abs();
        let active: Vec<NodeHandle> = field.active_nodes().collect();

        for node in active.iter().copied() {
            let Some(n) = store.node(node) else { continue };
            let level = n.level;
            let outdeg = n.out_degree();
            let limit = thresholds::neighbour_limit(outdeg, level, &store.stats);
            let neighbours = store.iterate_neighbours(node, Direction::Outgoing, limit);

            let self_activation = field.activation(node) as f64;
            let mut spread_sum = 0.0;
            let local_avg = store.local_avg_weight(node).max(1.0);
            let floor = thresholds::weight_floor(local_avg);

            for eh in &neighbours {
                touched_edges.push(*eh);
                let Some(e) = store.edge(*eh) else { continue };
                if e.weight() < floor {
                    store.edge_mut(*eh).unwrap().mark_for_deletion();
                    continue;
                }
                spread_sum += e.weight() / local_avg;
            }
            if !neighbours.is_empty() {
                spread_sum /= neighbours.len() as f64;
            }

            let context_fit = store
                .node(node)
                .map(|n| crate::hebbian::context_similarity(&active, n.context_trace()))
                .unwrap_or(0.0);

            let variances = [
                store.stats.stddev(Stream::Activation, config.bootstrap_count).powi(2),
                store.stats.stddev(Stream::Confidence, config.bootstrap_count).powi(2),
                store.stats.stddev(Stream::Error, config.bootstrap_count).powi(2),
            ];
            let mix = thresholds::variance_weighted_mix(&variances);
            let mut new_activation = mix[0] * self_activation + mix[1] * spread_sum + mix[2] * context_fit;

            // Habituation: attenuate nodes recently emitted by the decoder
            // with an exponential-decay kernel over the recent window.
            if let Some(pos) = habituation_window.iter().rposition(|&h| h == node) {
                let recency = (habituation_window.len() - pos) as f64;
                let decay = (-recency / habituation_window.len().max(1) as f64).exp();
                new_activation *= decay;
            }

            // Suppression: soften nodes above the adaptive high-percentile.
            if new_activation > suppression_cutoff {
                new_activation *= suppression_factor;
            }

            if !new_activation.is_finite() {
                store.stats.update(Stream::Activation, store.stats.mean(Stream::Activation, config.bootstrap_count), config.bootstrap_count);
                new_activation = store.stats.mean(Stream::Activation, config.bootstrap_count);
            }
            field.set_activation(node, new_activation.clamp(0.0, 1.0) as f32);
            store.stats.update(Stream::Activation, new_activation.clamp(0.0, 1.0), config.bootstrap_count);
        }

        let delta = (field.sum_abs() - prior_sum).abs();
        let stddev = store.stats.stddev(Stream::Activation, config.bootstrap_count);
        if delta < stddev {
            break;
        }
    }

    touched_edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::GraphStore;

    #[test]
    fn encode_seeds_and_excludes_input_nodes_by_default() {
        let mut store = GraphStore::new();
        let a = store.find_or_create_node(b"a", 0);
        let b = store.find_or_create_node(b"b", 0);
        let config = Config::default();
        let field = encode(&mut store, &config, &[a, b]);
        assert!(field.activation(b) > 0.0);
        assert!(field.is_input_node(a));
        assert!(field.is_input_node(b));
    }

    #[test]
    fn refine_halts_within_config_bound() {
        let mut store = GraphStore::new();
        let a = store.find_or_create_node(b"a", 0);
        let b = store.find_or_create_node(b"b", 0);
        store.create_edge(a, b, 50.0, 0).unwrap();
        let config = Config { max_refine_iterations: 3, ..Config::default() };
        let mut field = encode(&mut store, &config, &[a]);
        let window = VecDeque::new();
        let touched = refine(&mut store, &config, &mut field, &window);
        // Should not panic and should report some touched edges given a
        // live outgoing edge from the only seed.
        assert!(touched.len() <= 3 * store.edge_count().max(1));
    }

    #[test]
    fn empty_seed_set_produces_empty_field() {
        let mut store = GraphStore::new();
        let config = Config::default();
        let field = encode(&mut store, &config, &[]);
        assert!(field.visited().is_empty());
    }
}
