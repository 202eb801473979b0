//! Autoregressive byte emitter. Starts at the last seed node, scores
//! outgoing edges, competes against the learned stop weight, samples under
//! an entropy-derived temperature, and appends payload bytes until STOP, a
//! dead end, loop suppression, or the adaptive output cap.

use std::collections::VecDeque;

use rand::Rng;

use crate::config::Config;
use crate::graph::{Direction, EdgeHandle, GraphStore, NodeHandle};
use crate::stats::Stream;
use crate::thresholds;
use crate::wave::ActivationField;

/// The ordered list of edges traversed by the most recent decode,
/// consulted by external feedback.
#[derive(Debug, Clone, Default)]
pub struct DecodeTrail {
    pub edges: Vec<EdgeHandle>,
    /// The node the decode finished at by emitting STOP, if it did.
    pub terminal: Option<NodeHandle>,
}

impl DecodeTrail {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.terminal.is_none()
    }
}

/// Runs DECODE starting at `seed_last`, consuming `field`. Returns the
/// emitted bytes and the trail of traversed edges.
pub fn decode(
    store: &mut GraphStore,
    config: &Config,
    field: &ActivationField,
    seed_last: NodeHandle,
    input_len: usize,
    rng: &mut impl Rng,
    habituation: &mut VecDeque<NodeHandle>,
) -> (Vec<u8>, DecodeTrail) {
    let mut output = Vec::new();
    let mut trail = DecodeTrail::default();
    let mut current = seed_last;
    let mut recent_payloads: VecDeque<Vec<u8>> = VecDeque::new();

    let output_cap = adaptive_output_cap(store, config, input_len);
    // `cycle_window` bounds the *period* checked; detecting it repeat 3
    // times needs 3x that many payloads retained, not `cycle_window` itself.
    let cycle_window = thresholds::cycle_detection_window(&store.stats, config.bootstrap_count);
    let history_cap = cycle_window * 3;

    loop {
        if output.len() >= output_cap {
            trail.terminal = Some(current);
            break;
        }

        let outgoing = store.iterate_neighbours(current, Direction::Outgoing, usize::MAX);
        if outgoing.is_empty() {
            trail.terminal = Some(current);
            break;
        }

        let local_avg = store.local_avg_weight(current).max(1.0);

        let mut regular: Vec<(EdgeHandle, NodeHandle, f64)> = Vec::new();
        for eh in &outgoing {
            let Some(e) = store.edge(*eh) else { continue };
            if e.is_to_stop() {
                continue;
            }
            let target = e.target;
            if field.is_input_node(target) {
                continue;
            }
            let target_activation = field.activation(target) as f64;
            let weight_rel = e.weight() / local_avg;
            let context_match = store
                .node(current)
                .map(|n| crate::hebbian::context_similarity(n.context_trace(), store.node(target).map(|t| t.context_trace()).unwrap_or(&[])))
                .unwrap_or(0.0);

            let variances = [
                store.stats.stddev(Stream::Activation, config.bootstrap_count).powi(2),
                store.stats.stddev(Stream::Confidence, config.bootstrap_count).powi(2),
                store.stats.stddev(Stream::Error, config.bootstrap_count).powi(2),
            ];
            let mix = thresholds::variance_weighted_mix(&variances);
            let score = mix[0] * target_activation + mix[1] * weight_rel + mix[2] * context_match;
            regular.push((*eh, target, score));
        }

        let best_score = regular.iter().map(|(_, _, s)| *s).fold(0.0_f64, f64::max);
        let stop_prob = store.node(current).map(|n| n.stop_weight as f64).unwrap_or(0.5);
        let stop_chance = stop_prob / (stop_prob + best_score).max(f64::EPSILON);

        // `regular.is_empty()` short-circuits before drawing from `rng` so
        // the RNG consumption order matches the no-candidates case exactly.
        let stopped = if regular.is_empty() {
            tracing::trace!(stop_prob, best_score, stop_chance, "STOP competition: no continuation candidates");
            true
        } else {
            let stop_draw = rng.gen::<f64>();
            let stopped = stop_chance > stop_draw;
            tracing::trace!(stop_prob, best_score, stop_chance, stop_draw, stopped, "STOP competition");
            stopped
        };

        if stopped {
            trail.terminal = Some(current);
            break;
        }

        let entropy = field_entropy(&regular);
        let temperature = thresholds::decode_temperature(entropy);
        let chosen = sample_softmax(&regular, temperature, rng);
        let (edge, target, chosen_score) = regular[chosen];
        store.stats.update(Stream::Confidence, chosen_score.clamp(0.0, 1.0), config.bootstrap_count);

        trail.edges.push(edge);
        if let Some(payload) = store.node(target).map(|n| n.payload.as_slice().to_vec()) {
            output.extend_from_slice(&payload);
            recent_payloads.push_back(payload);
            if recent_payloads.len() > history_cap {
                recent_payloads.pop_front();
            }
        }

        if habituation.len() == config.habituation_window.max(1) {
            habituation.pop_front();
        }
        habituation.push_back(target);

        if let Some(n) = store.node_mut(current) {
            n.record_context(target);
        }
        if let Some(n) = store.node_mut(target) {
            n.record_context(current);
        }

        if is_repeating_cycle(&recent_payloads, cycle_window) && !exceeds_cycle_strength(store, target, local_avg) {
            trail.terminal = Some(target);
            break;
        }

        let out_degree = store.node(target).map(|n| n.out_degree()).unwrap_or(0);
        current = target;
        if out_degree == 0 {
            trail.terminal = Some(current);
            break;
        }
    }

    store.stats.update(Stream::PathLength, trail.edges.len() as f64, config.bootstrap_count);
    (output, trail)
}

/// Absolute ceiling on generated length: `input_len * output_cap_multiplier
/// * f(maturity, path_stats, connectivity)`.
fn adaptive_output_cap(store: &GraphStore, config: &Config, input_len: usize) -> usize {
    let maturity = thresholds::graph_maturity(&store.stats);
    let path_mean = store.stats.mean(Stream::PathLength, config.bootstrap_count);
    let connectivity = thresholds::graph_connectivity_factor(&store.stats);
    let f = (0.5 + 0.5 * maturity) * (1.0 + (path_mean / 20.0).min(1.0)) * connectivity;
    let raw = (input_len.max(1) as f64) * config.output_cap_multiplier as f64 * f;
    (raw.round() as usize).max(1)
}

fn field_entropy(candidates: &[(EdgeHandle, NodeHandle, f64)]) -> f64 {
    let total: f64 = candidates.iter().map(|(_, _, s)| s.max(0.0)).sum();
    if total <= f64::EPSILON || candidates.len() < 2 {
        return 0.0;
    }
    let entropy: f64 = candidates
        .iter()
        .map(|(_, _, s)| {
            let p = (s.max(0.0) / total).max(1e-9);
            -p * p.ln()
        })
        .sum();
    let max_entropy = (candidates.len() as f64).ln();
    if max_entropy <= f64::EPSILON {
        0.0
    } else {
        (entropy / max_entropy).clamp(0.0, 1.0)
    }
}

fn sample_softmax(candidates: &[(EdgeHandle, NodeHandle, f64)], temperature: f64, rng: &mut impl Rng) -> usize {
    let t = temperature.max(0.01);
    let max_score = candidates.iter().map(|(_, _, s)| *s).fold(f64::MIN, f64::max);
    let weights: Vec<f64> = candidates.iter().map(|(_, _, s)| ((s - max_score) / t).exp()).collect();
    let total: f64 = weights.iter().sum();
    if total <= f64::EPSILON {
        return 0;
    }
    let mut draw = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        draw -= w;
        if draw <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}

/// Loop suppression: do the last emitted payloads form a repeating cycle of
/// length `1..=max_period` with at least 3 repetitions? The caller is
/// expected to retain at least `3 * max_period` payloads of history —
/// otherwise periods near `max_period` could never reach 3 repetitions.
fn is_repeating_cycle(recent: &VecDeque<Vec<u8>>, max_period: usize) -> bool {
    let recent: Vec<&Vec<u8>> = recent.iter().collect();
    let n = recent.len();
    for period in 1..=max_period.min(n / 3) {
        let reps = n / period;
        if reps < 3 {
            continue;
        }
        let window = &recent[n - period * reps..];
        let mut cyclical = true;
        'outer: for i in 0..period {
            let first = window[i];
            for r in 1..reps {
                if window[r * period + i] != first {
                    cyclical = false;
                    break 'outer;
                }
            }
        }
        if cyclical {
            return true;
        }
    }
    false
}

/// Whether an outgoing edge from `node` leads outside the current cycle
/// with strength above `local_avg` — if so the cycle is not yet
/// degenerate and decoding may continue.
fn exceeds_cycle_strength(store: &GraphStore, node: NodeHandle, local_avg: f64) -> bool {
    store
        .node(node)
        .map(|n| n.outgoing().iter().filter_map(|eh| store.edge(*eh)).any(|e| !e.is_to_stop() && e.weight() > local_avg))
        .unwrap_or(false)
}
