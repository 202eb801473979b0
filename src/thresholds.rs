//! Adaptive-thresholds facade.
//!
//! Every function here is a pure mapping from a [`RunningStats`] snapshot
//! (plus purely local numeric inputs like the current node's out-degree)
//! to a concrete number. Nothing here reads a hardcoded constant that
//! should instead have come from the running statistics; nothing here has
//! side effects.

use crate::stats::{RunningStats, Stream};

/// How much total experience (ingests) it takes for the graph to be
/// considered "mature", feeding both the initial-weight maturity formula
/// and the hierarchy threshold multiplier.
const MATURITY_HALF_LIFE: f64 = 500.0;

/// `graph_maturity` rises from 0 toward 1 as `total_ingests` grows,
/// asymptotically, never fully reaching 1 — a graph is never "done"
/// learning.
pub fn graph_maturity(stats: &RunningStats) -> f64 {
    let n = stats.total_ingests as f64;
    n / (n + MATURITY_HALF_LIFE)
}

/// A graph-wide multiplier on neighbour fan-out. Young graphs (low
/// maturity) spread conservatively; mature ones spread a bit wider,
/// within [0.5, 2.0].
pub fn graph_connectivity_factor(stats: &RunningStats) -> f64 {
    (1.0 + (graph_maturity(stats) - 0.5)).clamp(0.5, 2.0)
}

/// Neighbour iteration limit: `max(1, sqrt(outdegree) * (1 + level) * graph_factor)`.
pub fn neighbour_limit(outdegree: usize, level: u8, stats: &RunningStats) -> usize {
    let raw = (outdegree as f64).sqrt() * (1.0 + level as f64) * graph_connectivity_factor(stats);
    raw.max(1.0).round() as usize
}

/// Weight floor: `max(1, local_avg * 0.1)`.
pub fn weight_floor(local_avg: f64) -> f64 {
    (local_avg * 0.1).max(1.0)
}

/// Weight ceiling: `min(255, local_avg * 2)`.
pub fn weight_ceiling(local_avg: f64) -> f64 {
    (local_avg * 2.0).min(255.0)
}

/// `clip(mean ± 2*stddev, 0, 1)`, used for rate-like quantities (Hebbian
/// learning rates, bonuses) that must stay in a unit range.
pub fn rate_bounds(stats: &RunningStats, stream: Stream, bootstrap_count: u64) -> (f64, f64) {
    let mean = stats.mean(stream, bootstrap_count);
    let sd = stats.stddev(stream, bootstrap_count);
    let lo = (mean - 2.0 * sd).clamp(0.0, 1.0);
    let hi = (mean + 2.0 * sd).clamp(0.0, 1.0);
    if lo <= hi {
        (lo, hi)
    } else {
        (hi, lo)
    }
}

/// A single representative rate drawn from `rate_bounds`'s midpoint —
/// used wherever a scalar rate (`h`, `ε_c`, `ε_a`, `ε_n`) is needed rather
/// than a range.
pub fn adaptive_rate(stats: &RunningStats, stream: Stream, bootstrap_count: u64) -> f64 {
    let (lo, hi) = rate_bounds(stats, stream, bootstrap_count);
    (lo + hi) / 2.0
}

/// Maximum cycle *period* the decoder checks for: `2 * (mean_path +
/// 2*stddev_path)`, clamped into the documented cycle-length range of
/// 1..=10. This is a period bound only — detecting a period of length `p`
/// repeating 3 times needs `3*p` payloads of history, so callers must size
/// their retained history off of `3 * cycle_detection_window(..)`, not off
/// this value directly.
pub fn cycle_detection_window(stats: &RunningStats, bootstrap_count: u64) -> usize {
    let mean_path = stats.mean(Stream::PathLength, bootstrap_count);
    let sd_path = stats.stddev(Stream::PathLength, bootstrap_count);
    let raw = 2.0 * (mean_path + 2.0 * sd_path);
    (raw.round() as usize).clamp(1, 10)
}

/// Hierarchy formation weight multiplier: `1.2 + 0.8 * graph_maturity`.
pub fn hierarchy_weight_multiplier(stats: &RunningStats) -> f64 {
    1.2 + 0.8 * graph_maturity(stats)
}

/// Hierarchy formation relative-strength multiplier:
/// `1.0 + 0.5 * normalised_variance`, where `normalised_variance` is the
/// coefficient of variation of the Activation stream (stddev/mean),
/// clamped to a sane range so a near-zero mean doesn't blow this up.
pub fn hierarchy_relative_multiplier(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    let mean = stats.mean(Stream::Activation, bootstrap_count).max(1e-6);
    let sd = stats.stddev(Stream::Activation, bootstrap_count);
    let variance_norm = (sd / mean).clamp(0.0, 2.0);
    1.0 + 0.5 * variance_norm
}

/// High-percentile activation cutoff used by the suppression step of
/// REFINE: nodes above this are "over-active".
pub fn activation_suppression_cutoff(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    stats.percentile(Stream::Activation, 0.9, bootstrap_count).clamp(0.0, 1.0)
}

/// Variance-dependent softening factor applied to over-active nodes: the
/// more volatile the activation stream, the harder the softening, so a
/// single spiking node doesn't dominate every wave.
pub fn suppression_factor(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    let sd = stats.stddev(Stream::Activation, bootstrap_count);
    (1.0 - sd.clamp(0.0, 0.9)).clamp(0.1, 1.0)
}

/// Weights for the decoder's three scoring components (target activation,
/// relative edge weight, context match) and for REFINE's self/spread/context
/// mix, derived from how much each underlying signal varies: a signal that
/// varies more is carrying more discriminating information this call, so it
/// gets more weight. Always returns weights summing to 1.0.
pub fn variance_weighted_mix(variances: &[f64]) -> Vec<f64> {
    let total: f64 = variances.iter().sum();
    if total <= f64::EPSILON {
        let n = variances.len().max(1);
        return vec![1.0 / n as f64; variances.len()];
    }
    variances.iter().map(|v| v / total).collect()
}

/// Base Hebbian learning rate `h`, drawn from the Activation stream rather
/// than a fixed constant: a graph whose activations run hot learns a
/// little faster per co-activation.
pub fn hebbian_rate(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    adaptive_rate(stats, Stream::Activation, bootstrap_count) * 0.5
}

/// Context-match bonus `ε_c`, drawn from the Confidence stream — context
/// match is itself a confidence-like signal.
pub fn context_bonus_rate(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    adaptive_rate(stats, Stream::Confidence, bootstrap_count) * 0.2
}

/// Accuracy bonus `ε_a` for a confirmed correct prediction.
pub fn accuracy_bonus_rate(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    adaptive_rate(stats, Stream::Confidence, bootstrap_count) * 0.3
}

/// Accuracy penalty `ε_n` for a confirmed incorrect prediction — smaller in
/// magnitude than the bonus, and drawn from the Error stream since it
/// represents a confirmed miss.
pub fn accuracy_penalty_rate(stats: &RunningStats, bootstrap_count: u64) -> f64 {
    adaptive_rate(stats, Stream::Error, bootstrap_count) * 0.15
}

/// Weakening-edges-learn-faster factor:
/// `factor(w / local_avg) ∈ [0.67, 2.0]`, monotonically decreasing in the
/// ratio so an edge far below the local average gets a steep boost and one
/// far above it is throttled.
pub fn hebbian_strength_factor(ratio: f64) -> f64 {
    (2.0 / (1.0 + ratio.max(0.0))).clamp(0.67, 2.0)
}

/// Initial weight for a newly created edge:
/// `0.5 + maturity`, where `maturity = local_avg / (local_avg + 2)`.
pub fn initial_edge_weight(local_avg: f64) -> f64 {
    let maturity = local_avg / (local_avg + 2.0);
    0.5 + maturity
}

/// Temperature for decoder sampling, in [0.1, 1.5], driven by field entropy.
/// High entropy (many near-equal candidates) calls
/// for a lower temperature (commit more confidently is backwards — rather,
/// when the field is already decisive, raising temperature adds useful
/// exploration noise; when undecided, we keep it low to avoid amplifying
/// noise). Entropy is expected pre-normalised into [0, 1].
pub fn decode_temperature(entropy: f64) -> f64 {
    let e = entropy.clamp(0.0, 1.0);
    0.1 + e * (1.5 - 0.1)
}
