//! External feedback hook: accepts an error signal for the most recently
//! produced output and updates the terminal node's stop weight plus the
//! last-used edges' weights. Never fails; a missing trail (no prior
//! decode) is a no-op.

use crate::config::Config;
use crate::decoder::DecodeTrail;
use crate::graph::GraphStore;
use crate::hebbian::{self, Accuracy};
use crate::stats::Stream;
use crate::thresholds;

/// Applies `signal ∈ [0, 1]` (clamped, with a logged warning if it arrived
/// out of range, rather than rejected) against the trail left by the most
/// recent decode.
pub fn feedback_error(store: &mut GraphStore, config: &Config, trail: Option<&DecodeTrail>, signal: f32, timestamp: u64) {
    let clamped = if !(0.0..=1.0).contains(&signal) {
        tracing::warn!(signal, "feedback error_signal out of [0,1], clamping");
        signal.clamp(0.0, 1.0)
    } else {
        signal
    };

    let Some(trail) = trail else {
        // Still recorded in running stats, but no graph mutation.
        store.stats.update(Stream::Error, clamped as f64, config.bootstrap_count);
        return;
    };
    if trail.is_empty() {
        store.stats.update(Stream::Error, clamped as f64, config.bootstrap_count);
        return;
    }

    let eta = thresholds::adaptive_rate(&store.stats, Stream::Error, config.bootstrap_count);
    let delta_stop = ((clamped as f64) - 0.5) * eta * 2.0;

    if let Some(terminal) = trail.terminal {
        if let Some(node) = store.node_mut(terminal) {
            node.stop_weight = (node.stop_weight as f64 + delta_stop).clamp(0.0, 10.0) as f32;
        }
    }

    let accuracy = if clamped >= 0.5 { Accuracy::Correct } else { Accuracy::Incorrect };
    for &edge in &trail.edges {
        hebbian::strengthen(store, config.bootstrap_count, edge, 0.0, Some(accuracy), timestamp);
    }

    store.stats.update(Stream::Error, clamped as f64, config.bootstrap_count);
}
