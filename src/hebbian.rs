//! Hebbian learning module.
//!
//! Every co-activation applies a precise update combining three signals:
//! base Hebbian co-firing, a context-match bonus, and an optional
//! accuracy bonus/penalty from confirmed predictions. The delta is applied
//! in fixed-point, scaled by distance to the adaptive ceiling, so repeated
//! application converges toward it rather than overshooting.

use crate::graph::{EdgeHandle, GraphStore, NodeHandle};
use crate::thresholds;

/// A confirmed prediction outcome used for the accuracy-bonus term.
/// `None` means no signal is available this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Correct,
    Incorrect,
}

/// Similarity between a live context (e.g. the decoder's recent window, or
/// a node's own context trace during a co-activation) and a target node's
/// stored context trace: the fraction of entries in `live` that also
/// appear in `target_trace`. Returns 0.0 for an empty live context.
pub fn context_similarity(live: &[NodeHandle], target_trace: &[NodeHandle]) -> f64 {
    if live.is_empty() {
        return 0.0;
    }
    let matches = live.iter().filter(|n| target_trace.contains(n)).count();
    matches as f64 / live.len() as f64
}

/// Strengthens `edge` following a co-activation, combining the three
/// Hebbian signals. `context_match` is the live/target trace similarity in
/// `[0, 1]`; `accuracy` is the confirmed-prediction signal, if any.
///
/// Returns the applied delta (before fixed-point convergence scaling),
/// mostly useful for diagnostics/tests.
pub fn strengthen(
    store: &mut GraphStore,
    bootstrap_count: u64,
    edge: EdgeHandle,
    context_match: f64,
    accuracy: Option<Accuracy>,
    timestamp: u64,
) -> f64 {
    let Some(e) = store.edge(edge) else { return 0.0 };
    let source = e.source;
    let w = e.weight();
    let local_avg = store.local_avg_weight(source).max(1.0);

    let ratio = w / local_avg;
    let h = thresholds::hebbian_rate(&store.stats, bootstrap_count);
    let base_hebbian = h * (1.0 / (w + 1.0).sqrt()) * thresholds::hebbian_strength_factor(ratio);

    let context_bonus = if context_match > 0.8 {
        thresholds::context_bonus_rate(&store.stats, bootstrap_count)
    } else {
        0.0
    };

    let accuracy_bonus = match accuracy {
        Some(Accuracy::Correct) => thresholds::accuracy_bonus_rate(&store.stats, bootstrap_count),
        Some(Accuracy::Incorrect) => -thresholds::accuracy_penalty_rate(&store.stats, bootstrap_count),
        None => 0.0,
    };

    let raw_delta = base_hebbian + context_bonus + accuracy_bonus;

    let ceiling = thresholds::weight_ceiling(local_avg);
    let floor = thresholds::weight_floor(local_avg);
    // Converging application: scale by remaining headroom to the ceiling
    // so the weight asymptotically approaches it instead of overshooting
    // on a single large delta.
    let headroom = (ceiling - w).max(0.0);
    let converging_delta = raw_delta * headroom;

    if let Some(edge_mut) = store.edge_mut(edge) {
        let new_w = (w + converging_delta).clamp(floor, 255.0);
        edge_mut.set_weight(new_w);
        edge_mut.usage_counter += 1;
        edge_mut.last_strengthened = timestamp;
    }

    raw_delta
}

/// Initial weight for a freshly created edge: looked up from `local_avg`
/// via [`thresholds::initial_edge_weight`]. Exposed here
/// since ingest needs it at edge-creation time, before any strengthening
/// has happened.
pub fn initial_weight(local_avg: f64) -> f64 {
    thresholds::initial_edge_weight(local_avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;

    #[test]
    fn strengthening_moves_weight_toward_ceiling_without_overshoot() {
        let mut store = GraphStore::new();
        let a = store.find_or_create_node(b"a", 0);
        let b = store.find_or_create_node(b"b", 0);
        let e = store.create_edge(a, b, 1.0, 0).unwrap();

        let mut last_w = store.edge(e).unwrap().weight();
        for t in 1..200 {
            strengthen(&mut store, 10, e, 0.0, None, t);
            let w = store.edge(e).unwrap().weight();
            assert!(w >= last_w - f64::EPSILON, "weight should never decrease under pure strengthening");
            assert!((1.0..=255.0).contains(&w));
            last_w = w;
        }
    }

    #[test]
    fn context_similarity_bounds() {
        let a = NodeHandle(1);
        let b = NodeHandle(2);
        let c = NodeHandle(3);
        assert_eq!(context_similarity(&[], &[a, b]), 0.0);
        assert_eq!(context_similarity(&[a, b], &[a, b, c]), 1.0);
        assert_eq!(context_similarity(&[a, c], &[a]), 0.5);
    }

    #[test]
    fn accuracy_penalty_does_not_drop_below_floor() {
        let mut store = GraphStore::new();
        let a = store.find_or_create_node(b"a", 0);
        let b = store.find_or_create_node(b"b", 0);
        let e = store.create_edge(a, b, 1.0, 0).unwrap();
        for t in 0..50 {
            strengthen(&mut store, 10, e, 0.0, Some(Accuracy::Incorrect), t);
        }
        let w = store.edge(e).unwrap().weight();
        assert!(w >= 1.0);
    }
}
