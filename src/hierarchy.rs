//! Hierarchy formation module.
//!
//! After each ingest, every edge that was just strengthened is a candidate:
//! if it is dominant enough relative to its source's local average weight,
//! under variance-adaptive thresholds, its endpoints are fused into a new
//! node one abstraction level up. Hierarchies may recursively combine, so
//! formation runs as a loop to fixpoint, bounded by the adaptive pattern
//! match limit (`max_level + 4`).

use crate::graph::{Direction, EdgeFlags, EdgeHandle, GraphStore, NodeHandle};
use crate::hebbian;
use crate::thresholds;

/// Decides whether the edge currently meets the dominance + relative
/// strength bar for fusing its endpoints. Both thresholds are
/// variance-adaptive, not hardcoded.
fn should_form(store: &mut GraphStore, edge: EdgeHandle, bootstrap_count: u64) -> bool {
    let Some(e) = store.edge(edge) else { return false };
    if e.is_to_stop() {
        return false;
    }
    let source = e.source;
    let weight = e.weight();
    let local_avg = store.local_avg_weight(source).max(1.0);

    let weight_mult = thresholds::hierarchy_weight_multiplier(&store.stats);
    let relative_mult = thresholds::hierarchy_relative_multiplier(&store.stats, bootstrap_count);

    weight > local_avg * weight_mult && (weight / local_avg) > relative_mult
}

/// Creates a forward-only continuation edge from the new hierarchy node
/// `h` to whatever `child_b` had learned as its strongest continuation, if
/// any. Never creates a reverse edge.
fn link_continuation(store: &mut GraphStore, h: NodeHandle, child_b: NodeHandle, timestamp: u64) {
    let best = store
        .node(child_b)
        .and_then(|n| {
            n.outgoing()
                .iter()
                .copied()
                .filter_map(|eh| store.edge(eh).map(|e| (eh, e.weight())))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(_, w)| w);

    let Some(best_weight) = best else { return };
    let continuation_target = store
        .node(child_b)
        .unwrap()
        .outgoing()
        .iter()
        .copied()
        .find(|&eh| store.edge(eh).map(|e| e.weight() == best_weight).unwrap_or(false))
        .and_then(|eh| store.edge(eh).map(|e| e.target));

    if let Some(target) = continuation_target {
        if target == h || store.find_edge(h, target).is_some() {
            return;
        }
        let local_avg = store.local_avg_weight(h).max(1.0);
        let w = hebbian::initial_weight(local_avg);
        let _ = store.create_edge(h, target, w, timestamp);
    }
}

/// Runs hierarchy formation to fixpoint over the edges touched by the
/// current ingest. Returns the handles of every hierarchy node newly
/// formed this call, in formation order.
pub fn form_hierarchies(
    store: &mut GraphStore,
    bootstrap_count: u64,
    port: u8,
    touched: &[EdgeHandle],
    timestamp: u64,
) -> Vec<NodeHandle> {
    let mut formed = Vec::new();
    let mut frontier: Vec<EdgeHandle> = touched.to_vec();

    let local_max_level = touched
        .iter()
        .filter_map(|&eh| store.edge(eh))
        .map(|e| e.source)
        .chain(touched.iter().filter_map(|&eh| store.edge(eh)).map(|e| e.target))
        .filter_map(|n| store.node(n))
        .map(|n| n.level)
        .max()
        .unwrap_or(0);
    let max_passes = local_max_level as usize + 4;

    for _ in 0..max_passes {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();

        for eh in frontier {
            let Some(e) = store.edge(eh) else { continue };
            let (a, b) = (e.source, e.target);
            if !should_form(store, eh, bootstrap_count) {
                continue;
            }
            let (Some(na), Some(nb)) = (store.node(a), store.node(b)) else { continue };
            let level = na.level.max(nb.level) + 1;
            let payload = crate::graph::Payload::concat(&na.payload, &nb.payload);

            let existed = store.find_node(payload.as_slice(), level).is_some();
            let h = store.find_or_create_node_at_level(payload.as_slice(), level, port);
            if existed {
                // Already formed in an earlier ingest; don't re-link or
                // re-report it, but it can still seed further recursion.
                continue;
            }

            link_continuation(store, h, b, timestamp);
            formed.push(h);

            // `h` may itself combine with whatever it now points to, and
            // whatever points into `a` may now prefer to combine with `h`
            // instead — queue both directions for the next pass.
            for outgoing in store.iterate_neighbours(h, Direction::Outgoing, usize::MAX) {
                next_frontier.push(outgoing);
            }
            for incoming in store.iterate_neighbours(a, Direction::Incoming, usize::MAX) {
                if store.edge(incoming).map(|e| !e.flags.contains(EdgeFlags::TO_STOP)).unwrap_or(false) {
                    next_frontier.push(incoming);
                }
            }
        }

        frontier = next_frontier;
    }

    formed
}
