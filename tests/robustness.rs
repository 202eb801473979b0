//! Structural invariant sweeps, driven directly against the graph store /
//! Hebbian / hierarchy modules rather than through `Graph`, so every
//! invariant-bearing field is directly inspectable. Iterates many small
//! randomized cases and asserts invariants hold at every snapshot, rather
//! than a single fixed expectation.

use axon_graph::graph::GraphStore;
use axon_graph::hebbian;
use axon_graph::hierarchy;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const BOOTSTRAP_COUNT: u64 = 10;

/// Runs one random byte sequence through the store-update + Hebbian +
/// hierarchy phases, mirroring `Graph::ingest_inner` without going through
/// the public engine (so the test can inspect the store directly
/// afterward).
fn ingest_once(store: &mut GraphStore, port: u8, bytes: &[u8], timestamp: u64) {
    if bytes.is_empty() {
        return;
    }
    store.stats.record_ingest();

    let mut touched = Vec::new();
    let mut prev = store.find_or_create_node(&bytes[0..1], port);
    for byte in &bytes[1..] {
        let next = store.find_or_create_node(std::slice::from_ref(byte), port);
        touched.push(touch_edge(store, prev, next, timestamp));
        prev = next;
    }
    let stop = store.stop_node();
    touched.push(touch_edge(store, prev, stop, timestamp));

    hierarchy::form_hierarchies(store, BOOTSTRAP_COUNT, port, &touched, timestamp);
}

fn touch_edge(
    store: &mut GraphStore,
    src: axon_graph::graph::NodeHandle,
    tgt: axon_graph::graph::NodeHandle,
    timestamp: u64,
) -> axon_graph::graph::EdgeHandle {
    let local_avg = store.local_avg_weight(src).max(1.0);
    let edge = match store.find_edge(src, tgt) {
        Some(eh) => eh,
        None => store.create_edge(src, tgt, hebbian::initial_weight(local_avg), timestamp).expect("fresh edge"),
    };
    hebbian::strengthen(store, BOOTSTRAP_COUNT, edge, 0.0, None, timestamp);
    edge
}

fn assert_invariants(store: &GraphStore) {
    let mut stop_count = 0;
    for node in store.live_node_handles() {
        let n = store.node(node).unwrap();
        if n.is_stop() {
            stop_count += 1;
        }
        // Outgoing/incoming lists must match the live edge set.
        for &eh in n.outgoing() {
            let e = store.edge(eh).expect("outgoing handle resolves to a live edge");
            assert_eq!(e.source, node, "outgoing list entry's source must be this node");
        }
        for &eh in n.incoming() {
            let e = store.edge(eh).expect("incoming handle resolves to a live edge");
            assert_eq!(e.target, node, "incoming list entry's target must be this node");
        }
    }
    // STOP is a singleton.
    assert!(stop_count <= 1, "STOP node must be a singleton, found {stop_count}");

    // Every live edge's weight is in range, endpoints are live, and no
    // edge survives a completed wave marked for deletion.
    for eh in store.live_edge_handles() {
        let e = store.edge(eh).unwrap();
        let w = e.weight_byte();
        assert!((1..=255).contains(&w), "edge weight {w} out of [1,255]");
        assert!(store.node(e.source).is_some(), "edge source must resolve to a live node");
        assert!(store.node(e.target).is_some(), "edge target must resolve to a live node");
    }
}

/// Across many random ingests of random 1-8 byte inputs, no invariant is
/// violated at any snapshot taken between ingests. Runs a fixed-seed
/// subset large enough to be representative while staying fast and fully
/// reproducible.
#[test]
fn random_ingests_never_violate_invariants() {
    let mut store = GraphStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(1234);

    for i in 0..2_000u64 {
        let len = rng.gen_range(1..=8);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen::<u8>()).collect();
        let port = rng.gen::<u8>();
        ingest_once(&mut store, port, &bytes, i);
        assert_invariants(&store);
    }

    // total_ingests is monotonically non-decreasing.
    assert_eq!(store.stats.total_ingests(), 2_000);
}

/// Hierarchy formation's own invariant: every formed node's payload is the
/// concatenation of its two children's, and its level strictly exceeds
/// both.
#[test]
fn hierarchy_formation_respects_payload_and_level_invariants() {
    let mut store = GraphStore::new();
    let a = store.find_or_create_node(b"a", 0);
    let b = store.find_or_create_node(b"b", 0);
    let e = store.create_edge(a, b, 1.0, 0).unwrap();

    for t in 0..500 {
        hebbian::strengthen(&mut store, BOOTSTRAP_COUNT, e, 0.0, None, t);
    }
    let formed = hierarchy::form_hierarchies(&mut store, BOOTSTRAP_COUNT, 0, &[e], 500);
    assert!(!formed.is_empty());
    for h in formed {
        let node = store.node(h).unwrap();
        assert_eq!(node.payload.as_slice(), b"ab");
        assert!(node.level > store.node(a).unwrap().level.max(store.node(b).unwrap().level));
    }
}

/// Cleanup never runs mid-wave: edges observed below the adaptive floor
/// during propagation stay readable (zero contribution, not absent) until
/// explicitly unlinked by the post-wave pass.
#[test]
fn marked_for_deletion_edges_stay_linked_until_cleanup() {
    let mut store = GraphStore::new();
    let a = store.find_or_create_node(b"a", 0);
    let b = store.find_or_create_node(b"b", 0);
    let e = store.create_edge(a, b, 1.0, 0).unwrap();
    store.edge_mut(e).unwrap().mark_for_deletion();

    assert!(store.edge(e).unwrap().is_marked_for_deletion());
    assert!(store.node(a).unwrap().outgoing().contains(&e), "marking must not unlink until cleanup runs");

    let removed = store.cleanup_marked(&[e], &[]);
    assert_eq!(removed, 1);
    assert!(store.find_edge(a, b).is_none());
}

/// Once its only edge is unlinked, a node left with empty outgoing and
/// incoming lists is disuse-pruned by the same cleanup pass, unless it's in
/// the caller's protected set (e.g. this ingest's own seed nodes).
#[test]
fn orphaned_endpoint_is_pruned_unless_protected() {
    let mut store = GraphStore::new();
    let a = store.find_or_create_node(b"a", 0);
    let b = store.find_or_create_node(b"b", 0);
    let e = store.create_edge(a, b, 1.0, 0).unwrap();
    store.edge_mut(e).unwrap().mark_for_deletion();
    store.cleanup_marked(&[e], &[]);
    assert!(store.node(a).is_none(), "orphaned node with no edges left should be pruned");
    assert!(store.node(b).is_none());

    let c = store.find_or_create_node(b"c", 0);
    let d = store.find_or_create_node(b"d", 0);
    let e2 = store.create_edge(c, d, 1.0, 0).unwrap();
    store.edge_mut(e2).unwrap().mark_for_deletion();
    store.cleanup_marked(&[e2], &[c]);
    assert!(store.node(c).is_some(), "protected seed node must survive even if orphaned");
    assert!(store.node(d).is_none());
}
