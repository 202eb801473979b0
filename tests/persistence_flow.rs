//! Persistence round-trip: `save(G); G' = load(path); stats(G') ==
//! stats(G)`, and every persisted edge weight survives exactly.

use axon_graph::{persistence, Config, Graph};
use std::env::temp_dir;

fn temp_path(name: &str) -> std::path::PathBuf {
    temp_dir().join(format!("axon-graph-itest-{name}-{}.bin", std::process::id()))
}

/// "hello" trained 200 times, then saved and reloaded, has identical
/// node/edge counts and weights before and after.
#[test]
fn repeated_training_survives_save_and_load() {
    let path = temp_path("repeated-training");
    let mut g = Graph::new(Config::default().with_persistence_path(path.clone()));
    for _ in 0..200 {
        g.ingest(1, b"hello").unwrap();
    }
    let before = g.stats();
    g.close().unwrap();

    let g2 = Graph::open(&path).unwrap();
    let after = g2.stats();
    std::fs::remove_file(&path).ok();

    assert_eq!(before, after);
}

/// The round-trip law via the raw `persistence` module: every node and
/// edge present before a save is present after a load, with identical
/// weight, keyed by stable identity (payload).
#[test]
fn persistence_round_trip_preserves_weights_by_identity() {
    use axon_graph::graph::GraphStore;

    let mut store = GraphStore::new();
    let a = store.find_or_create_node(b"abc", 2);
    let b = store.find_or_create_node(b"def", 2);
    let e = store.create_edge(a, b, 200.0, 42).unwrap();
    store.stats.record_ingest();

    let path = temp_path("roundtrip2");
    persistence::save(&store, &path).unwrap();
    let loaded = persistence::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.node_count(), store.node_count());
    assert_eq!(loaded.edge_count(), store.edge_count());
    assert_eq!(loaded.edge(e).unwrap().weight_byte(), store.edge(e).unwrap().weight_byte());
    assert_eq!(loaded.node(a).unwrap().payload.as_slice(), b"abc");
    assert_eq!(loaded.node(b).unwrap().payload.as_slice(), b"def");
}

/// Loading a file that fails the magic/CRC check surfaces a Corrupt error
/// rather than returning a partially-usable graph.
#[test]
fn load_rejects_corrupt_file_without_opening_a_usable_graph() {
    let path = temp_path("corrupt-open");
    std::fs::write(&path, b"definitely not a graph file").unwrap();
    let result = Graph::open(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}
