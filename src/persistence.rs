//! File format: binary container with a fixed header, contiguous node and
//! edge tables, and a running-statistics block. Field widths and ordering
//! are fixed here as a concrete on-disk contract.
//!
//! Endianness is always little-endian; the header's endianness byte is
//! written as `0` and any other value on load is treated as Corruption.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::errors::{GraphError, GraphResult};
use crate::graph::edge::{Edge, EdgeFlags};
use crate::graph::node::{Node, NodeFlags, Payload, MAX_PAYLOAD_LEN};
use crate::graph::{GraphStore, NodeHandle};
use crate::stats::{RunningStats, Stream, Welford};

const MAGIC: [u8; 4] = *b"MLVN";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 1 + 4 + 4 + 4;
const NODE_RECORD_LEN: usize = 8 + 1 + MAX_PAYLOAD_LEN + 1 + 1 + 4 + 1;
const EDGE_RECORD_LEN: usize = 8 + 8 + 1 + 1 + 8 + 8;
const STREAM_ORDER: [Stream; 4] = [Stream::Activation, Stream::Confidence, Stream::Error, Stream::PathLength];
const WELFORD_RECORD_LEN: usize = 8 + 8 + 8;
const STATS_BLOCK_LEN: usize = WELFORD_RECORD_LEN * 4 + 8 + 8; // + total_ingests + numerical_resets

/// `save(store, path)`: writes the header, node table, edge table, and
/// running-statistics block in one pass.
pub fn save(store: &GraphStore, path: impl AsRef<Path>) -> GraphResult<()> {
    let mut body = Vec::new();

    for handle in store.live_node_handles() {
        let node = store.node(handle).expect("live handle resolves");
        write_node_record(&mut body, handle, node);
    }
    for handle in store.live_edge_handles() {
        let edge = store.edge(handle).expect("live handle resolves");
        write_edge_record(&mut body, edge);
    }
    write_stats_block(&mut body, &store.stats);

    let crc = crc32fast::hash(&body);

    let file = File::create(path.as_ref()).map_err(GraphError::Io)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&MAGIC).map_err(GraphError::Io)?;
    writer.write_all(&VERSION.to_le_bytes()).map_err(GraphError::Io)?;
    writer.write_all(&[0u8]).map_err(GraphError::Io)?; // endianness: little
    writer.write_all(&(store.node_count() as u32).to_le_bytes()).map_err(GraphError::Io)?;
    writer.write_all(&(store.edge_count() as u32).to_le_bytes()).map_err(GraphError::Io)?;
    writer.write_all(&crc.to_le_bytes()).map_err(GraphError::Io)?;
    writer.write_all(&body).map_err(GraphError::Io)?;
    writer.flush().map_err(GraphError::Io)?;
    Ok(())
}

/// `load(path)`: rejects magic/version/endianness/CRC mismatches as
/// corruption without constructing a usable graph.
pub fn load(path: impl AsRef<Path>) -> GraphResult<GraphStore> {
    let file = File::open(path.as_ref()).map_err(GraphError::Io)?;
    let mut reader = BufReader::new(file);
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(GraphError::Io)?;

    if header[0..4] != MAGIC {
        return Err(GraphError::Corrupt("bad magic".into()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(GraphError::Corrupt(format!("unsupported version {version}")));
    }
    if header[6] != 0 {
        return Err(GraphError::Corrupt("unsupported endianness flag".into()));
    }
    let node_count = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    let edge_count = u32::from_le_bytes([header[11], header[12], header[13], header[14]]) as usize;
    let expected_crc = u32::from_le_bytes([header[15], header[16], header[17], header[18]]);

    let mut body = Vec::new();
    reader.read_to_end(&mut body).map_err(GraphError::Io)?;
    let actual_crc = crc32fast::hash(&body);
    if actual_crc != expected_crc {
        return Err(GraphError::Corrupt("CRC mismatch".into()));
    }

    let expected_len = node_count * NODE_RECORD_LEN + edge_count * EDGE_RECORD_LEN + STATS_BLOCK_LEN;
    if body.len() != expected_len {
        return Err(GraphError::Corrupt("body length does not match header counts".into()));
    }

    let mut cursor = 0usize;
    let mut max_node_id = 0u64;
    let mut raw_nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let (id, node) = read_node_record(&body[cursor..cursor + NODE_RECORD_LEN]);
        cursor += NODE_RECORD_LEN;
        max_node_id = max_node_id.max(id);
        raw_nodes.push((id, node));
    }

    let mut raw_edges = Vec::with_capacity(edge_count);
    for _ in 0..edge_count {
        let edge = read_edge_record(&body[cursor..cursor + EDGE_RECORD_LEN]);
        cursor += EDGE_RECORD_LEN;
        raw_edges.push(edge);
    }

    let stats = read_stats_block(&body[cursor..cursor + STATS_BLOCK_LEN]);
    cursor += STATS_BLOCK_LEN;
    debug_assert_eq!(cursor, body.len());

    let mut nodes: Vec<Option<Node>> = (0..=max_node_id).map(|_| None).collect();
    for (id, node) in raw_nodes {
        nodes[id as usize] = Some(node);
    }

    let edges: Vec<Option<Edge>> = raw_edges.into_iter().map(Some).collect();

    GraphStore::from_raw_parts(nodes, edges, stats)
}

fn write_node_record(out: &mut Vec<u8>, handle: NodeHandle, node: &Node) {
    out.extend_from_slice(&(handle.0 as u64).to_le_bytes());
    let payload = node.payload.as_slice();
    out.push(payload.len() as u8);
    let mut padded = [0u8; MAX_PAYLOAD_LEN];
    padded[..payload.len()].copy_from_slice(payload);
    out.extend_from_slice(&padded);
    out.push(node.level);
    out.push(node.port);
    out.extend_from_slice(&node.stop_weight.to_le_bytes());
    out.push(node.flags.bits());
}

fn read_node_record(buf: &[u8]) -> (u64, Node) {
    let id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let payload_len = buf[8] as usize;
    let payload_bytes = &buf[9..9 + MAX_PAYLOAD_LEN];
    let level = buf[9 + MAX_PAYLOAD_LEN];
    let port = buf[10 + MAX_PAYLOAD_LEN];
    let stop_weight = f32::from_le_bytes(buf[11 + MAX_PAYLOAD_LEN..15 + MAX_PAYLOAD_LEN].try_into().unwrap());
    let flags_byte = buf[15 + MAX_PAYLOAD_LEN];

    let payload = Payload::from_slice(&payload_bytes[..payload_len]);
    let flags = NodeFlags::from_bits_truncate(flags_byte);
    let node = Node::from_persisted(payload, level, port, stop_weight, flags);
    (id, node)
}

fn write_edge_record(out: &mut Vec<u8>, edge: &Edge) {
    out.extend_from_slice(&(edge.source.0 as u64).to_le_bytes());
    out.extend_from_slice(&(edge.target.0 as u64).to_le_bytes());
    out.push(edge.weight_byte());
    out.push(edge.flags.bits());
    out.extend_from_slice(&edge.usage_counter.to_le_bytes());
    out.extend_from_slice(&edge.last_strengthened.to_le_bytes());
}

fn read_edge_record(buf: &[u8]) -> Edge {
    let source = NodeHandle(u64::from_le_bytes(buf[0..8].try_into().unwrap()) as u32);
    let target = NodeHandle(u64::from_le_bytes(buf[8..16].try_into().unwrap()) as u32);
    let weight = buf[16];
    let flags = EdgeFlags::from_bits_truncate(buf[17]);
    let usage_counter = u64::from_le_bytes(buf[18..26].try_into().unwrap());
    let last_strengthened = u64::from_le_bytes(buf[26..34].try_into().unwrap());
    Edge::from_persisted(source, target, weight, usage_counter, last_strengthened, flags)
}

fn write_stats_block(out: &mut Vec<u8>, stats: &RunningStats) {
    for stream in STREAM_ORDER {
        let w = stats.raw_welford(stream);
        out.extend_from_slice(&w.mean.to_le_bytes());
        out.extend_from_slice(&w.m2.to_le_bytes());
        out.extend_from_slice(&w.count.to_le_bytes());
    }
    out.extend_from_slice(&stats.total_ingests.to_le_bytes());
    out.extend_from_slice(&stats.numerical_resets.to_le_bytes());
}

fn read_stats_block(buf: &[u8]) -> RunningStats {
    let mut stats = RunningStats::new();
    let mut cursor = 0;
    for stream in STREAM_ORDER {
        let mean = f64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        let m2 = f64::from_le_bytes(buf[cursor + 8..cursor + 16].try_into().unwrap());
        let count = u64::from_le_bytes(buf[cursor + 16..cursor + 24].try_into().unwrap());
        stats.set_raw_welford(stream, Welford { mean, m2, count });
        cursor += WELFORD_RECORD_LEN;
    }
    stats.total_ingests = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
    cursor += 8;
    stats.numerical_resets = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use std::env::temp_dir;

    fn temp_path(name: &str) -> std::path::PathBuf {
        temp_dir().join(format!("axon-graph-test-{name}-{}.bin", std::process::id()))
    }

    #[test]
    fn round_trips_node_and_edge_state() {
        let mut store = GraphStore::new();
        let a = store.find_or_create_node(b"hello", 1);
        let b = store.find_or_create_node(b"world", 1);
        let e = store.create_edge(a, b, 123.0, 7).unwrap();
        store.stats.record_ingest();

        let path = temp_path("roundtrip");
        save(&store, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.node_count(), store.node_count());
        assert_eq!(loaded.edge_count(), store.edge_count());
        assert_eq!(loaded.edge(e).unwrap().weight_byte(), store.edge(e).unwrap().weight_byte());
        assert_eq!(loaded.node(a).unwrap().payload.as_slice(), b"hello");
    }

    #[test]
    fn rejects_corrupt_magic() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"NOTMLVNSTUFF").unwrap();
        let result = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(GraphError::Corrupt(_))));
    }
}
