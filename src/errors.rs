use thiserror::Error;

/// Error taxonomy surfaced across the public boundary.
///
/// Numerical and contract-violation failures are handled internally — the
/// offending quantity is reset to its stream mean, or the argument is
/// clamped — and never reach the caller as a `GraphError`. Only
/// structural, corruption, and I/O failures are represented here.
///
/// Two classes named by the error taxonomy this engine was designed
/// against are deliberately absent:
///
/// - A non-adjacent-hierarchy structural error: `hierarchy::form_hierarchies`
///   only ever derives a candidate pair from an already-live edge's own
///   `(source, target)`, so there is no call path that can hand it
///   non-adjacent endpoints. Adding a variant for a condition the code can
///   never reach would be dead error-handling, not a real safeguard.
/// - A resource/allocation error with ingest rollback: ingest never takes a
///   fallible allocation path of its own (`Vec` growth aborts the process
///   rather than returning a `Result` in safe Rust), so the only genuine
///   fatal resource-class failure this engine can hit is I/O at the
///   persistence boundary, already covered by `Io`.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("edge already exists from {source:?} to {target:?}")]
    DuplicateEdge { source: crate::graph::NodeHandle, target: crate::graph::NodeHandle },

    #[error("node {0:?} does not exist")]
    NoSuchNode(crate::graph::NodeHandle),

    #[error("edge {0:?} does not exist")]
    NoSuchEdge(crate::graph::EdgeHandle),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted graph is corrupt: {0}")]
    Corrupt(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
