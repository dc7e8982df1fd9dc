//! MeshError: Unified error type for mesh-refine public APIs
//!
//! Every fallible operation in the crate returns this error. Variants that
//! describe a broken collective contract (mismatched arguments, a peer that
//! never answers, malformed payloads) are fatal for the whole distributed
//! run: the caller is expected to abort every rank rather than retry.

use thiserror::Error;

/// Unified error type for mesh-refine operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// A tag lookup failed.
    #[error("no tag `{name}` on dimension {dim}")]
    MissingTag { dim: usize, name: String },
    /// A tag with the same name already exists on that dimension.
    #[error("tag `{name}` already exists on dimension {dim}")]
    DuplicateTag { dim: usize, name: String },
    /// The tag exists but stores a different scalar type.
    #[error("tag `{name}` on dimension {dim} stores {found}, requested {expected}")]
    TagTypeMismatch {
        dim: usize,
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Tag data length is not `nents * ncomps`.
    #[error("tag `{name}` on dimension {dim}: expected {expected} values, got {found}")]
    TagSizeMismatch {
        dim: usize,
        name: String,
        expected: usize,
        found: usize,
    },
    /// A transfer policy was declared on a dimension or type it cannot serve.
    #[error("transfer policy {policy} is not valid for tag `{name}` on dimension {dim}")]
    InvalidTransferPolicy {
        dim: usize,
        name: String,
        policy: &'static str,
    },
    /// An entity dimension outside `0..=mesh.dim()`.
    #[error("dimension {dim} out of range for a mesh of dimension {mesh_dim}")]
    DimensionOutOfRange { dim: usize, mesh_dim: usize },
    /// Meshes of this dimension are not supported.
    #[error("unsupported mesh dimension {0} (expected 1, 2 or 3)")]
    UnsupportedDimension(usize),
    /// Connectivity references a missing entity or has the wrong width.
    #[error("invalid connectivity on dimension {dim}: {reason}")]
    InvalidConnectivity { dim: usize, reason: String },
    /// An operation requires a different partition mode.
    #[error("operation requires {expected:?} partitioning, mesh is {found:?}")]
    WrongParting {
        expected: crate::topology::parting::Parting,
        found: crate::topology::parting::Parting,
    },
    /// A collective argument differs between ranks.
    #[error("collective argument `{what}` differs across ranks (min {min}, max {max})")]
    CollectiveMismatch { what: &'static str, min: f64, max: f64 },
    /// A receive did not complete in time; a peer skipped a collective call.
    #[error("timed out waiting for rank {peer} (tag {tag:#06x})")]
    CommTimeout { peer: usize, tag: u16 },
    /// Point-to-point failure with a specific neighbor.
    #[error("communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A collective was handed one buffer per rank but the count was wrong.
    #[error("expected {expected} send buffers (one per rank), got {found}")]
    CommBufferCount { expected: usize, found: usize },
    /// Payload could not be decoded.
    #[error("malformed wire payload: {0}")]
    Wire(String),
    /// A global ID was not found on the rank that should hold it.
    #[error("global id {global} of dimension {dim} is not held on rank {rank}")]
    MissingGlobal { dim: usize, global: u64, rank: usize },
    /// Geometry cannot be evaluated.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Communicator setup failed (MPI init, etc.).
    #[error("communicator initialization failed: {0}")]
    CommInit(String),
}
