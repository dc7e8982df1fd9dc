#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-refine
//!
//! mesh-refine splits the long edges of a distributed simplicial mesh (1D, 2D
//! or 3D) in collective, conflict-free batches, and rebuilds the mesh and its
//! tags dimension by dimension after every batch.
//!
//! ## Features
//! - Partitioned simplicial meshes with per-dimension global IDs, owners and
//!   typed tags with declared transfer policies
//! - Ghosted and element-based partition modes with a collective switch
//! - Mean-ratio split quality, a deterministic distributed independent set,
//!   and partition-independent numbering of new entities
//! - Pluggable communication backends: serial, in-process ranks as threads,
//!   and MPI (`mpi-support` feature)
//!
//! ## Usage
//!
//! ```rust
//! use mesh_refine::prelude::*;
//!
//! let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
//! let mut mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2])?;
//! assert!(refine_by_size(&mut mesh, 1.2, 0.0, false)?);
//! assert_eq!(mesh.nelems(), 2);
//! # Ok::<(), mesh_refine::mesh_error::MeshError>(())
//! ```
//!
//! ## Collective calls
//!
//! Every rank sharing a mesh must enter the same collective operations in the
//! same order with matching arguments. [`algs::communicator::RayonComm`]
//! reports a rank that skipped a call as a timeout rather than hanging.

pub mod adapt;
pub mod algs;
pub mod data;
pub mod geometry;
pub mod mesh_error;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::{
        RefineOptions, RefineSummary, refine, refine_by_size, refine_to_size,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, ReduceOp};
    pub use crate::data::tag::{ScalarType, Tag, TransferPolicy};
    pub use crate::mesh_error::MeshError;
    pub use crate::topology::mesh::Mesh;
    pub use crate::topology::parting::Parting;
    pub use crate::topology::simplex::{EDGE, TET, TRI, VERT};
}
