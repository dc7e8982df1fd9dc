//! Mesh topology: storage, adjacency, ownership, partition modes and the
//! edge-split rebuild.

pub mod adjacency;
pub mod mesh;
pub mod ownership;
pub mod parting;
pub mod refine;
pub mod simplex;

pub use adjacency::Csr;
pub use mesh::Mesh;
pub use parting::Parting;
