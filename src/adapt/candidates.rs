//! Length-based candidate selection.

use crate::algs::array::{each_gt, max};
use crate::algs::communicator::{Communicator, ReduceOp};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;

/// Name of the single-use edge tag flagging split candidates.
pub const CANDIDATE_TAG: &str = "candidate";

/// `1` for every local edge longer than `max_len`.
pub fn mark_long_edges<C: Communicator>(mesh: &Mesh<C>, max_len: f64) -> Result<Vec<i8>, MeshError> {
    Ok(each_gt(&mesh.ask_lengths()?, max_len))
}

/// Whether any rank has a flagged entry. Collective.
pub fn any_marked<C: Communicator>(comm: &C, flags: &[i8]) -> Result<bool, MeshError> {
    Ok(comm.allreduce(max(flags), ReduceOp::Max)? == 1)
}
