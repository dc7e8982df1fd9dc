//! Size-driven edge-split refinement.
//!
//! Entry points are collective: every rank sharing the mesh's communicator
//! calls them in the same order with the same arguments. Arguments are
//! checked across ranks on entry, so a rank that passes different values
//! makes every rank fail with [`MeshError::CollectiveMismatch`].
//!
//! One round:
//!
//! 1. flag edges longer than `max_len` ([`candidates`]);
//! 2. on the ghosted mesh, keep candidates whose split quality reaches
//!    `min_qual`, select an independent set of keys and hand each key's
//!    elements to the key's owner;
//! 3. on the element-based mesh, rebuild every dimension from vertices up
//!    and swap the result in.
//!
//! A round that finds nothing to do returns `false` on every rank and
//! leaves the mesh as it was.

pub mod candidates;
mod ghosted;
mod rebuild;

use crate::algs::communicator::{Communicator, ReduceOp};
use crate::algs::field_transfer::check_inherit_sources;
use crate::data::tag::TransferPolicy;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::parting::Parting;
use crate::topology::simplex::{EDGE, VERT};
use candidates::{CANDIDATE_TAG, any_marked, mark_long_edges};
use serde::{Deserialize, Serialize};

/// Outcome of the selection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Nothing eligible anywhere; the mesh is left as it was.
    NoOp,
    /// Keys were selected; the rebuild must run on every rank.
    Proceed,
}

/// Settings for [`refine_to_size`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineOptions {
    /// Edges strictly longer than this are split.
    pub max_len: f64,
    /// Splits whose worst child quality falls below this are skipped.
    pub min_qual: f64,
    /// Upper bound on refinement rounds.
    pub max_passes: usize,
    /// Report each round on rank 0 at `info` level.
    pub verbose: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_len: 1.0,
            min_qual: 0.3,
            max_passes: 16,
            verbose: false,
        }
    }
}

/// Result of [`refine_to_size`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineSummary {
    /// Rounds that split at least one edge.
    pub passes: usize,
    /// Edges split over all rounds, across all ranks.
    pub edges_split: u64,
}

/// Fail on every rank unless all ranks passed the same `value`. Collective.
///
/// `0.0` and `-0.0` count as the same value; NaNs compare by bit pattern.
pub fn check_collective_arg<C: Communicator>(
    comm: &C,
    what: &'static str,
    value: f64,
) -> Result<(), MeshError> {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let lo = comm.allreduce(bits, ReduceOp::Min)?;
    let hi = comm.allreduce(bits, ReduceOp::Max)?;
    if lo != hi {
        return Err(MeshError::CollectiveMismatch {
            what,
            min: f64::from_bits(lo),
            max: f64::from_bits(hi),
        });
    }
    Ok(())
}

/// Tag layouts the rebuild depends on, checked on every rank before anything
/// changes. Collective.
fn check_tag_layout<C: Communicator>(mesh: &Mesh<C>) -> Result<(), MeshError> {
    let local = check_inherit_sources(mesh);
    let all_ok = mesh
        .comm()
        .allreduce(i32::from(local.is_ok()), ReduceOp::Min)?;
    local?;
    if all_ok == 0 {
        return Err(MeshError::CollectiveMismatch {
            what: "tag layout",
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

/// Split the edges carrying the `"candidate"` tag. Collective.
///
/// Returns `false` if no candidate reaches `min_qual` on any rank; the
/// candidate tag is consumed either way. On `true` the mesh is refined and in
/// [`Parting::ElementBased`] mode.
pub fn refine<C: Communicator>(
    mesh: &mut Mesh<C>,
    min_qual: f64,
    verbose: bool,
) -> Result<bool, MeshError> {
    check_collective_arg(mesh.comm(), "min_qual", min_qual)?;
    check_tag_layout(mesh)?;
    let entry = mesh.parting();
    mesh.set_parting(Parting::Ghosted)?;
    match ghosted::refine_ghosted(mesh, min_qual)? {
        Selection::NoOp => {
            mesh.set_parting(entry)?;
            Ok(false)
        }
        Selection::Proceed => {
            mesh.set_parting(Parting::ElementBased)?;
            rebuild::refine_element_based(mesh, verbose)?;
            Ok(true)
        }
    }
}

/// Split edges longer than `max_len` whose split keeps every child at
/// quality `min_qual` or better. Collective.
///
/// Returns `false`, without touching the mesh, when no edge on any rank is
/// longer than `max_len`.
pub fn refine_by_size<C: Communicator>(
    mesh: &mut Mesh<C>,
    max_len: f64,
    min_qual: f64,
    verbose: bool,
) -> Result<bool, MeshError> {
    check_collective_arg(mesh.comm(), "max_len", max_len)?;
    let edge_is_cand = mark_long_edges(mesh, max_len)?;
    if !any_marked(mesh.comm(), &edge_is_cand)? {
        return Ok(false);
    }
    mesh.set_tag(EDGE, CANDIDATE_TAG, 1, TransferPolicy::Drop, edge_is_cand)?;
    refine(mesh, min_qual, verbose)
}

/// Repeat [`refine_by_size`] until it reports nothing to do or
/// `opts.max_passes` rounds have run. Collective.
pub fn refine_to_size<C: Communicator>(
    mesh: &mut Mesh<C>,
    opts: &RefineOptions,
) -> Result<RefineSummary, MeshError> {
    let nverts_before = mesh.nglobal_ents(VERT)?;
    let mut passes = 0;
    while passes < opts.max_passes {
        if !refine_by_size(mesh, opts.max_len, opts.min_qual, opts.verbose)? {
            break;
        }
        passes += 1;
    }
    // every split adds exactly one vertex
    let edges_split = mesh.nglobal_ents(VERT)? - nverts_before;
    if opts.verbose && mesh.comm().rank() == 0 {
        log::info!("{passes} refinement passes split {edges_split} edges");
    }
    Ok(RefineSummary {
        passes,
        edges_split,
    })
}
