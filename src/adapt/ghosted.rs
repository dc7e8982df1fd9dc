//! Selection phase, run on the ghosted mesh: quality filter, independent set,
//! canonical key order and ownership of the cavities.

use super::Selection;
use super::candidates::{CANDIDATE_TAG, any_marked};
use crate::algs::array::{collect_marked, each_geq_to, map_onto};
use crate::algs::communicator::Communicator;
use crate::algs::indset::find_indset;
use crate::algs::renumber::get_edge2rep_order;
use crate::data::tag::TransferPolicy;
use crate::geometry::quality::refine_qualities;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::ownership::set_owners_by_indset;
use crate::topology::parting::Parting;
use crate::topology::refine::{KEY_TAG, REP_ORDER_TAG};
use crate::topology::simplex::EDGE;

/// Consume the candidate tag and pick this round's key edges. Collective.
///
/// Returns [`Selection::NoOp`] on every rank when no candidate anywhere meets
/// `min_qual`; the mesh then only lacks its candidate tag.
pub(crate) fn refine_ghosted<C: Communicator>(
    mesh: &mut Mesh<C>,
    min_qual: f64,
) -> Result<Selection, MeshError> {
    if mesh.parting() != Parting::Ghosted {
        return Err(MeshError::WrongParting {
            expected: Parting::Ghosted,
            found: mesh.parting(),
        });
    }
    let cand_tag = mesh.remove_tag(EDGE, CANDIDATE_TAG)?;
    let edges_are_cands = cand_tag
        .array::<i8>()
        .ok_or_else(|| MeshError::TagTypeMismatch {
            dim: EDGE,
            name: CANDIDATE_TAG.into(),
            expected: "i8",
            found: cand_tag.scalar_type().as_str(),
        })?;
    let cands2edges = collect_marked(edges_are_cands);
    let cand_quals = refine_qualities(mesh, &cands2edges)?;
    let cands_are_good = each_geq_to(&cand_quals, min_qual);
    if !any_marked(mesh.comm(), &cands_are_good)? {
        log::debug!(
            "rank {}: no candidate reaches quality {min_qual}",
            mesh.comm().rank()
        );
        return Ok(Selection::NoOp);
    }

    let nedges = mesh.nedges();
    let edges_are_initial = map_onto(&cands_are_good, &cands2edges, nedges, 0i8, 1);
    let edge_quals = map_onto(&cand_quals, &cands2edges, nedges, 0.0, 1);
    let edges_are_keys = find_indset(mesh, EDGE, &edge_quals, &edges_are_initial)?;
    let keys2edges = collect_marked(&edges_are_keys);
    if mesh.keeps_canonical_globals() {
        let order = get_edge2rep_order(mesh, EDGE, &edges_are_keys)?;
        mesh.set_tag(EDGE, REP_ORDER_TAG, 1, TransferPolicy::Drop, order)?;
    }
    mesh.set_tag(EDGE, KEY_TAG, 1, TransferPolicy::Drop, edges_are_keys)?;
    set_owners_by_indset(mesh, EDGE, &keys2edges)?;
    Ok(Selection::Proceed)
}
