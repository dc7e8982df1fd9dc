//! Rebuild phase, run on the element-based mesh: vertices first, then each
//! higher dimension from the maps of the one below.

use crate::algs::array::collect_marked;
use crate::algs::communicator::{Communicator, ReduceOp};
use crate::algs::field_transfer::transfer_refine;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::parting::Parting;
use crate::topology::refine::modify::{ModifiedEnts, modify_ents};
use crate::topology::refine::{KEY_TAG, Products, refine_products};
use crate::topology::simplex::{EDGE, VERT};

/// What one dimension hands to the next.
#[derive(Debug, Default)]
struct LowerMaps {
    keys2midverts: Vec<usize>,
    old_verts2new_verts: Vec<Option<usize>>,
    old_lows2new_lows: Vec<Option<usize>>,
}

impl LowerMaps {
    fn advance(&mut self, dim: usize, mods: ModifiedEnts) {
        if dim == VERT {
            self.keys2midverts = mods.prods2new_ents;
            self.old_verts2new_verts = mods.old_ents2new_ents.clone();
        }
        self.old_lows2new_lows = mods.old_ents2new_ents;
    }
}

/// Split every key edge and replace `mesh` with the refined mesh. Collective.
///
/// The refined mesh is assembled separately; `mesh` is only replaced once
/// every dimension has been built.
pub(crate) fn refine_element_based<C: Communicator>(
    mesh: &mut Mesh<C>,
    verbose: bool,
) -> Result<(), MeshError> {
    if mesh.parting() != Parting::ElementBased {
        return Err(MeshError::WrongParting {
            expected: Parting::ElementBased,
            found: mesh.parting(),
        });
    }
    let comm = mesh.comm();
    let keys2edges = collect_marked(mesh.get_array::<i8>(EDGE, KEY_TAG)?);
    let ntotal_keys = comm.allreduce(keys2edges.len() as u64, ReduceOp::Sum)?;
    if verbose && comm.rank() == 0 {
        log::info!("refining {ntotal_keys} edges");
    }

    let mut new_mesh = mesh.copy_meta();
    let mut lower = LowerMaps::default();
    for dim in 0..=mesh.dim() {
        let prods = if dim == VERT {
            Products::midpoints(&keys2edges)
        } else {
            refine_products(
                mesh,
                &new_mesh,
                dim,
                &keys2edges,
                &lower.keys2midverts,
                &lower.old_verts2new_verts,
            )?
        };
        let mods = modify_ents(
            mesh,
            &mut new_mesh,
            dim,
            EDGE,
            &keys2edges,
            &prods,
            &lower.old_lows2new_lows,
        )?;
        let keys2midverts = if dim == VERT {
            &mods.prods2new_ents
        } else {
            &lower.keys2midverts
        };
        transfer_refine(
            mesh,
            &mut new_mesh,
            dim,
            &keys2edges,
            keys2midverts,
            &prods,
            &mods,
        )?;
        lower.advance(dim, mods);
    }
    *mesh = new_mesh;
    Ok(())
}
