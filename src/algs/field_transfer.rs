//! Carry tags from a mesh onto its refinement, one dimension at a time.
//!
//! Survivors keep their values. Products get values according to the tag's
//! [`TransferPolicy`]:
//!
//! - `Drop`: the tag is not carried;
//! - `Inherit`: copy the parent's value; a parent of another dimension (the
//!   key edge of a midpoint, the element of an interior product) supplies the
//!   same-named tag of its own dimension;
//! - `LinearInterp` (`f64` vertex tags): midpoint gets the mean of the key
//!   edge's endpoints;
//! - `Conserve` (`f64` element tags): each half gets half its parent's value.

use crate::algs::communicator::Communicator;
use crate::data::tag::{Tag, TagData, TransferPolicy};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::refine::Products;
use crate::topology::refine::modify::ModifiedEnts;
use crate::topology::simplex::EDGE;

/// Same-named tag on dimension `dim` with the layout of `like`.
fn matching_tag<'a, C: Communicator>(
    mesh: &'a Mesh<C>,
    dim: usize,
    like: &Tag,
) -> Result<&'a Tag, MeshError> {
    let tag = mesh.get_tag(dim, like.name())?;
    if tag.scalar_type() != like.scalar_type() || tag.ncomps() != like.ncomps() {
        return Err(MeshError::TagTypeMismatch {
            dim,
            name: like.name().into(),
            expected: like.scalar_type().as_str(),
            found: tag.scalar_type().as_str(),
        });
    }
    Ok(tag)
}

/// Every `Inherit` tag below the top dimension needs a same-named tag one
/// dimension up to serve midpoints and interior products.
pub fn check_inherit_sources<C: Communicator>(mesh: &Mesh<C>) -> Result<(), MeshError> {
    for dim in 0..mesh.dim() {
        for tag in mesh.tags(dim) {
            if tag.policy() == TransferPolicy::Inherit {
                matching_tag(mesh, dim + 1, tag)?;
            }
        }
    }
    Ok(())
}

fn f64_rows<'a>(data: &'a mut TagData, name: &str, dim: usize) -> Result<&'a mut [f64], MeshError> {
    match data {
        TagData::F64(v) => Ok(v.as_mut_slice()),
        other => Err(MeshError::TagTypeMismatch {
            dim,
            name: name.into(),
            expected: "f64",
            found: other.scalar_type().as_str(),
        }),
    }
}

/// Populate the tags of dimension `dim` on `new` from `old`.
pub fn transfer_refine<C: Communicator>(
    old: &Mesh<C>,
    new: &mut Mesh<C>,
    dim: usize,
    keys2edges: &[usize],
    keys2midverts: &[usize],
    prods: &Products,
    mods: &ModifiedEnts,
) -> Result<(), MeshError> {
    let nnew = new.nents(dim);
    for tag in old.tags(dim) {
        let policy = tag.policy();
        if policy == TransferPolicy::Drop {
            continue;
        }
        let ncomps = tag.ncomps();
        let mut data = TagData::zeros(tag.scalar_type(), nnew * ncomps);
        for (&o, &n) in mods.same_ents2old_ents.iter().zip(&mods.same_ents2new_ents) {
            data.copy_row(n, tag.data(), o, ncomps)?;
        }
        match policy {
            TransferPolicy::Drop => {}
            TransferPolicy::Inherit => {
                for (p, parent) in prods.parents.iter().enumerate() {
                    let src = if parent.dim == dim {
                        tag
                    } else {
                        matching_tag(old, parent.dim, tag)?
                    };
                    data.copy_row(mods.prods2new_ents[p], src.data(), parent.ent, ncomps)?;
                }
            }
            TransferPolicy::LinearInterp => {
                let src = old.get_array::<f64>(dim, tag.name())?;
                let edges2verts = old.ents2verts(EDGE);
                let dst = f64_rows(&mut data, tag.name(), dim)?;
                for (&edge, &mid) in keys2edges.iter().zip(keys2midverts) {
                    let (a, b) = (edges2verts[2 * edge], edges2verts[2 * edge + 1]);
                    for c in 0..ncomps {
                        dst[mid * ncomps + c] = 0.5 * (src[a * ncomps + c] + src[b * ncomps + c]);
                    }
                }
            }
            TransferPolicy::Conserve => {
                let src = old.get_array::<f64>(dim, tag.name())?;
                let dst = f64_rows(&mut data, tag.name(), dim)?;
                for (p, parent) in prods.parents.iter().enumerate() {
                    let row = mods.prods2new_ents[p];
                    for c in 0..ncomps {
                        dst[row * ncomps + c] = 0.5 * src[parent.ent * ncomps + c];
                    }
                }
            }
        }
        new.push_tag(
            dim,
            Tag::from_parts(tag.name().to_owned(), ncomps, policy, data),
        )?;
    }
    Ok(())
}
