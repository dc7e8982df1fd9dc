//! Build one dimension of the refined mesh from survivors and products.
//!
//! New entities of a dimension are the surviving old entities, in old order,
//! followed by the products. Global IDs stay contiguous:
//!
//! - a survivor with old global `g` gets `g` minus the number of removed
//!   entities (globally) with a smaller global;
//! - products are numbered after all survivors, grouped by key. With
//!   canonical globals the keys are taken in their canonical order
//!   ([`REP_ORDER_TAG`]), otherwise in rank order.
//!
//! Survivors keep their owner; products are owned by the key's owner, which
//! in element-based mode is the only rank holding the key.

use crate::algs::array::offset_scan;
use crate::algs::communicator::Communicator;
use crate::algs::renumber::{compact_global, gather_sorted_globals};
use crate::algs::wire::{decode_u64s, encode_u64s};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::refine::{Products, REP_ORDER_TAG};
use crate::topology::simplex::{EDGE, VERT, nverts_of};

/// Index maps produced by [`modify_ents`] for one dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModifiedEnts {
    /// New index of each product.
    pub prods2new_ents: Vec<usize>,
    /// Old index of each survivor.
    pub same_ents2old_ents: Vec<usize>,
    /// New index of each survivor.
    pub same_ents2new_ents: Vec<usize>,
    /// New index of each old entity; `None` for entities that were split.
    pub old_ents2new_ents: Vec<Option<usize>>,
}

fn lookup(map: &[Option<usize>], old: usize, dim: usize) -> Result<usize, MeshError> {
    map.get(old)
        .copied()
        .flatten()
        .ok_or_else(|| MeshError::InvalidConnectivity {
            dim,
            reason: format!("old entity {old} has no counterpart in the refined mesh"),
        })
}

/// Survivor connectivity in new vertex indices, rebuilt from the new lower
/// entities: vertex `i` of an entity is the one its face `i` lacks.
fn survivor_verts<C: Communicator>(
    old: &Mesh<C>,
    new: &Mesh<C>,
    dim: usize,
    same_ents2old_ents: &[usize],
    old_lows2new_lows: &[Option<usize>],
) -> Result<Vec<usize>, MeshError> {
    let per = nverts_of(dim);
    let mut out = Vec::with_capacity(same_ents2old_ents.len() * per);
    if dim == EDGE {
        let old_verts = old.ents2verts(EDGE);
        for &e in same_ents2old_ents {
            for &v in &old_verts[2 * e..2 * e + 2] {
                out.push(lookup(old_lows2new_lows, v, VERT)?);
            }
        }
        return Ok(out);
    }
    let down = old.ask_down(dim, dim - 1)?;
    let new_faces = new.ents2verts(dim - 1);
    let face_verts = |f: usize| &new_faces[f * dim..(f + 1) * dim];
    for &e in same_ents2old_ents {
        let faces = down[e * per..(e + 1) * per]
            .iter()
            .map(|&f| lookup(old_lows2new_lows, f, dim - 1))
            .collect::<Result<Vec<_>, _>>()?;
        for i in 0..per {
            let (mine, other) = (face_verts(faces[i]), face_verts(faces[(i + 1) % per]));
            let v = other
                .iter()
                .copied()
                .find(|v| !mine.contains(v))
                .ok_or_else(|| MeshError::InvalidConnectivity {
                    dim,
                    reason: format!("faces of entity {e} do not span a simplex"),
                })?;
            out.push(v);
        }
    }
    Ok(out)
}

/// Global IDs of this rank's products, which start at `base`. Collective.
fn product_globals<C: Communicator>(
    old: &Mesh<C>,
    keys2edges: &[usize],
    prods: &Products,
    base: u64,
) -> Result<Vec<u64>, MeshError> {
    let comm = old.comm();
    let mut out = Vec::with_capacity(prods.nprods());
    if old.keeps_canonical_globals() {
        let order = old.get_array::<i64>(EDGE, REP_ORDER_TAG)?;
        if let Some(&e) = keys2edges.iter().find(|&&e| order[e] < 0) {
            return Err(MeshError::InvalidConnectivity {
                dim: EDGE,
                reason: format!("key edge {e} has no canonical order"),
            });
        }
        let mut pairs = Vec::with_capacity(2 * keys2edges.len());
        for (k, &e) in keys2edges.iter().enumerate() {
            pairs.push(order[e] as u64);
            pairs.push(prods.of_key(k).len() as u64);
        }
        let mut counts = Vec::new();
        for part in comm.allgather(encode_u64s(&pairs))? {
            for pair in decode_u64s(part)?.chunks_exact(2) {
                let pos = pair[0] as usize;
                if counts.len() <= pos {
                    counts.resize(pos + 1, 0);
                }
                counts[pos] = pair[1] as usize;
            }
        }
        let offsets = offset_scan(&counts);
        for (k, &e) in keys2edges.iter().enumerate() {
            let first = base + offsets[order[e] as usize] as u64;
            out.extend((0..prods.of_key(k).len() as u64).map(|j| first + j));
        }
    } else {
        let counts: Vec<usize> = comm
            .allgather(encode_u64s(&[prods.nprods() as u64]))?
            .into_iter()
            .map(|b| decode_u64s(b).map(|v| v.first().copied().unwrap_or(0) as usize))
            .collect::<Result<_, _>>()?;
        let first = base + offset_scan(&counts)[comm.rank()] as u64;
        out.extend((0..prods.nprods() as u64).map(|j| first + j));
    }
    Ok(out)
}

/// Build dimension `dim` of `new` from the survivors of `old` and `prods`.
///
/// Entities of `dim` that contain a key of dimension `key_dim` are removed;
/// `old_lows2new_lows` is the map returned for `dim - 1`. Collective.
pub fn modify_ents<C: Communicator>(
    old: &Mesh<C>,
    new: &mut Mesh<C>,
    dim: usize,
    key_dim: usize,
    keys2ents: &[usize],
    prods: &Products,
    old_lows2new_lows: &[Option<usize>],
) -> Result<ModifiedEnts, MeshError> {
    let nold = old.nents(dim);
    let mut removed = vec![false; nold];
    if dim == key_dim {
        keys2ents.iter().for_each(|&k| removed[k] = true);
    } else if dim > key_dim {
        let up = old.ask_up(key_dim, dim)?;
        for &k in keys2ents {
            up.row(k).iter().for_each(|&e| removed[e] = true);
        }
    }

    let same_ents2old_ents: Vec<usize> = (0..nold).filter(|&e| !removed[e]).collect();
    let nsame = same_ents2old_ents.len();
    let same_ents2new_ents: Vec<usize> = (0..nsame).collect();
    let prods2new_ents: Vec<usize> = (nsame..nsame + prods.nprods()).collect();
    let mut old_ents2new_ents = vec![None; nold];
    for (new_idx, &o) in same_ents2old_ents.iter().enumerate() {
        old_ents2new_ents[o] = Some(new_idx);
    }

    let mut verts = if dim == VERT {
        Vec::new()
    } else {
        survivor_verts(old, new, dim, &same_ents2old_ents, old_lows2new_lows)?
    };
    verts.extend_from_slice(&prods.prod_verts2verts);

    let old_globals = old.globals(dim);
    let removed_here: Vec<u64> = (0..nold)
        .filter(|&e| removed[e])
        .map(|e| old_globals[e])
        .collect();
    let removed_all = gather_sorted_globals(old.comm(), &removed_here)?;
    let base = old.nglobal_ents(dim)? - removed_all.len() as u64;
    let mut globals: Vec<u64> = same_ents2old_ents
        .iter()
        .map(|&e| compact_global(&removed_all, old_globals[e]))
        .collect();
    globals.extend(product_globals(old, keys2ents, prods, base)?);

    let old_owners = old.owners(dim);
    let me = old.comm().rank();
    let mut owners: Vec<usize> = same_ents2old_ents.iter().map(|&e| old_owners[e]).collect();
    owners.extend(std::iter::repeat_n(me, prods.nprods()));

    log::debug!(
        "rank {me}: dimension {dim}: {nsame} kept, {} split, {} produced",
        removed_here.len(),
        prods.nprods()
    );
    new.set_ents(dim, verts, globals, owners)?;
    Ok(ModifiedEnts {
        prods2new_ents,
        same_ents2old_ents,
        same_ents2new_ents,
        old_ents2new_ents,
    })
}
