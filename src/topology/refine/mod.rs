//! Edge-split products: the entities a batch of key edges creates.
//!
//! Splitting key edge `(a, b)` at its new midpoint `m` replaces its cavity
//! (every entity containing both `a` and `b`). For dimension `d`:
//!
//! - each old `d`-entity of the cavity yields two *split* products, one with
//!   `a` replaced by `m` and one with `b` replaced by `m`; substitution keeps
//!   element orientation;
//! - each old `(d+1)`-entity of the cavity yields one *interior* product,
//!   `m` joined to the vertices other than `a` and `b`.
//!
//! So a key edge with `t` triangles and `s` tetrahedra around it produces 2
//! edges plus `t` interior edges, `2t` triangles plus `s` interior triangles,
//! and `2s` tetrahedra. Within a key, products follow the global IDs of the
//! cavity entities they come from, split products first.

pub mod modify;

use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshError;
use crate::topology::adjacency::Csr;
use crate::topology::mesh::Mesh;
use crate::topology::simplex::{EDGE, VERT, nverts_of};
use std::ops::Range;

/// Name of the edge tag flagging this round's key edges.
pub const KEY_TAG: &str = "key";
/// Name of the edge tag holding each key's canonical position.
pub const REP_ORDER_TAG: &str = "edge2rep_order";

/// Old entity a product was carved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parent {
    pub dim: usize,
    pub ent: usize,
}

/// Products of one dimension, grouped by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Products {
    pub dim: usize,
    /// Products of key `k` are `keys2prods[k]..keys2prods[k + 1]`.
    pub keys2prods: Vec<usize>,
    /// `dim + 1` new-mesh vertex indices per product; empty for vertices.
    pub prod_verts2verts: Vec<usize>,
    pub parents: Vec<Parent>,
}

impl Products {
    /// One midpoint vertex per key edge.
    pub fn midpoints(keys2edges: &[usize]) -> Self {
        Self {
            dim: VERT,
            keys2prods: (0..=keys2edges.len()).collect(),
            prod_verts2verts: Vec::new(),
            parents: keys2edges
                .iter()
                .map(|&e| Parent { dim: EDGE, ent: e })
                .collect(),
        }
    }

    pub fn nprods(&self) -> usize {
        self.parents.len()
    }

    pub fn nkeys(&self) -> usize {
        self.keys2prods.len().saturating_sub(1)
    }

    pub fn of_key(&self, key: usize) -> Range<usize> {
        self.keys2prods[key]..self.keys2prods[key + 1]
    }
}

fn cavity(up: Option<&Csr>, key_edge: usize, globals: &[u64]) -> Vec<usize> {
    let mut ents = up.map_or_else(|| vec![key_edge], |up| up.row(key_edge).to_vec());
    ents.sort_unstable_by_key(|&e| globals[e]);
    ents
}

/// Products of dimension `dim` (≥ 1) for the key edges `keys2edges`.
///
/// `new_mesh` must already hold its vertices; `keys2midverts` and
/// `old_verts2new_verts` come from the vertex rebuild.
pub fn refine_products<C: Communicator>(
    mesh: &Mesh<C>,
    new_mesh: &Mesh<C>,
    dim: usize,
    keys2edges: &[usize],
    keys2midverts: &[usize],
    old_verts2new_verts: &[Option<usize>],
) -> Result<Products, MeshError> {
    let elem_dim = mesh.dim();
    if dim == VERT || dim > elem_dim {
        return Err(MeshError::DimensionOutOfRange {
            dim,
            mesh_dim: elem_dim,
        });
    }
    let edges2verts = mesh.ents2verts(EDGE);
    let new_globals = new_mesh.globals(VERT);
    let split_up = if dim > EDGE {
        Some(mesh.ask_up(EDGE, dim)?)
    } else {
        None
    };
    let interior_up = if dim < elem_dim {
        Some(mesh.ask_up(EDGE, dim + 1)?)
    } else {
        None
    };
    let to_new = |v: usize| {
        old_verts2new_verts
            .get(v)
            .copied()
            .flatten()
            .ok_or_else(|| MeshError::InvalidConnectivity {
                dim: VERT,
                reason: format!("old vertex {v} has no new index"),
            })
    };
    // lower-dimensional entities list vertices in ascending global order
    let canonical = |verts: &mut Vec<usize>| {
        if dim < elem_dim {
            verts.sort_unstable_by_key(|&v| new_globals[v]);
        }
    };

    let mut out = Products {
        dim,
        keys2prods: vec![0],
        ..Products::default()
    };
    let per = nverts_of(dim);
    for (k, &edge) in keys2edges.iter().enumerate() {
        let (a, b) = (edges2verts[2 * edge], edges2verts[2 * edge + 1]);
        let m = keys2midverts[k];
        let ents2verts = mesh.ents2verts(dim);
        for e in cavity(split_up.as_ref(), edge, mesh.globals(dim)) {
            let old = &ents2verts[e * per..(e + 1) * per];
            for replaced in [a, b] {
                let mut verts = old
                    .iter()
                    .map(|&v| if v == replaced { Ok(m) } else { to_new(v) })
                    .collect::<Result<Vec<_>, _>>()?;
                canonical(&mut verts);
                out.prod_verts2verts.extend(verts);
                out.parents.push(Parent { dim, ent: e });
            }
        }
        if let Some(up) = interior_up.as_ref() {
            let highs2verts = mesh.ents2verts(dim + 1);
            for t in cavity(Some(up), edge, mesh.globals(dim + 1)) {
                let old = &highs2verts[t * (per + 1)..(t + 1) * (per + 1)];
                let mut verts = vec![m];
                for &v in old.iter().filter(|&&v| v != a && v != b) {
                    verts.push(to_new(v)?);
                }
                canonical(&mut verts);
                out.prod_verts2verts.extend(verts);
                out.parents.push(Parent { dim: dim + 1, ent: t });
            }
        }
        out.keys2prods.push(out.parents.len());
    }
    Ok(out)
}
