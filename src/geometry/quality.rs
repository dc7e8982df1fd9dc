//! Mean-ratio element quality and the split-quality oracle.
//!
//! Mean ratio is 1 for an equilateral simplex, approaches 0 as the simplex
//! flattens and is negative for inverted elements:
//!
//! - triangle: `4√3·A / Σ lᵢ²`
//! - tetrahedron: `12·(3V)^(2/3) / Σ lᵢ²`
//! - segment: `1` (0 when the segment has zero length)
//!
//! A degenerate element (no area, or all points coincident) has quality `0`;
//! this is a value, not an error.

use crate::algs::array::{map_onto, unmap};
use crate::algs::communicator::Communicator;
use crate::geometry::metrics::{midpoint, point, signed_measure, sum_sq_edges};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::simplex::{EDGE, nverts_of};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Mean ratio of a simplex given by its points (2, 3 or 4 of them).
pub fn mean_ratio(pts: &[[f64; 3]]) -> Result<f64, MeshError> {
    let measure = signed_measure(pts)?;
    let s = sum_sq_edges(pts);
    if s <= 0.0 || measure == 0.0 {
        return Ok(0.0);
    }
    Ok(match pts.len() {
        2 => 1.0,
        3 => 4.0 * 3f64.sqrt() * measure / s,
        _ => 12.0 * (3.0 * measure.abs()).powf(2.0 / 3.0) * measure.signum() / s,
    })
}

/// Quality of every local element.
pub fn element_qualities<C: Communicator>(mesh: &Mesh<C>) -> Result<Vec<f64>, MeshError> {
    let coords = mesh.coords()?;
    let dim = mesh.dim();
    mesh.ents2verts(dim)
        .chunks_exact(nverts_of(dim))
        .map(|vs| {
            let pts: Vec<[f64; 3]> = vs.iter().map(|&v| point(coords, dim, v)).collect();
            mean_ratio(&pts)
        })
        .collect()
}

/// Worst child quality over the elements around `edge` if it were split at
/// its midpoint.
fn split_quality(
    coords: &[f64],
    dim: usize,
    edge: [usize; 2],
    elems: &[usize],
    elems2verts: &[usize],
) -> Result<f64, MeshError> {
    let mid = midpoint(point(coords, dim, edge[0]), point(coords, dim, edge[1]));
    let per = nverts_of(dim);
    let mut worst = f64::INFINITY;
    for &e in elems {
        let vs = &elems2verts[e * per..(e + 1) * per];
        for replaced in edge {
            let pts: Vec<[f64; 3]> = vs
                .iter()
                .map(|&v| if v == replaced { mid } else { point(coords, dim, v) })
                .collect();
            worst = worst.min(mean_ratio(&pts)?);
        }
    }
    Ok(if worst.is_finite() { worst } else { 0.0 })
}

/// Minimum quality of the elements that splitting each candidate edge would
/// create. Ghost copies receive their owner's value. Collective.
pub fn refine_qualities<C: Communicator>(
    mesh: &Mesh<C>,
    cands2edges: &[usize],
) -> Result<Vec<f64>, MeshError> {
    let coords = mesh.coords()?;
    let dim = mesh.dim();
    let edges2verts = mesh.ents2verts(EDGE);
    let elems2verts = mesh.ents2verts(dim);
    let up = if dim > EDGE {
        Some(mesh.ask_up(EDGE, dim)?)
    } else {
        None
    };
    let eval = |&edge: &usize| {
        let verts = [edges2verts[2 * edge], edges2verts[2 * edge + 1]];
        let own = [edge];
        let elems = up.as_ref().map_or(&own[..], |up| up.row(edge));
        split_quality(coords, dim, verts, elems, elems2verts)
    };
    #[cfg(feature = "rayon")]
    let quals: Vec<f64> = cands2edges.par_iter().map(eval).collect::<Result<_, _>>()?;
    #[cfg(not(feature = "rayon"))]
    let quals: Vec<f64> = cands2edges.iter().map(eval).collect::<Result<_, _>>()?;

    let full = map_onto(&quals, cands2edges, mesh.nedges(), 0.0, 1);
    let synced = mesh.sync_array(EDGE, &full, 1)?;
    Ok(unmap(cands2edges, &synced, 1))
}
