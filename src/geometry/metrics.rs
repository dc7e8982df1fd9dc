//! Basic simplex measures over the vertex coordinate tag.
//!
//! Coordinates have as many components as the mesh has dimensions; points are
//! padded to three components with zeros.

use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::simplex::EDGE;

/// Point of vertex `v`, padded to 3D.
pub(crate) fn point(coords: &[f64], dim: usize, v: usize) -> [f64; 3] {
    let mut p = [0.0; 3];
    p[..dim].copy_from_slice(&coords[v * dim..(v + 1) * dim]);
    p
}

pub(crate) fn midpoint(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        0.5 * (a[0] + b[0]),
        0.5 * (a[1] + b[1]),
        0.5 * (a[2] + b[2]),
    ]
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let d = sub(b, a);
    dot(d, d).sqrt()
}

fn signed_area_xy(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let abx = b[0] - a[0];
    let aby = b[1] - a[1];
    let acx = c[0] - a[0];
    let acy = c[1] - a[1];
    0.5 * (abx * acy - aby * acx)
}

fn signed_volume(a: [f64; 3], b: [f64; 3], c: [f64; 3], d: [f64; 3]) -> f64 {
    dot(sub(b, a), cross(sub(c, a), sub(d, a))) / 6.0
}

/// Signed length, area or volume of a simplex given by 2, 3 or 4 points.
pub fn signed_measure(pts: &[[f64; 3]]) -> Result<f64, MeshError> {
    match pts {
        [a, b] => Ok(distance(*a, *b)),
        [a, b, c] => Ok(signed_area_xy(*a, *b, *c)),
        [a, b, c, d] => Ok(signed_volume(*a, *b, *c, *d)),
        _ => Err(MeshError::InvalidGeometry(format!(
            "no simplex measure for {} points",
            pts.len()
        ))),
    }
}

/// Sum of squared edge lengths of a simplex.
pub(crate) fn sum_sq_edges(pts: &[[f64; 3]]) -> f64 {
    let mut s = 0.0;
    for i in 0..pts.len() {
        for j in i + 1..pts.len() {
            let d = sub(pts[j], pts[i]);
            s += dot(d, d);
        }
    }
    s
}

/// Euclidean length of every local edge.
pub fn edge_lengths<C: Communicator>(mesh: &Mesh<C>) -> Result<Vec<f64>, MeshError> {
    let coords = mesh.coords()?;
    let dim = mesh.dim();
    Ok(mesh
        .ents2verts(EDGE)
        .chunks_exact(2)
        .map(|e| distance(point(coords, dim, e[0]), point(coords, dim, e[1])))
        .collect())
}
