//! Simplex bookkeeping: dimension names, canonical keys and sub-simplex
//! enumeration.

use itertools::Itertools;

/// Entity dimension of vertices.
pub const VERT: usize = 0;
/// Entity dimension of edges.
pub const EDGE: usize = 1;
/// Entity dimension of triangles.
pub const TRI: usize = 2;
/// Entity dimension of tetrahedra.
pub const TET: usize = 3;

/// Sorted vertex set of a simplex of dimension ≤ 3, padded with `usize::MAX`.
///
/// Two simplices are the same entity iff their keys are equal.
pub type SimplexKey = [usize; 4];

/// Canonical key of a simplex given its vertices in any order.
pub fn simplex_key(verts: &[usize]) -> SimplexKey {
    debug_assert!(verts.len() <= 4);
    let mut key = [usize::MAX; 4];
    key[..verts.len()].copy_from_slice(verts);
    key[..verts.len()].sort_unstable();
    key
}

/// Number of vertices of a `d`-simplex.
#[inline]
pub const fn nverts_of(d: usize) -> usize {
    d + 1
}

/// Number of `low`-dimensional sub-simplices of a `high`-simplex.
pub fn nsubs(high: usize, low: usize) -> usize {
    (0..=high).combinations(low + 1).count()
}

/// Positions (into the vertex list of a `high`-simplex) of each of its
/// `low`-dimensional sub-simplices.
///
/// For facets (`low == high - 1`) sub-simplex `i` is the one opposite vertex
/// `i`; otherwise sub-simplices come in lexicographic position order.
pub fn sub_positions(high: usize, low: usize) -> Vec<Vec<usize>> {
    if low + 1 == high {
        (0..=high)
            .map(|i| (0..=high).filter(|&j| j != i).collect())
            .collect()
    } else {
        (0..=high).combinations(low + 1).collect()
    }
}
