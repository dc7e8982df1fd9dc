//! Derived adjacency: downward (by vertex-set lookup), upward (by inversion)
//! and star (same-dimension entities sharing a top-dimensional element).
//!
//! Nothing here is cached; callers that need an adjacency repeatedly keep the
//! returned arrays.

use crate::mesh_error::MeshError;
use crate::topology::simplex::{SimplexKey, nverts_of, simplex_key, sub_positions};
use hashbrown::HashMap;
use itertools::Itertools;

/// Compressed row storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Csr {
    pub offsets: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Csr {
    pub fn nrows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn row(&self, i: usize) -> &[usize] {
        &self.targets[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Build from explicit rows.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = usize>,
    {
        let mut offsets = vec![0];
        let mut targets = Vec::new();
        for row in rows {
            targets.extend(row);
            offsets.push(targets.len());
        }
        Self { offsets, targets }
    }
}

/// Key → local index for all entities of one dimension.
pub fn entity_lookup(ents2verts: &[usize], dim: usize) -> HashMap<SimplexKey, usize> {
    ents2verts
        .chunks_exact(nverts_of(dim))
        .enumerate()
        .map(|(i, vs)| (simplex_key(vs), i))
        .collect()
}

/// Downward adjacency `high → low` as a flat array with `nsubs(high, low)`
/// entries per `high` entity, ordered per [`sub_positions`].
pub fn find_down(
    high_verts: &[usize],
    high: usize,
    low_verts: &[usize],
    low: usize,
) -> Result<Vec<usize>, MeshError> {
    let positions = sub_positions(high, low);
    if low == 0 {
        return Ok(high_verts.to_vec());
    }
    let lookup = entity_lookup(low_verts, low);
    let mut down = Vec::with_capacity(high_verts.len() / nverts_of(high) * positions.len());
    let mut scratch = Vec::with_capacity(nverts_of(low));
    for (ent, vs) in high_verts.chunks_exact(nverts_of(high)).enumerate() {
        for pos in &positions {
            scratch.clear();
            scratch.extend(pos.iter().map(|&p| vs[p]));
            let low_ent = lookup.get(&simplex_key(&scratch)).ok_or_else(|| {
                MeshError::InvalidConnectivity {
                    dim: high,
                    reason: format!("entity {ent} has a {low}-face {scratch:?} that does not exist"),
                }
            })?;
            down.push(*low_ent);
        }
    }
    Ok(down)
}

/// Invert a flat downward adjacency into an upward one. Rows are sorted by
/// the upward entity index.
pub fn invert(down: &[usize], per_high: usize, nlow: usize) -> Csr {
    let mut degree = vec![0usize; nlow];
    for &l in down {
        degree[l] += 1;
    }
    let mut offsets = Vec::with_capacity(nlow + 1);
    offsets.push(0);
    for d in &degree {
        offsets.push(offsets[offsets.len() - 1] + d);
    }
    let mut fill = offsets[..nlow].to_vec();
    let mut targets = vec![0usize; down.len()];
    for (i, &l) in down.iter().enumerate() {
        targets[fill[l]] = i / per_high;
        fill[l] += 1;
    }
    Csr { offsets, targets }
}

/// Entities of one dimension that share an upward element, self excluded.
pub fn star(up: &Csr, down: &[usize], per_high: usize) -> Csr {
    Csr::from_rows((0..up.nrows()).map(|ent| {
        up.row(ent)
            .iter()
            .flat_map(|&h| down[h * per_high..(h + 1) * per_high].iter().copied())
            .filter(|&other| other != ent)
            .sorted_unstable()
            .dedup()
            .collect::<Vec<_>>()
    }))
}
