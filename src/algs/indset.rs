//! Distributed maximal independent set over entities that share an element.
//!
//! Luby-style rounds. Each entity is `UNKNOWN` (a candidate still undecided),
//! `IN` or `NOT_IN`. A round has two phases, each evaluated on a snapshot and
//! followed by a ghost sync so every copy agrees with its owner:
//!
//! 1. an unknown entity next to an `IN` entity becomes `NOT_IN`;
//! 2. an unknown entity that outranks every unknown neighbor becomes `IN`.
//!
//! Rank: higher quality first, then lower global ID. The order is total and
//! identical on every rank, so the result depends only on the global mesh and
//! the input arrays, never on the partition or on message timing.
//!
//! Requires [`Parting::Ghosted`](crate::topology::parting::Parting::Ghosted):
//! the owner of an entity must hold all of its neighbors.

use crate::algs::communicator::{Communicator, ReduceOp};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use std::cmp::Ordering;

const NOT_IN: i8 = -1;
const UNKNOWN: i8 = 0;
const IN: i8 = 1;

/// Select a maximal subset of the flagged entities of dimension `dim` such
/// that no two selected entities lie in a common element. Returns one flag
/// per entity. Collective.
pub fn find_indset<C: Communicator>(
    mesh: &Mesh<C>,
    dim: usize,
    quals: &[f64],
    candidates: &[i8],
) -> Result<Vec<i8>, MeshError> {
    let n = mesh.nents(dim);
    for (name, len) in [("quality", quals.len()), ("candidates", candidates.len())] {
        if len != n {
            return Err(MeshError::TagSizeMismatch {
                dim,
                name: name.into(),
                expected: n,
                found: len,
            });
        }
    }
    let star = mesh.ask_star(dim)?;
    let quals = mesh.sync_array(dim, quals, 1)?;
    let globals = mesh.globals(dim);
    let outranks = |a: usize, b: usize| {
        quals[a]
            .total_cmp(&quals[b])
            .then_with(|| globals[b].cmp(&globals[a]))
            == Ordering::Greater
    };

    let mut state: Vec<i8> = candidates
        .iter()
        .map(|&c| if c != 0 { UNKNOWN } else { NOT_IN })
        .collect();
    let mut rounds = 0usize;
    loop {
        let nunknown = state.iter().filter(|&&s| s == UNKNOWN).count() as u64;
        if mesh.comm().allreduce(nunknown, ReduceOp::Max)? == 0 {
            break;
        }
        rounds += 1;

        let snapshot = state.clone();
        for e in (0..n).filter(|&e| snapshot[e] == UNKNOWN) {
            if star.row(e).iter().any(|&o| snapshot[o] == IN) {
                state[e] = NOT_IN;
            }
        }
        state = mesh.sync_array(dim, &state, 1)?;

        let snapshot = state.clone();
        for e in (0..n).filter(|&e| snapshot[e] == UNKNOWN) {
            if star
                .row(e)
                .iter()
                .all(|&o| snapshot[o] != UNKNOWN || outranks(e, o))
            {
                state[e] = IN;
            }
        }
        state = mesh.sync_array(dim, &state, 1)?;
    }
    log::debug!(
        "rank {}: independent set settled after {rounds} rounds",
        mesh.comm().rank()
    );
    Ok(state.into_iter().map(|s| i8::from(s == IN)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::simplex::EDGE;

    fn square() -> Mesh {
        let coords = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2, 0, 2, 3]).unwrap()
    }

    #[test]
    fn ties_go_to_the_lower_global() {
        let mesh = square();
        // (0,1) wins first; (0,3) then beats (2,3) on global ID
        let picked = find_indset(&mesh, EDGE, &[0.5; 5], &[1; 5]).unwrap();
        assert_eq!(picked, vec![1, 0, 1, 0, 0]);
    }

    #[test]
    fn quality_wins_over_global_order() {
        let mesh = square();
        let picked = find_indset(&mesh, EDGE, &[0.1, 0.9, 0.1, 0.1, 0.1], &[1; 5]).unwrap();
        assert_eq!(picked, vec![0, 1, 0, 0, 0]);
    }

    #[test]
    fn unflagged_entities_stay_out() {
        let mesh = square();
        let picked = find_indset(&mesh, EDGE, &[0.0; 5], &[0, 0, 1, 0, 0]).unwrap();
        assert_eq!(picked, vec![0, 0, 1, 0, 0]);
    }
}
