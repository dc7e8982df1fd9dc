//! Global numbering helpers for the rebuild: canonical key order and
//! compaction of global IDs past removed entities.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{decode_u64s, encode_u64s};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;

/// Every rank's `local` globals, merged, sorted and deduplicated. Collective.
pub fn gather_sorted_globals<C: Communicator>(
    comm: &C,
    local: &[u64],
) -> Result<Vec<u64>, MeshError> {
    let parts = comm.allgather(encode_u64s(local))?;
    let mut all = Vec::new();
    for part in parts {
        all.extend(decode_u64s(part)?);
    }
    all.sort_unstable();
    all.dedup();
    Ok(all)
}

/// New global of a surviving entity: `global` minus the number of removed
/// globals below it. `removed` must be sorted.
pub fn compact_global(removed: &[u64], global: u64) -> u64 {
    global - removed.partition_point(|&r| r < global) as u64
}

/// Position of each key among all keys of the distributed mesh, ordered by
/// global ID; `-1` for non-keys. Collective.
///
/// The order depends only on global IDs, so it is the same for any number of
/// ranks.
pub fn get_edge2rep_order<C: Communicator>(
    mesh: &Mesh<C>,
    dim: usize,
    keys: &[i8],
) -> Result<Vec<i64>, MeshError> {
    let me = mesh.comm().rank();
    let (globals, owners) = (mesh.globals(dim), mesh.owners(dim));
    let owned_keys: Vec<u64> = (0..keys.len())
        .filter(|&i| keys[i] != 0 && owners[i] == me)
        .map(|i| globals[i])
        .collect();
    let all = gather_sorted_globals(mesh.comm(), &owned_keys)?;
    keys.iter()
        .zip(globals)
        .map(|(&k, &g)| {
            if k == 0 {
                return Ok(-1);
            }
            all.binary_search(&g)
                .map(|pos| pos as i64)
                .map_err(|_| MeshError::MissingGlobal {
                    dim,
                    global: g,
                    rank: me,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::simplex::EDGE;

    #[test]
    fn compaction_skips_removed() {
        let removed = [2, 5];
        assert_eq!(compact_global(&removed, 1), 1);
        assert_eq!(compact_global(&removed, 3), 2);
        assert_eq!(compact_global(&removed, 6), 4);
    }

    #[test]
    fn rep_order_follows_globals() {
        let coords = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2, 0, 2, 3]).unwrap();
        let order = get_edge2rep_order(&mesh, EDGE, &[0, 0, 1, 1, 0]).unwrap();
        assert_eq!(order, vec![-1, -1, 0, 1, -1]);
    }
}
