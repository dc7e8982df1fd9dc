//! Ghost completion of per-entity arrays.
//!
//! Two rounds of personalized exchange so every rank receives owner values
//! for its ghost copies:
//!
//! 1. Each rank asks every owner for the global IDs of the copies it holds.
//! 2. Owners answer with the requested rows, in request order.
//!
//! Values at owned entities are returned unchanged.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{WireReader, WireWriter, decode_u64s, encode_u64s};
use crate::data::tag::TagValue;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;

/// Overwrite ghost rows of `data` (`ncomps` values per entity of `dim`) with
/// their owners' values. Collective.
pub fn sync_array<C: Communicator, T: TagValue>(
    mesh: &Mesh<C>,
    dim: usize,
    data: &[T],
    ncomps: usize,
) -> Result<Vec<T>, MeshError> {
    mesh.check_dim(dim)?;
    let expected = mesh.nents(dim) * ncomps;
    if data.len() != expected {
        return Err(MeshError::TagSizeMismatch {
            dim,
            name: "<synced array>".into(),
            expected,
            found: data.len(),
        });
    }
    let comm = mesh.comm();
    let (me, size) = (comm.rank(), comm.size());
    let mut out = data.to_vec();
    if size == 1 {
        return Ok(out);
    }

    let (globals, owners) = (mesh.globals(dim), mesh.owners(dim));
    let mut wanted: Vec<Vec<u64>> = vec![Vec::new(); size];
    let mut wanted_locals: Vec<Vec<usize>> = vec![Vec::new(); size];
    for (local, (&g, &o)) in globals.iter().zip(owners).enumerate() {
        if o != me {
            wanted[o].push(g);
            wanted_locals[o].push(local);
        }
    }
    let requests = comm.exchange(wanted.iter().map(|w| encode_u64s(w)).collect())?;

    let g2l = mesh.globals_to_locals(dim);
    let mut replies = Vec::with_capacity(size);
    for buf in requests {
        let asked = decode_u64s(buf)?;
        let mut rows = Vec::with_capacity(asked.len() * ncomps);
        for g in asked {
            let l = *g2l.get(&g).ok_or(MeshError::MissingGlobal {
                dim,
                global: g,
                rank: me,
            })?;
            rows.extend_from_slice(&data[l * ncomps..(l + 1) * ncomps]);
        }
        let mut w = WireWriter::new();
        w.put_slice(&rows);
        replies.push(w.finish());
    }
    let answers = comm.exchange(replies)?;

    for (src, buf) in answers.into_iter().enumerate() {
        let values: Vec<T> = WireReader::new(buf).get_vec()?;
        let locals = &wanted_locals[src];
        if values.len() != locals.len() * ncomps {
            return Err(MeshError::CommError {
                neighbor: src,
                reason: format!(
                    "owner sent {} values for {} entities",
                    values.len(),
                    locals.len()
                ),
            });
        }
        for (row, &l) in locals.iter().enumerate() {
            out[l * ncomps..(l + 1) * ncomps]
                .copy_from_slice(&values[row * ncomps..(row + 1) * ncomps]);
        }
    }
    Ok(out)
}

impl<C: Communicator> Mesh<C> {
    /// See [`sync_array`].
    pub fn sync_array<T: TagValue>(
        &self,
        dim: usize,
        data: &[T],
        ncomps: usize,
    ) -> Result<Vec<T>, MeshError> {
        sync_array(self, dim, data, ncomps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::simplex::EDGE;

    #[test]
    fn serial_sync_is_identity() {
        let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2]).unwrap();
        let vals = vec![3i32, 1, 4];
        assert_eq!(mesh.sync_array(EDGE, &vals, 1).unwrap(), vals);
        assert!(matches!(
            mesh.sync_array(EDGE, &[1.0f64], 1),
            Err(MeshError::TagSizeMismatch { .. })
        ));
    }
}
