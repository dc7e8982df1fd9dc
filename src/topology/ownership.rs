//! Ownership of distributed entities.
//!
//! Every entity has exactly one owning rank; all copies of an entity agree on
//! it. Holders of an entity are discovered by a rendezvous: the rank
//! `global % size` collects every rank that reports the global ID and answers
//! each reporter with the full, ascending list.

use crate::algs::communicator::{Communicator, ReduceOp};
use crate::algs::completion::sync_array;
use crate::algs::wire::{WireReader, WireWriter, decode_u64s, encode_u64s};
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::simplex::EDGE;
use std::collections::BTreeMap;

/// Ranks holding a copy of each local entity of dimension `dim`, ascending.
/// Collective.
pub fn entity_holders<C: Communicator>(
    mesh: &Mesh<C>,
    dim: usize,
) -> Result<Vec<Vec<usize>>, MeshError> {
    mesh.check_dim(dim)?;
    let comm = mesh.comm();
    let size = comm.size();
    let globals = mesh.globals(dim);

    let mut asked: Vec<Vec<u64>> = vec![Vec::new(); size];
    let mut asked_locals: Vec<Vec<usize>> = vec![Vec::new(); size];
    for (local, &g) in globals.iter().enumerate() {
        let dest = (g % size as u64) as usize;
        asked[dest].push(g);
        asked_locals[dest].push(local);
    }
    let requests = comm.exchange(asked.iter().map(|a| encode_u64s(a)).collect())?;
    let requests: Vec<Vec<u64>> = requests
        .into_iter()
        .map(decode_u64s)
        .collect::<Result<_, _>>()?;

    // rendezvous side
    let mut holders: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (src, req) in requests.iter().enumerate() {
        for &g in req {
            holders.entry(g).or_default().push(src);
        }
    }
    let replies = requests
        .iter()
        .map(|req| {
            let mut w = WireWriter::new();
            for g in req {
                let ranks: Vec<u64> = holders[g].iter().map(|&r| r as u64).collect();
                w.put_slice(&ranks);
            }
            w.finish()
        })
        .collect();
    let replies = comm.exchange(replies)?;

    let mut out = vec![Vec::new(); globals.len()];
    for (src, buf) in replies.into_iter().enumerate() {
        let mut r = WireReader::new(buf);
        for &local in &asked_locals[src] {
            out[local] = r.get_vec::<u64>()?.into_iter().map(|x| x as usize).collect();
        }
        if !r.is_empty() {
            return Err(MeshError::CommError {
                neighbor: src,
                reason: "trailing bytes in holder reply".into(),
            });
        }
    }
    Ok(out)
}

/// Give every entity below the top dimension to the lowest rank holding it.
/// Collective.
pub fn reown_lower_entities<C: Communicator>(mesh: &mut Mesh<C>) -> Result<(), MeshError> {
    for dim in 0..mesh.dim() {
        let holders = entity_holders(mesh, dim)?;
        let owners = holders
            .iter()
            .enumerate()
            .map(|(i, h)| {
                h.first().copied().ok_or(MeshError::MissingGlobal {
                    dim,
                    global: mesh.globals(dim)[i],
                    rank: mesh.comm().rank(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        *mesh.owners_mut(dim)? = owners;
    }
    Ok(())
}

/// Hand every element around a key entity to that key's owner.
///
/// Keys of one call are independent (no element contains two of them), so
/// each element is reassigned at most once. Every holder computes the same
/// result from its local copy; no messages are exchanged.
pub fn set_owners_by_indset<C: Communicator>(
    mesh: &mut Mesh<C>,
    key_dim: usize,
    keys2ents: &[usize],
) -> Result<(), MeshError> {
    let elem_dim = mesh.dim();
    let key_owners: Vec<usize> = keys2ents
        .iter()
        .map(|&k| mesh.owners(key_dim)[k])
        .collect();
    let new_owners = if key_dim == elem_dim {
        let mut owners = mesh.owners(elem_dim).to_vec();
        for (&k, &o) in keys2ents.iter().zip(&key_owners) {
            owners[k] = o;
        }
        owners
    } else {
        let up = mesh.ask_up(key_dim, elem_dim)?;
        let mut owners = mesh.owners(elem_dim).to_vec();
        let mut claimed = vec![false; owners.len()];
        for (&k, &o) in keys2ents.iter().zip(&key_owners) {
            for &e in up.row(k) {
                if claimed[e] {
                    return Err(MeshError::InvalidConnectivity {
                        dim: elem_dim,
                        reason: format!("element {e} is adjacent to two independent keys"),
                    });
                }
                claimed[e] = true;
                owners[e] = o;
            }
        }
        owners
    };
    if key_dim == EDGE {
        log::debug!(
            "rank {}: {} elements follow their key edge owner",
            mesh.comm().rank(),
            new_owners
                .iter()
                .zip(mesh.owners(elem_dim))
                .filter(|(a, b)| a != b)
                .count()
        );
    }
    *mesh.owners_mut(elem_dim)? = new_owners;
    Ok(())
}

/// Every rank that holds a copy of an entity reports the owner it stores;
/// returns whether all copies agree. Collective; intended for tests and
/// debugging.
pub fn owners_agree<C: Communicator>(mesh: &Mesh<C>, dim: usize) -> Result<bool, MeshError> {
    let synced = sync_array(
        mesh,
        dim,
        &mesh
            .owners(dim)
            .iter()
            .map(|&o| o as i64)
            .collect::<Vec<_>>(),
        1,
    )?;
    let local = synced
        .iter()
        .zip(mesh.owners(dim))
        .all(|(&a, &b)| a == b as i64);
    let all = mesh
        .comm()
        .allreduce(i32::from(local), ReduceOp::Min)?;
    Ok(all == 1)
}
