//! Partition modes and the collective switch between them.
//!
//! - [`Parting::ElementBased`]: a rank holds the elements it owns plus their
//!   closure.
//! - [`Parting::Ghosted`]: additionally, one layer of elements owned
//!   elsewhere that share a vertex with an owned element, with closure.
//!
//! Ghost copies carry their owner's rank and tag values as of the switch.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{KIND_GHOST_LAYER, WireEntity, WireReader, WireWriter};
use crate::data::tag::ScalarType;
use crate::mesh_error::MeshError;
use crate::topology::mesh::Mesh;
use crate::topology::ownership::{entity_holders, reown_lower_entities};
use crate::topology::simplex::{VERT, nverts_of};
use bytes::Bytes;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a distributed mesh is laid out across ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parting {
    /// Owned elements plus closure.
    ElementBased,
    /// Owned elements, one vertex-adjacent layer of ghost elements, closure.
    Ghosted,
}

impl<C: Communicator> Mesh<C> {
    /// Switch the partition mode. Collective; a no-op when the mesh is already
    /// in `mode`.
    pub fn set_parting(&mut self, mode: Parting) -> Result<(), MeshError> {
        if mode == self.parting {
            return Ok(());
        }
        log::debug!(
            "rank {}: switching parting {:?} -> {mode:?}",
            self.comm().rank(),
            self.parting
        );
        match mode {
            Parting::Ghosted => add_ghost_layer(self)?,
            Parting::ElementBased => shed_ghosts(self)?,
        }
        self.parting = mode;
        Ok(())
    }
}

/// Closure of a set of elements, per dimension, as sorted local indices.
fn closure<C: Communicator>(
    mesh: &Mesh<C>,
    elems: &BTreeSet<usize>,
    downs: &[Vec<usize>],
) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = downs
        .iter()
        .map(|down| {
            let per = down.len() / mesh.nelems().max(1);
            let set: BTreeSet<usize> = elems
                .iter()
                .flat_map(|&e| down[e * per..(e + 1) * per].iter().copied())
                .collect();
            set.into_iter().collect()
        })
        .collect();
    out.push(elems.iter().copied().collect());
    out
}

fn encode_ghost_packet<C: Communicator>(mesh: &Mesh<C>, ents: &[Vec<usize>]) -> Bytes {
    let vert_globals = mesh.globals(VERT);
    let mut w = WireWriter::with_header(KIND_GHOST_LAYER);
    for (d, rows) in ents.iter().enumerate() {
        let (globals, owners, verts) = (mesh.globals(d), mesh.owners(d), mesh.ents2verts(d));
        w.put_count(rows.len());
        for &e in rows {
            w.put_pod(&WireEntity::new(globals[e], owners[e]));
            if d > VERT {
                for &v in &verts[e * nverts_of(d)..(e + 1) * nverts_of(d)] {
                    w.put_u64(vert_globals[v]);
                }
            }
        }
        let tags = mesh.tags(d);
        w.put_count(tags.len());
        for tag in tags {
            w.put_str(tag.name());
            w.put_str(tag.scalar_type().as_str());
            w.put_count(tag.ncomps());
            w.put_slice(tag.data().gather(rows, tag.ncomps()).as_bytes());
        }
    }
    w.finish()
}

/// Append the entities of one received packet that this rank does not hold.
fn merge_ghost_packet<C: Communicator>(
    mesh: &mut Mesh<C>,
    src: usize,
    buf: Bytes,
) -> Result<(), MeshError> {
    let me = mesh.comm().rank();
    let mut r = WireReader::with_header(buf, KIND_GHOST_LAYER)?;
    for d in 0..=mesh.dim() {
        let n = r.get_count()?;
        let known = mesh.globals_to_locals(d);
        let vert_locals = mesh.globals_to_locals(VERT);
        let mut fresh_rows = Vec::new();
        let mut seen = HashSet::new();
        let stratum_len_before = mesh.nents(d);
        for row in 0..n {
            let ent: WireEntity = r.get_pod()?;
            let mut verts = Vec::with_capacity(nverts_of(d));
            if d > VERT {
                for _ in 0..nverts_of(d) {
                    let g = r.get_u64()?;
                    let v = vert_locals.get(&g).copied().ok_or(MeshError::MissingGlobal {
                        dim: VERT,
                        global: g,
                        rank: me,
                    })?;
                    verts.push(v);
                }
            }
            if known.contains_key(&ent.global()) || !seen.insert(ent.global()) {
                continue;
            }
            fresh_rows.push(row);
            let stratum = &mut mesh.strata[d];
            if d == VERT {
                stratum.verts.push(stratum.globals.len());
            } else {
                stratum.verts.extend(verts);
            }
            stratum.globals.push(ent.global());
            stratum.owners.push(ent.owner());
        }
        let ntags = r.get_count()?;
        if ntags != mesh.tags(d).len() {
            return Err(MeshError::CommError {
                neighbor: src,
                reason: format!(
                    "{ntags} tags on dimension {d}, this rank has {}",
                    mesh.tags(d).len()
                ),
            });
        }
        for _ in 0..ntags {
            let name = r.get_string()?;
            let label = r.get_string()?;
            let kind = ScalarType::parse(&label)
                .ok_or_else(|| MeshError::Wire(format!("unknown scalar type `{label}`")))?;
            let ncomps = r.get_count()?;
            let bytes: Vec<u8> = r.get_vec()?;
            let tag = mesh
                .tags_mut(d)
                .iter_mut()
                .find(|t| t.name() == name)
                .ok_or_else(|| MeshError::MissingTag {
                    dim: d,
                    name: name.clone(),
                })?;
            if kind != tag.scalar_type() || ncomps != tag.ncomps() {
                return Err(MeshError::TagTypeMismatch {
                    dim: d,
                    name,
                    expected: tag.scalar_type().as_str(),
                    found: kind.as_str(),
                });
            }
            let width = bytes.len() / n.max(1);
            let mut picked = Vec::with_capacity(fresh_rows.len() * width);
            for &row in &fresh_rows {
                picked.extend_from_slice(&bytes[row * width..(row + 1) * width]);
            }
            tag.data_mut().extend_from_bytes(&picked)?;
        }
        debug_assert_eq!(mesh.nents(d), stratum_len_before + fresh_rows.len());
    }
    if !r.is_empty() {
        return Err(MeshError::CommError {
            neighbor: src,
            reason: "trailing bytes in ghost packet".into(),
        });
    }
    Ok(())
}

fn add_ghost_layer<C: Communicator>(mesh: &mut Mesh<C>) -> Result<(), MeshError> {
    let (me, size) = (mesh.comm().rank(), mesh.comm().size());
    let dim = mesh.dim();
    let holders = entity_holders(mesh, VERT)?;
    let downs: Vec<Vec<usize>> = (0..dim)
        .map(|d| mesh.ask_down(dim, d))
        .collect::<Result<_, _>>()?;

    let mut outgoing: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); size];
    let owners = mesh.owners(dim);
    for (e, vs) in mesh.ents2verts(dim).chunks_exact(nverts_of(dim)).enumerate() {
        if owners[e] != me {
            continue;
        }
        for &v in vs {
            for &r in holders[v].iter().filter(|&&r| r != me) {
                outgoing[r].insert(e);
            }
        }
    }
    let sends = outgoing
        .iter()
        .enumerate()
        .map(|(r, elems)| {
            if r == me || elems.is_empty() {
                Bytes::new()
            } else {
                encode_ghost_packet(mesh, &closure(mesh, elems, &downs))
            }
        })
        .collect();
    let received = mesh.comm().exchange(sends)?;
    for (src, buf) in received.into_iter().enumerate() {
        if src != me && !buf.is_empty() {
            merge_ghost_packet(mesh, src, buf)?;
        }
    }
    log::debug!(
        "rank {me}: ghosted mesh holds {} elements ({} owned)",
        mesh.nelems(),
        mesh.nowned(dim)
    );
    Ok(())
}

fn shed_ghosts<C: Communicator>(mesh: &mut Mesh<C>) -> Result<(), MeshError> {
    let me = mesh.comm().rank();
    let dim = mesh.dim();
    let owned: BTreeSet<usize> = (0..mesh.nelems())
        .filter(|&e| mesh.owners(dim)[e] == me)
        .collect();
    let downs: Vec<Vec<usize>> = (0..dim)
        .map(|d| mesh.ask_down(dim, d))
        .collect::<Result<_, _>>()?;
    let keep_rows = closure(mesh, &owned, &downs);

    let mut vert_map: Vec<Option<usize>> = vec![None; mesh.nverts()];
    for (new, &old) in keep_rows[VERT].iter().enumerate() {
        vert_map[old] = Some(new);
    }
    for (d, rows) in keep_rows.iter().enumerate() {
        let mut keep = vec![false; mesh.nents(d)];
        rows.iter().for_each(|&i| keep[i] = true);
        let stratum = &mut mesh.strata[d];
        stratum.retain(&keep, nverts_of(d));
        if d == VERT {
            stratum.verts = (0..stratum.nents()).collect();
        } else {
            stratum.verts = stratum
                .verts
                .iter()
                .map(|&v| {
                    vert_map[v].ok_or_else(|| MeshError::InvalidConnectivity {
                        dim: d,
                        reason: format!("kept entity uses dropped vertex {v}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
    }
    reown_lower_entities(mesh)?;
    log::debug!("rank {me}: element-based mesh holds {} elements", mesh.nelems());
    Ok(())
}
