//! Distributed simplicial mesh.
//!
//! A [`Mesh`] stores, per entity dimension, a [`Stratum`]: entity→vertex
//! connectivity, global IDs, owner ranks and tags. Every rank holds its own
//! `Mesh`; together they describe one distributed mesh whose layout is given by
//! the current [`Parting`].
//!
//! Conventions:
//! - elements (top dimension) keep the vertex order they were built with, so
//!   their orientation is preserved through refinement;
//! - lower-dimensional entities list their vertices in ascending global order;
//! - global IDs of every dimension are contiguous, `0..nglobal_ents(d)`.

use crate::algs::communicator::{Communicator, NoComm, ReduceOp};
use crate::data::tag::{ScalarType, Tag, TagValue, TransferPolicy};
use crate::mesh_error::MeshError;
use crate::topology::adjacency::{Csr, find_down, invert, star};
use crate::topology::parting::Parting;
use crate::topology::simplex::{SimplexKey, VERT, nsubs, nverts_of, simplex_key, sub_positions};
use hashbrown::HashMap;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Name of the vertex coordinate tag.
pub const COORDINATES: &str = "coordinates";

/// Entities of one dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stratum {
    /// `d + 1` local vertex indices per entity (identity for vertices).
    pub(crate) verts: Vec<usize>,
    pub(crate) globals: Vec<u64>,
    pub(crate) owners: Vec<usize>,
    pub(crate) tags: Vec<Tag>,
}

impl Stratum {
    pub fn nents(&self) -> usize {
        self.globals.len()
    }

    /// Keep the entities flagged in `keep`, in order. Connectivity is left
    /// untouched; the caller remaps it.
    pub(crate) fn retain(&mut self, keep: &[bool], per_ent: usize) {
        let rows: Vec<usize> = (0..self.nents()).filter(|&i| keep[i]).collect();
        self.verts = rows
            .iter()
            .flat_map(|&i| self.verts[i * per_ent..(i + 1) * per_ent].iter().copied())
            .collect();
        self.globals = rows.iter().map(|&i| self.globals[i]).collect();
        self.owners = rows.iter().map(|&i| self.owners[i]).collect();
        for tag in &mut self.tags {
            let data = tag.data().gather(&rows, tag.ncomps());
            tag.set_data(data);
        }
    }
}

/// One rank's part of a distributed simplicial mesh.
#[derive(Clone, Debug)]
pub struct Mesh<C: Communicator = NoComm> {
    comm: C,
    dim: usize,
    pub(crate) parting: Parting,
    keeps_canonical_globals: bool,
    pub(crate) strata: Vec<Stratum>,
}

impl<C: Communicator> Mesh<C> {
    /// Empty mesh of dimension `dim` (1, 2 or 3).
    pub fn new(comm: C, dim: usize) -> Result<Self, MeshError> {
        if !(1..=3).contains(&dim) {
            return Err(MeshError::UnsupportedDimension(dim));
        }
        Ok(Self {
            comm,
            dim,
            parting: Parting::ElementBased,
            keeps_canonical_globals: false,
            strata: vec![Stratum::default(); dim + 1],
        })
    }

    /// Build this rank's part of a mesh from a global description.
    ///
    /// Every rank passes the same `coords` (`dim` values per vertex),
    /// `elem_verts` (`dim + 1` vertex indices per element) and `elem_owners`
    /// (owning rank per element). The rank keeps the elements it owns plus
    /// their closure; lower entities are owned by the lowest rank holding them.
    /// The result is in [`Parting::ElementBased`] mode.
    ///
    /// Collective in the sense that all ranks must pass identical input; no
    /// messages are exchanged.
    pub fn from_partition(
        comm: C,
        dim: usize,
        coords: &[f64],
        elem_verts: &[usize],
        elem_owners: &[usize],
    ) -> Result<Self, MeshError> {
        let mut mesh = Self::new(comm, dim)?;
        let per_elem = nverts_of(dim);
        if coords.len() % dim != 0 {
            return Err(MeshError::TagSizeMismatch {
                dim: VERT,
                name: COORDINATES.into(),
                expected: coords.len() / dim * dim,
                found: coords.len(),
            });
        }
        let nverts = coords.len() / dim;
        if elem_verts.len() % per_elem != 0 {
            return Err(MeshError::InvalidConnectivity {
                dim,
                reason: format!("{} indices is not a multiple of {per_elem}", elem_verts.len()),
            });
        }
        let nelems = elem_verts.len() / per_elem;
        if elem_owners.len() != nelems {
            return Err(MeshError::InvalidConnectivity {
                dim,
                reason: format!("{} owners for {nelems} elements", elem_owners.len()),
            });
        }
        let (me, size) = (mesh.comm.rank(), mesh.comm.size());
        let mut used = vec![false; nverts];
        for (e, vs) in elem_verts.chunks_exact(per_elem).enumerate() {
            if let Some(&v) = vs.iter().find(|&&v| v >= nverts) {
                return Err(MeshError::InvalidConnectivity {
                    dim,
                    reason: format!("element {e} references vertex {v} of {nverts}"),
                });
            }
            if vs.iter().duplicates().next().is_some() {
                return Err(MeshError::InvalidConnectivity {
                    dim,
                    reason: format!("element {e} repeats a vertex: {vs:?}"),
                });
            }
            if elem_owners[e] >= size {
                return Err(MeshError::InvalidConnectivity {
                    dim,
                    reason: format!("element {e} owned by rank {} of {size}", elem_owners[e]),
                });
            }
            vs.iter().for_each(|&v| used[v] = true);
        }
        if let Some(v) = used.iter().position(|&u| !u) {
            return Err(MeshError::InvalidConnectivity {
                dim: VERT,
                reason: format!("vertex {v} is not used by any element"),
            });
        }

        // Global numbering of lower entities follows the sorted vertex tuples;
        // the owner of a lower entity is the lowest owner of an element around it.
        let mut lower: Vec<BTreeMap<SimplexKey, usize>> = vec![BTreeMap::new(); dim];
        for (e, vs) in elem_verts.chunks_exact(per_elem).enumerate() {
            for (d, table) in lower.iter_mut().enumerate() {
                for pos in sub_positions(dim, d) {
                    let key = simplex_key(&pos.iter().map(|&p| vs[p]).collect::<Vec<_>>());
                    let owner = table.entry(key).or_insert(elem_owners[e]);
                    *owner = (*owner).min(elem_owners[e]);
                }
            }
        }

        let mine: Vec<usize> = (0..nelems).filter(|&e| elem_owners[e] == me).collect();
        let mut local_verts: Vec<usize> = mine
            .iter()
            .flat_map(|&e| elem_verts[e * per_elem..(e + 1) * per_elem].iter().copied())
            .collect();
        local_verts.sort_unstable();
        local_verts.dedup();
        let to_local: HashMap<usize, usize> =
            local_verts.iter().enumerate().map(|(l, &g)| (g, l)).collect();

        mesh.strata[VERT] = Stratum {
            verts: (0..local_verts.len()).collect(),
            globals: local_verts.iter().map(|&g| g as u64).collect(),
            owners: local_verts.iter().map(|&g| lower[VERT][&simplex_key(&[g])]).collect(),
            tags: Vec::new(),
        };
        for d in 1..dim {
            let keys: Vec<SimplexKey> = mine
                .iter()
                .flat_map(|&e| {
                    let vs = &elem_verts[e * per_elem..(e + 1) * per_elem];
                    sub_positions(dim, d)
                        .into_iter()
                        .map(move |pos| simplex_key(&pos.iter().map(|&p| vs[p]).collect::<Vec<_>>()))
                })
                .sorted_unstable()
                .dedup()
                .collect();
            let gids: HashMap<SimplexKey, u64> = lower[d]
                .keys()
                .enumerate()
                .map(|(i, k)| (*k, i as u64))
                .collect();
            mesh.strata[d] = Stratum {
                verts: keys
                    .iter()
                    .flat_map(|k| k[..nverts_of(d)].iter().map(|g| to_local[g]))
                    .collect(),
                globals: keys.iter().map(|k| gids[k]).collect(),
                owners: keys.iter().map(|k| lower[d][k]).collect(),
                tags: Vec::new(),
            };
        }
        mesh.strata[dim] = Stratum {
            verts: mine
                .iter()
                .flat_map(|&e| elem_verts[e * per_elem..(e + 1) * per_elem].iter().map(|g| to_local[g]))
                .collect(),
            globals: mine.iter().map(|&e| e as u64).collect(),
            owners: vec![me; mine.len()],
            tags: Vec::new(),
        };
        let local_coords: Vec<f64> = local_verts
            .iter()
            .flat_map(|&g| coords[g * dim..(g + 1) * dim].iter().copied())
            .collect();
        mesh.add_tag(VERT, COORDINATES, dim, TransferPolicy::LinearInterp, local_coords)?;
        log::debug!(
            "rank {me}: built {} local elements of {nelems}, {} vertices",
            mine.len(),
            mesh.nverts()
        );
        Ok(mesh)
    }

    /// Build a mesh whose elements all live on rank 0.
    pub fn from_simplices(
        comm: C,
        dim: usize,
        coords: &[f64],
        elem_verts: &[usize],
    ) -> Result<Self, MeshError> {
        let owners = vec![0; elem_verts.len() / nverts_of(dim).max(1)];
        Self::from_partition(comm, dim, coords, elem_verts, &owners)
    }

    /// A mesh with the same communicator, dimension and numbering mode but no
    /// entities and no tags.
    pub fn copy_meta(&self) -> Self {
        Self {
            comm: self.comm.clone(),
            dim: self.dim,
            parting: self.parting,
            keeps_canonical_globals: self.keeps_canonical_globals,
            strata: vec![Stratum::default(); self.dim + 1],
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn parting(&self) -> Parting {
        self.parting
    }

    /// Whether refinement numbers new entities independently of the partition.
    pub fn keeps_canonical_globals(&self) -> bool {
        self.keeps_canonical_globals
    }

    pub fn set_keeps_canonical_globals(&mut self, yes: bool) {
        self.keeps_canonical_globals = yes;
    }

    /// Builder form of [`Mesh::set_keeps_canonical_globals`].
    pub fn with_canonical_globals(mut self, yes: bool) -> Self {
        self.keeps_canonical_globals = yes;
        self
    }

    pub(crate) fn check_dim(&self, dim: usize) -> Result<(), MeshError> {
        if dim > self.dim {
            Err(MeshError::DimensionOutOfRange {
                dim,
                mesh_dim: self.dim,
            })
        } else {
            Ok(())
        }
    }

    /// Number of local entities (owned and ghost) of dimension `dim`.
    pub fn nents(&self, dim: usize) -> usize {
        self.strata.get(dim).map_or(0, Stratum::nents)
    }

    pub fn nverts(&self) -> usize {
        self.nents(VERT)
    }

    pub fn nedges(&self) -> usize {
        self.nents(1)
    }

    pub fn nelems(&self) -> usize {
        self.nents(self.dim)
    }

    /// Flat entity→vertex connectivity, `dim + 1` entries per entity.
    pub fn ents2verts(&self, dim: usize) -> &[usize] {
        self.strata.get(dim).map_or(&[], |s| &s.verts)
    }

    pub fn globals(&self, dim: usize) -> &[u64] {
        self.strata.get(dim).map_or(&[], |s| &s.globals)
    }

    pub fn owners(&self, dim: usize) -> &[usize] {
        self.strata.get(dim).map_or(&[], |s| &s.owners)
    }

    pub(crate) fn owners_mut(&mut self, dim: usize) -> Result<&mut Vec<usize>, MeshError> {
        self.check_dim(dim)?;
        Ok(&mut self.strata[dim].owners)
    }

    /// Number of local entities of `dim` owned by this rank.
    pub fn nowned(&self, dim: usize) -> usize {
        let me = self.comm.rank();
        self.owners(dim).iter().filter(|&&o| o == me).count()
    }

    /// Global entity count of dimension `dim`. Collective.
    pub fn nglobal_ents(&self, dim: usize) -> Result<u64, MeshError> {
        self.check_dim(dim)?;
        self.comm.allreduce(self.nowned(dim) as u64, ReduceOp::Sum)
    }

    /// Global ID → local index for dimension `dim`.
    pub fn globals_to_locals(&self, dim: usize) -> HashMap<u64, usize> {
        self.globals(dim)
            .iter()
            .enumerate()
            .map(|(l, &g)| (g, l))
            .collect()
    }

    /// Replace the entities of one dimension. Tags on that dimension are
    /// removed.
    pub(crate) fn set_ents(
        &mut self,
        dim: usize,
        verts: Vec<usize>,
        globals: Vec<u64>,
        owners: Vec<usize>,
    ) -> Result<(), MeshError> {
        self.check_dim(dim)?;
        let n = globals.len();
        let verts = if dim == VERT { (0..n).collect() } else { verts };
        if verts.len() != n * nverts_of(dim) || owners.len() != n {
            return Err(MeshError::InvalidConnectivity {
                dim,
                reason: format!(
                    "{n} entities with {} vertex indices and {} owners",
                    verts.len(),
                    owners.len()
                ),
            });
        }
        if dim > VERT {
            let nverts = self.nverts();
            if let Some(&v) = verts.iter().find(|&&v| v >= nverts) {
                return Err(MeshError::InvalidConnectivity {
                    dim,
                    reason: format!("vertex {v} of {nverts}"),
                });
            }
        }
        self.strata[dim] = Stratum {
            verts,
            globals,
            owners,
            tags: Vec::new(),
        };
        Ok(())
    }

    // --- tags ---

    fn check_policy(
        &self,
        dim: usize,
        name: &str,
        policy: TransferPolicy,
        kind: ScalarType,
    ) -> Result<(), MeshError> {
        let ok = match policy {
            TransferPolicy::Drop | TransferPolicy::Inherit => true,
            TransferPolicy::LinearInterp => dim == VERT && kind == ScalarType::F64,
            TransferPolicy::Conserve => dim == self.dim && kind == ScalarType::F64,
        };
        if ok {
            Ok(())
        } else {
            Err(MeshError::InvalidTransferPolicy {
                dim,
                name: name.into(),
                policy: policy.as_str(),
            })
        }
    }

    /// Attach a tag. Fails if a tag of that name exists, if `data` is not
    /// `nents(dim) * ncomps` long, or if `policy` cannot serve this
    /// dimension and type.
    pub fn add_tag<T: TagValue>(
        &mut self,
        dim: usize,
        name: &str,
        ncomps: usize,
        policy: TransferPolicy,
        data: Vec<T>,
    ) -> Result<(), MeshError> {
        self.push_tag(dim, Tag::new(name, ncomps, policy, data))
    }

    /// Attach a tag, replacing any tag of the same name.
    pub fn set_tag<T: TagValue>(
        &mut self,
        dim: usize,
        name: &str,
        ncomps: usize,
        policy: TransferPolicy,
        data: Vec<T>,
    ) -> Result<(), MeshError> {
        if self.has_tag(dim, name) {
            self.remove_tag(dim, name)?;
        }
        self.add_tag(dim, name, ncomps, policy, data)
    }

    pub(crate) fn push_tag(&mut self, dim: usize, tag: Tag) -> Result<(), MeshError> {
        self.check_dim(dim)?;
        if self.has_tag(dim, tag.name()) {
            return Err(MeshError::DuplicateTag {
                dim,
                name: tag.name().into(),
            });
        }
        let expected = self.nents(dim) * tag.ncomps();
        if tag.ncomps() == 0 || tag.data().len() != expected {
            return Err(MeshError::TagSizeMismatch {
                dim,
                name: tag.name().into(),
                expected,
                found: tag.data().len(),
            });
        }
        self.check_policy(dim, tag.name(), tag.policy(), tag.scalar_type())?;
        self.strata[dim].tags.push(tag);
        Ok(())
    }

    pub fn has_tag(&self, dim: usize, name: &str) -> bool {
        self.tags(dim).iter().any(|t| t.name() == name)
    }

    /// All tags on dimension `dim`, in insertion order.
    pub fn tags(&self, dim: usize) -> &[Tag] {
        self.strata.get(dim).map_or(&[], |s| &s.tags)
    }

    pub fn get_tag(&self, dim: usize, name: &str) -> Result<&Tag, MeshError> {
        self.check_dim(dim)?;
        self.tags(dim)
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| MeshError::MissingTag {
                dim,
                name: name.into(),
            })
    }

    /// Typed view of a tag's values.
    pub fn get_array<T: TagValue>(&self, dim: usize, name: &str) -> Result<&[T], MeshError> {
        let tag = self.get_tag(dim, name)?;
        tag.array::<T>().ok_or_else(|| MeshError::TagTypeMismatch {
            dim,
            name: name.into(),
            expected: T::TYPE.as_str(),
            found: tag.scalar_type().as_str(),
        })
    }

    /// Detach and return a tag.
    pub fn remove_tag(&mut self, dim: usize, name: &str) -> Result<Tag, MeshError> {
        self.check_dim(dim)?;
        let tags = &mut self.strata[dim].tags;
        let pos = tags
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| MeshError::MissingTag {
                dim,
                name: name.into(),
            })?;
        Ok(tags.remove(pos))
    }

    pub(crate) fn tags_mut(&mut self, dim: usize) -> &mut Vec<Tag> {
        &mut self.strata[dim].tags
    }

    /// Vertex coordinates, `dim()` values per vertex.
    pub fn coords(&self) -> Result<&[f64], MeshError> {
        self.get_array(VERT, COORDINATES)
    }

    // --- adjacency ---

    /// Downward adjacency `high → low`; see [`sub_positions`] for the order.
    pub fn ask_down(&self, high: usize, low: usize) -> Result<Vec<usize>, MeshError> {
        self.check_dim(high)?;
        if low >= high {
            return Err(MeshError::DimensionOutOfRange {
                dim: low,
                mesh_dim: high.saturating_sub(1),
            });
        }
        find_down(self.ents2verts(high), high, self.ents2verts(low), low)
    }

    /// Upward adjacency `low → high`, rows sorted by `high` index.
    pub fn ask_up(&self, low: usize, high: usize) -> Result<Csr, MeshError> {
        let down = self.ask_down(high, low)?;
        Ok(invert(&down, nsubs(high, low), self.nents(low)))
    }

    /// Entities of dimension `dim` sharing an element with each entity.
    pub fn ask_star(&self, dim: usize) -> Result<Csr, MeshError> {
        let top = self.dim;
        if dim == top {
            // two elements never share an element
            return Ok(Csr::from_rows((0..self.nents(dim)).map(|_| [0usize; 0])));
        }
        let down = self.ask_down(top, dim)?;
        let up = invert(&down, nsubs(top, dim), self.nents(dim));
        Ok(star(&up, &down, nsubs(top, dim)))
    }

    /// Euclidean length of every local edge.
    pub fn ask_lengths(&self) -> Result<Vec<f64>, MeshError> {
        crate::geometry::metrics::edge_lengths(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::simplex::{EDGE, TRI};

    fn square() -> Mesh {
        let coords = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2, 0, 2, 3]).unwrap()
    }

    #[test]
    fn builder_derives_edges() {
        let mesh = square();
        assert_eq!((mesh.nverts(), mesh.nedges(), mesh.nelems()), (4, 5, 2));
        // edges in sorted vertex order
        assert_eq!(mesh.ents2verts(EDGE), &[0, 1, 0, 2, 0, 3, 1, 2, 2, 3]);
        assert_eq!(mesh.globals(EDGE), &[0, 1, 2, 3, 4]);
        assert_eq!(mesh.nglobal_ents(TRI).unwrap(), 2);
    }

    #[test]
    fn tag_policies_are_validated() {
        let mut mesh = square();
        let err = mesh
            .add_tag(EDGE, "len", 1, TransferPolicy::LinearInterp, vec![0.0; 5])
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidTransferPolicy { dim: 1, .. }));
        let err = mesh
            .add_tag(TRI, "mass", 1, TransferPolicy::Conserve, vec![1i32, 2])
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidTransferPolicy { .. }));
        mesh.add_tag(TRI, "mass", 1, TransferPolicy::Conserve, vec![1.0, 2.0])
            .unwrap();
        assert!(matches!(
            mesh.add_tag(TRI, "mass", 1, TransferPolicy::Drop, vec![0i8, 0]),
            Err(MeshError::DuplicateTag { .. })
        ));
    }

    #[test]
    fn tag_access_checks_type_and_size() {
        let mut mesh = square();
        assert!(matches!(
            mesh.add_tag(EDGE, "flag", 1, TransferPolicy::Drop, vec![0i8; 4]),
            Err(MeshError::TagSizeMismatch { expected: 5, found: 4, .. })
        ));
        mesh.add_tag(EDGE, "flag", 1, TransferPolicy::Drop, vec![1i8; 5])
            .unwrap();
        assert!(matches!(
            mesh.get_array::<f64>(EDGE, "flag"),
            Err(MeshError::TagTypeMismatch { .. })
        ));
        let tag = mesh.remove_tag(EDGE, "flag").unwrap();
        assert_eq!(tag.array::<i8>().unwrap().len(), 5);
        assert!(!mesh.has_tag(EDGE, "flag"));
    }

    #[test]
    fn copy_meta_has_no_entities() {
        let mesh = square().with_canonical_globals(true);
        let empty = mesh.copy_meta();
        assert_eq!(empty.dim(), 2);
        assert!(empty.keeps_canonical_globals());
        assert_eq!(empty.nverts(), 0);
        assert!(empty.tags(VERT).is_empty());
    }

    #[test]
    fn rejects_bad_connectivity() {
        let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        assert!(matches!(
            Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 1]),
            Err(MeshError::InvalidConnectivity { .. })
        ));
        assert!(matches!(
            Mesh::from_simplices(NoComm, 4, &coords, &[0, 1, 2]),
            Err(MeshError::UnsupportedDimension(4))
        ));
    }
}
