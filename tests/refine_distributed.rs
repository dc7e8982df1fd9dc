use mesh_refine::prelude::*;
use mesh_refine::topology::ownership::owners_agree;
use std::collections::BTreeMap;
use std::time::Duration;

mod util;
use util::{
    block_owners, grid_mesh, merge_owned, owned_coords, owned_ents, run_world, tet_grid,
    tet_volumes, tri_areas,
};

const NX: usize = 4;
const NY: usize = 3;

#[derive(Debug, PartialEq)]
struct Snapshot {
    refined: bool,
    counts: [u64; 3],
    owners_agree: bool,
    area: f64,
}

fn split_diagonals(comm: RayonComm) -> Snapshot {
    let mut mesh = grid_mesh(comm, NX, NY);
    // only the √2 diagonals are long, and no two share a triangle
    let refined = refine_by_size(&mut mesh, 1.2, 0.3, false).unwrap();
    let counts = [
        mesh.nglobal_ents(VERT).unwrap(),
        mesh.nglobal_ents(EDGE).unwrap(),
        mesh.nglobal_ents(TRI).unwrap(),
    ];
    let owners_agree = (0..=2).all(|d| owners_agree(&mesh, d).unwrap());
    let me = mesh.comm().rank();
    let local: f64 = tri_areas(&mesh)
        .iter()
        .zip(mesh.owners(TRI))
        .filter(|&(_, &o)| o == me)
        .map(|(a, _)| a)
        .sum();
    Snapshot {
        refined,
        counts,
        owners_agree,
        area: local,
    }
}

#[test]
fn every_rank_agrees_on_the_outcome() {
    for size in [1, 2, 3] {
        let snaps = run_world(size, split_diagonals);
        let cells = (NX * NY) as u64;
        let v0 = ((NX + 1) * (NY + 1)) as u64;
        let e0 = (NX * (NY + 1) + NY * (NX + 1)) as u64 + cells;
        for s in &snaps {
            assert!(s.refined);
            assert!(s.owners_agree);
            assert_eq!(s.counts, [v0 + cells, e0 + 3 * cells, 4 * cells]);
            let [v, e, f] = s.counts;
            assert_eq!(v + f - e, 1, "Euler characteristic of a disk");
        }
        let area: f64 = snaps.iter().map(|s| s.area).sum();
        assert!((area - cells as f64).abs() < 1e-9, "area {area} on {size} ranks");
    }
}

#[test]
fn nothing_to_split_anywhere() {
    let results = run_world(3, |comm| {
        let mut mesh = grid_mesh(comm, NX, NY);
        let nverts = mesh.nverts();
        let refined = refine_by_size(&mut mesh, 2.0, 0.0, false).unwrap();
        (refined, nverts == mesh.nverts(), mesh.parting())
    });
    for r in results {
        assert_eq!(r, (false, true, Parting::ElementBased));
    }
}

#[test]
fn quality_veto_restores_the_partition() {
    let results = run_world(2, |comm| {
        let mut mesh = grid_mesh(comm, NX, NY);
        let before = (mesh.nverts(), mesh.nedges(), mesh.nelems());
        // splitting a diagonal gives quality ≈ 0.87, edges give less
        let refined = refine_by_size(&mut mesh, 0.9, 0.95, false).unwrap();
        let after = (mesh.nverts(), mesh.nedges(), mesh.nelems());
        (refined, before == after, mesh.parting())
    });
    for r in results {
        assert_eq!(r, (false, true, Parting::ElementBased));
    }
}

#[test]
fn mismatched_arguments_fail_everywhere() {
    let results = run_world(2, |comm| {
        let comm = comm.with_timeout(Duration::from_secs(5));
        let mut mesh = grid_mesh(comm, NX, NY);
        let max_len = if mesh.comm().rank() == 0 { 1.0 } else { 1.5 };
        refine_by_size(&mut mesh, max_len, 0.0, false)
    });
    for r in results {
        assert!(matches!(
            r,
            Err(MeshError::CollectiveMismatch { what: "max_len", .. })
        ));
    }
}

#[test]
fn signed_zero_arguments_agree() {
    let results = run_world(2, |comm| {
        let comm = comm.with_timeout(Duration::from_secs(5));
        let mut mesh = grid_mesh(comm, NX, NY);
        let min_qual = if mesh.comm().rank() == 0 { 0.0 } else { -0.0 };
        refine_by_size(&mut mesh, 1.2, min_qual, false)
    });
    for r in results {
        assert!(matches!(r, Ok(true)), "{r:?}");
    }
}

type Layout = (
    BTreeMap<u64, Vec<u64>>,
    BTreeMap<u64, Vec<u64>>,
    BTreeMap<u64, Vec<u64>>,
);

fn canonical_layout(size: usize) -> Layout {
    let parts = run_world(size, |comm| {
        let mut mesh = grid_mesh(comm, NX, NY).with_canonical_globals(true);
        // every edge is a candidate; the selection has real conflicts
        for _ in 0..2 {
            refine_by_size(&mut mesh, 0.9, 0.0, false).unwrap();
        }
        (
            owned_coords(&mesh),
            owned_ents(&mesh, EDGE),
            owned_ents(&mesh, TRI),
        )
    });
    let mut coords = Vec::new();
    let mut edges = Vec::new();
    let mut tris = Vec::new();
    for (c, e, t) in parts {
        coords.push(c);
        edges.push(e);
        tris.push(t);
    }
    (merge_owned(coords), merge_owned(edges), merge_owned(tris))
}

#[test]
fn canonical_numbering_ignores_the_partition() {
    let serial = canonical_layout(1);
    assert!(serial.2.len() > 2 * NX * NY);
    for size in [2, 3] {
        let distributed = canonical_layout(size);
        assert_eq!(distributed.0, serial.0, "vertices differ on {size} ranks");
        assert_eq!(distributed.1, serial.1, "edges differ on {size} ranks");
        assert_eq!(distributed.2, serial.2, "triangles differ on {size} ranks");
    }
}

#[test]
fn globals_stay_contiguous() {
    let results = run_world(3, |comm| {
        let mut mesh = grid_mesh(comm, NX, NY);
        refine_by_size(&mut mesh, 0.9, 0.0, false).unwrap();
        (0..=2)
            .map(|d| {
                let n = mesh.nglobal_ents(d).unwrap();
                (owned_ents(&mesh, d), n)
            })
            .collect::<Vec<_>>()
    });
    for d in 0..=2 {
        let n = results[0][d].1;
        let all = merge_owned(results.iter().map(|r| r[d].0.clone()).collect());
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), (0..n).collect::<Vec<_>>());
    }
}

struct CubeRun {
    counts: [u64; 4],
    owners_agree: bool,
    mass: f64,
    volume: f64,
    coords: BTreeMap<u64, Vec<u64>>,
    tets: BTreeMap<u64, Vec<u64>>,
}

fn refine_cube(comm: RayonComm) -> CubeRun {
    let (coords, tets) = tet_grid(2);
    let owners = block_owners(tets.len() / 4, comm.size());
    let mut mesh = Mesh::from_partition(comm, 3, &coords, &tets, &owners)
        .unwrap()
        .with_canonical_globals(true);
    let nlocal = mesh.nelems();
    mesh.add_tag(TET, "mass", 1, TransferPolicy::Conserve, vec![1.0 / 6.0; nlocal])
        .unwrap();
    for _ in 0..2 {
        refine_by_size(&mut mesh, 1.1, 0.0, false).unwrap();
    }
    let counts = [VERT, EDGE, TRI, TET].map(|d| mesh.nglobal_ents(d).unwrap());
    let owners_agree = (0..=3).all(|d| owners_agree(&mesh, d).unwrap());
    let me = mesh.comm().rank();
    let owned = |e: &usize| mesh.owners(TET)[*e] == me;
    let mass_tag = mesh.get_array::<f64>(TET, "mass").unwrap();
    let vols = tet_volumes(&mesh);
    CubeRun {
        counts,
        owners_agree,
        mass: (0..mesh.nelems()).filter(owned).map(|e| mass_tag[e]).sum(),
        volume: (0..mesh.nelems()).filter(owned).map(|e| vols[e]).sum(),
        coords: owned_coords(&mesh),
        tets: owned_ents(&mesh, TET),
    }
}

#[test]
fn cube_refines_the_same_on_any_partition() {
    let serial = run_world(1, refine_cube).pop().unwrap();
    let [v, e, f, t] = serial.counts;
    assert!(t > 48, "nothing was split");
    assert_eq!(v + f - e - t, 1, "Euler characteristic of a ball");
    for size in [2, 3] {
        let runs = run_world(size, refine_cube);
        for r in &runs {
            assert_eq!(r.counts, serial.counts, "counts on {size} ranks");
            assert!(r.owners_agree);
        }
        let mass: f64 = runs.iter().map(|r| r.mass).sum();
        let volume: f64 = runs.iter().map(|r| r.volume).sum();
        assert!((mass - 8.0).abs() < 1e-9, "mass {mass} on {size} ranks");
        assert!((volume - 8.0).abs() < 1e-9, "volume {volume} on {size} ranks");
        let mut coords = Vec::new();
        let mut tets = Vec::new();
        for r in runs {
            coords.push(r.coords);
            tets.push(r.tets);
        }
        assert_eq!(merge_owned(coords), serial.coords, "vertices differ on {size} ranks");
        assert_eq!(merge_owned(tets), serial.tets, "tets differ on {size} ranks");
    }
    assert!((serial.mass - 8.0).abs() < 1e-9);
    assert!((serial.volume - 8.0).abs() < 1e-9);
}
