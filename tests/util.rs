#![allow(dead_code)]
use mesh_refine::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Run `f` once per rank of a `size`-rank in-process world, each rank on its
/// own thread; results come back in rank order.
pub fn run_world<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(RayonComm) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = RayonComm::world(size)
        .into_iter()
        .map(|comm| {
            let f = Arc::clone(&f);
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank panicked"))
        .collect()
}

/// `nx × ny` unit squares, each cut along its rising diagonal into two
/// counter-clockwise triangles.
pub fn tri_grid(nx: usize, ny: usize) -> (Vec<f64>, Vec<usize>) {
    let mut coords = Vec::new();
    for j in 0..=ny {
        for i in 0..=nx {
            coords.extend([i as f64, j as f64]);
        }
    }
    let v = |i: usize, j: usize| j * (nx + 1) + i;
    let mut tris = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            tris.extend([v(i, j), v(i + 1, j), v(i + 1, j + 1)]);
            tris.extend([v(i, j), v(i + 1, j + 1), v(i, j + 1)]);
        }
    }
    (coords, tris)
}

/// `n³` unit cubes, each cut into the six positively oriented tets that share
/// its main diagonal.
pub fn tet_grid(n: usize) -> (Vec<f64>, Vec<usize>) {
    let mut coords = Vec::new();
    for k in 0..=n {
        for j in 0..=n {
            for i in 0..=n {
                coords.extend([i as f64, j as f64, k as f64]);
            }
        }
    }
    let v = |c: [usize; 3]| (c[2] * (n + 1) + c[1]) * (n + 1) + c[0];
    let step = |mut c: [usize; 3], axis: usize| {
        c[axis] += 1;
        c
    };
    // (axis order, odd permutation)
    let paths = [
        ([0, 1, 2], false),
        ([1, 2, 0], false),
        ([2, 0, 1], false),
        ([0, 2, 1], true),
        ([2, 1, 0], true),
        ([1, 0, 2], true),
    ];
    let mut tets = Vec::new();
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let c0 = [i, j, k];
                for (p, odd) in paths {
                    let c1 = step(c0, p[0]);
                    let c2 = step(c1, p[1]);
                    let c3 = [i + 1, j + 1, k + 1];
                    if odd {
                        tets.extend([v(c0), v(c1), v(c3), v(c2)]);
                    } else {
                        tets.extend([v(c0), v(c1), v(c2), v(c3)]);
                    }
                }
            }
        }
    }
    (coords, tets)
}

/// Signed volume of every local tet.
pub fn tet_volumes<C: Communicator>(mesh: &Mesh<C>) -> Vec<f64> {
    let x = mesh.coords().unwrap();
    let p = |v: usize| [x[3 * v], x[3 * v + 1], x[3 * v + 2]];
    mesh.ents2verts(TET)
        .chunks_exact(4)
        .map(|t| {
            let [a, b, c, d] = [p(t[0]), p(t[1]), p(t[2]), p(t[3])];
            let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let w = [d[0] - a[0], d[1] - a[1], d[2] - a[2]];
            (u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
                + u[2] * (v[0] * w[1] - v[1] * w[0]))
                / 6.0
        })
        .collect()
}

/// Contiguous blocks of elements per rank.
pub fn block_owners(nelems: usize, size: usize) -> Vec<usize> {
    (0..nelems).map(|e| e * size / nelems).collect()
}

/// The grid of [`tri_grid`] distributed in blocks over `comm`.
pub fn grid_mesh(comm: RayonComm, nx: usize, ny: usize) -> Mesh<RayonComm> {
    let (coords, tris) = tri_grid(nx, ny);
    let owners = block_owners(tris.len() / 3, comm.size());
    Mesh::from_partition(comm, 2, &coords, &tris, &owners).unwrap()
}

/// Signed area of every local triangle.
pub fn tri_areas<C: Communicator>(mesh: &Mesh<C>) -> Vec<f64> {
    let x = mesh.coords().unwrap();
    mesh.ents2verts(TRI)
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (t[0], t[1], t[2]);
            0.5 * ((x[2 * b] - x[2 * a]) * (x[2 * c + 1] - x[2 * a + 1])
                - (x[2 * c] - x[2 * a]) * (x[2 * b + 1] - x[2 * a + 1]))
        })
        .collect()
}

/// Owned entities of `dim` as global ID → vertex global IDs.
pub fn owned_ents<C: Communicator>(mesh: &Mesh<C>, dim: usize) -> BTreeMap<u64, Vec<u64>> {
    let per = dim + 1;
    let vert_globals = mesh.globals(VERT);
    let me = mesh.comm().rank();
    mesh.ents2verts(dim)
        .chunks_exact(per)
        .enumerate()
        .filter(|&(e, _)| mesh.owners(dim)[e] == me)
        .map(|(e, vs)| {
            (
                mesh.globals(dim)[e],
                vs.iter().map(|&v| vert_globals[v]).collect(),
            )
        })
        .collect()
}

/// Owned vertices as global ID → coordinate bit patterns.
pub fn owned_coords<C: Communicator>(mesh: &Mesh<C>) -> BTreeMap<u64, Vec<u64>> {
    let dim = mesh.dim();
    let coords = mesh.coords().unwrap();
    let me = mesh.comm().rank();
    (0..mesh.nverts())
        .filter(|&v| mesh.owners(VERT)[v] == me)
        .map(|v| {
            (
                mesh.globals(VERT)[v],
                coords[v * dim..(v + 1) * dim].iter().map(|x| x.to_bits()).collect(),
            )
        })
        .collect()
}

/// Merge per-rank maps, asserting no key is owned twice.
pub fn merge_owned(parts: Vec<BTreeMap<u64, Vec<u64>>>) -> BTreeMap<u64, Vec<u64>> {
    let mut all = BTreeMap::new();
    for part in parts {
        for (k, v) in part {
            assert!(all.insert(k, v).is_none(), "global {k} owned twice");
        }
    }
    all
}
