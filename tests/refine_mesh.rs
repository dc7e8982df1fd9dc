use mesh_refine::prelude::*;
use mesh_refine::adapt::candidates::CANDIDATE_TAG;

mod util;
use util::tri_areas;

fn right_triangle() -> Mesh {
    let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2]).unwrap()
}

#[test]
fn flat_triangle_splits_its_long_edge() {
    // edge lengths {2, 1, 1}
    let coords = [0.0, 0.0, 2.0, 0.0, 1.0, 0.0];
    let mut mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2]).unwrap();
    assert!(refine_by_size(&mut mesh, 1.5, 0.0, false).unwrap());
    assert_eq!(mesh.dim(), 2);
    assert_eq!(mesh.nverts(), 4);
    assert_eq!(mesh.nedges(), 5);
    assert_eq!(mesh.nelems(), 2);
    assert_eq!(mesh.parting(), Parting::ElementBased);
    // the new vertex sits at the middle of (0,0)-(2,0)
    let x = mesh.coords().unwrap();
    assert_eq!(&x[6..8], &[1.0, 0.0]);
}

#[test]
fn short_edges_leave_the_mesh_alone() {
    let mut mesh = right_triangle();
    mesh.add_tag(TRI, "mass", 1, TransferPolicy::Conserve, vec![3.0])
        .unwrap();
    let before = mesh.clone();
    assert!(!refine_by_size(&mut mesh, 2.0, 0.0, false).unwrap());
    assert_eq!(mesh.nverts(), before.nverts());
    assert_eq!(mesh.nelems(), before.nelems());
    assert_eq!(mesh.coords().unwrap(), before.coords().unwrap());
    assert_eq!(mesh.get_array::<f64>(TRI, "mass").unwrap(), &[3.0]);
    assert!(!mesh.has_tag(EDGE, CANDIDATE_TAG));
}

#[test]
fn poor_splits_are_refused() {
    let coords = [0.0, 0.0, 2.0, 0.0, 1.0, 0.0];
    let mut mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2]).unwrap();
    assert!(!refine_by_size(&mut mesh, 1.5, 0.1, false).unwrap());
    assert_eq!((mesh.nverts(), mesh.nelems()), (3, 1));
    assert_eq!(mesh.parting(), Parting::ElementBased);
    // the candidate tag is consumed even when nothing is split
    assert!(!mesh.has_tag(EDGE, CANDIDATE_TAG));
}

#[test]
fn candidates_sharing_a_triangle_split_one_at_a_time() {
    let coords = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
    let mut mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2, 0, 2, 3]).unwrap();
    // edges: (0,1) (0,2) (0,3) (1,2) (2,3); flag the two legs of triangle 0
    mesh.add_tag(EDGE, CANDIDATE_TAG, 1, TransferPolicy::Drop, vec![1i8, 0, 0, 1, 0])
        .unwrap();
    assert!(refine(&mut mesh, 0.0, false).unwrap());
    assert_eq!(mesh.nverts(), 5);
    assert_eq!(mesh.nelems(), 3);
    let x = mesh.coords().unwrap();
    // both splits score the same quality, so the lower global edge (0,1) wins
    assert_eq!([x[8], x[9]], [0.5, 0.0]);
}

#[test]
fn children_keep_orientation_and_area() {
    let mut mesh = right_triangle();
    assert!(refine_by_size(&mut mesh, 1.2, 0.3, false).unwrap());
    let areas = tri_areas(&mesh);
    assert_eq!(areas.len(), 2);
    assert!(areas.iter().all(|&a| (a - 0.25).abs() < 1e-12));
    // edges list their vertices in ascending global order
    let g = mesh.globals(VERT);
    assert!(
        mesh.ents2verts(EDGE)
            .chunks_exact(2)
            .all(|e| g[e[0]] < g[e[1]])
    );
}

#[test]
fn one_key_per_tetrahedron() {
    let coords = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0,
    ];
    let mut mesh = Mesh::from_simplices(NoComm, 3, &coords, &[0, 1, 2, 3]).unwrap();
    // the three √2 edges are candidates, they share the only tet
    assert!(refine_by_size(&mut mesh, 1.2, 0.0, false).unwrap());
    assert_eq!(mesh.nverts(), 5);
    assert_eq!(mesh.nents(EDGE), 9);
    assert_eq!(mesh.nents(TRI), 7);
    assert_eq!(mesh.nents(TET), 2);

    let x = mesh.coords().unwrap();
    let p = |v: usize| [x[3 * v], x[3 * v + 1], x[3 * v + 2]];
    let volumes: Vec<f64> = mesh
        .ents2verts(TET)
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
        .collect();
    assert!(volumes.iter().all(|&v| (v - 1.0 / 12.0).abs() < 1e-12));
}

#[test]
fn segments_split_independently() {
    let coords = [0.0, 1.0, 3.0, 6.0];
    let mut mesh = Mesh::from_simplices(NoComm, 1, &coords, &[0, 1, 1, 2, 2, 3]).unwrap();
    // the 2- and 3-long segments touch at vertex 2 but share no element
    assert!(refine_by_size(&mut mesh, 1.5, 0.0, false).unwrap());
    assert_eq!(mesh.nverts(), 6);
    assert_eq!(mesh.nelems(), 5);
    let mut x = mesh.coords().unwrap().to_vec();
    x.sort_by(f64::total_cmp);
    assert_eq!(x, vec![0.0, 1.0, 2.0, 3.0, 4.5, 6.0]);
}

#[test]
fn refine_to_size_reaches_the_target() {
    let coords = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
    let mut mesh = Mesh::from_simplices(NoComm, 2, &coords, &[0, 1, 2, 0, 2, 3]).unwrap();
    let opts = RefineOptions {
        max_len: 0.5,
        min_qual: 0.0,
        max_passes: 32,
        verbose: false,
    };
    let summary = refine_to_size(&mut mesh, &opts).unwrap();
    assert!(summary.passes > 0);
    assert_eq!(summary.edges_split, mesh.nverts() as u64 - 4);
    if summary.passes < opts.max_passes {
        assert!(mesh.ask_lengths().unwrap().iter().all(|&l| l <= 0.5));
    }
    let area: f64 = tri_areas(&mesh).iter().sum();
    assert!((area - 1.0).abs() < 1e-12);
    assert!(tri_areas(&mesh).iter().all(|&a| a > 0.0));
}

#[test]
fn refine_to_size_stops_at_max_passes() {
    let mut mesh = right_triangle();
    let opts = RefineOptions {
        max_len: 0.01,
        min_qual: 0.0,
        max_passes: 2,
        verbose: true,
    };
    let summary = refine_to_size(&mut mesh, &opts).unwrap();
    assert_eq!(summary.passes, 2);
    assert!(summary.edges_split >= 2);
}

fn jittered_grid(n: usize, offsets: &[(f64, f64)]) -> Mesh {
    let (mut coords, tris) = util::tri_grid(n, n);
    let mut k = 0;
    for j in 1..n {
        for i in 1..n {
            let v = j * (n + 1) + i;
            coords[2 * v] += offsets[k].0;
            coords[2 * v + 1] += offsets[k].1;
            k += 1;
        }
    }
    Mesh::from_simplices(NoComm, 2, &coords, &tris).unwrap()
}

proptest::proptest! {
    #[test]
    fn splits_never_go_below_the_quality_bound(
        offsets in proptest::collection::vec((-0.15f64..0.15, -0.15f64..0.15), 4),
        min_qual in 0.0f64..0.6,
    ) {
        use mesh_refine::geometry::quality::element_qualities;
        let mut mesh = jittered_grid(3, &offsets);
        let worst = |m: &Mesh| {
            element_qualities(m).unwrap().into_iter().fold(f64::INFINITY, f64::min)
        };
        let before = worst(&mesh);
        let area_before: f64 = tri_areas(&mesh).iter().sum();
        refine_by_size(&mut mesh, 0.8, min_qual, false).unwrap();
        proptest::prop_assert!(worst(&mesh) >= before.min(min_qual) - 1e-12);
        let area_after: f64 = tri_areas(&mesh).iter().sum();
        proptest::prop_assert!((area_after - area_before).abs() < 1e-9);
    }
}
