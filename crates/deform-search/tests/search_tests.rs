//! Integration tests for deform-search.

use deform_math::DVec3;
use deform_mesh::generators::{quad_grid, uv_sphere};
use deform_search::SpatialIndex;

fn scattered_points() -> Vec<DVec3> {
    // Deterministic pseudo-random cloud
    (0..200)
        .map(|i| {
            let t = i as f64;
            DVec3::new(
                (t * 12.9898).sin() * 3.0,
                (t * 78.233).sin() * 2.0,
                (t * 37.719).cos() * 1.5,
            )
        })
        .collect()
}

// ─── Nearest Tests ────────────────────────────────────────────

#[test]
fn nearest_returns_self() {
    let points = scattered_points();
    let index = SpatialIndex::build(&points, None).unwrap();
    assert_eq!(index.len(), points.len());
    for (i, &p) in points.iter().enumerate() {
        let hit = index.nearest(p, None).unwrap();
        assert_eq!(hit.index, i);
        assert_eq!(hit.distance_sq, 0.0);
    }
}

#[test]
fn nearest_on_planar_grid() {
    // Every point shares z = 0 and many share x or y.
    let mesh = quad_grid(30, 30, 2.0, 2.0);
    let index = SpatialIndex::from_mesh_vertices(&mesh, false).unwrap();
    for i in (0..mesh.vertex_count()).step_by(7) {
        let hit = index.nearest(mesh.position(i), None).unwrap();
        assert_eq!(hit.index, i);
    }
}

#[test]
fn nearest_matches_brute_force() {
    let points = scattered_points();
    let index = SpatialIndex::build(&points, None).unwrap();
    let query = DVec3::new(0.3, -0.2, 0.1);
    let brute = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.distance_squared(query)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    let hit = index.nearest(query, None).unwrap();
    assert_eq!(hit.index, brute.0);
    assert!((hit.distance_sq - brute.1).abs() < 1e-12);
}

#[test]
fn nearest_on_empty_index() {
    let index = SpatialIndex::build(&[], None).unwrap();
    assert!(index.is_empty());
    assert!(index.nearest(DVec3::ZERO, None).is_none());
    assert!(index.range(DVec3::ZERO, None, 10.0).is_empty());
}

// ─── Normal Filter Tests ──────────────────────────────────────

#[test]
fn nearest_respects_normal_filter() {
    // Two sheets: the closer one faces away from the query normal.
    let points = vec![DVec3::new(0.0, 0.0, 0.1), DVec3::new(0.0, 0.0, 1.0)];
    let normals = vec![DVec3::NEG_Z, DVec3::Z];
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();

    let hit = index.nearest(DVec3::ZERO, Some(DVec3::Z)).unwrap();
    assert_eq!(hit.index, 1);

    let hit = index.nearest(DVec3::ZERO, Some(DVec3::NEG_Z)).unwrap();
    assert_eq!(hit.index, 0);

    // No filter requested
    let hit = index.nearest(DVec3::ZERO, None).unwrap();
    assert_eq!(hit.index, 0);
}

#[test]
fn filtered_nearest_scans_past_initial_candidates() {
    // 50 close points facing -Z, one far point facing +Z.
    let mut points: Vec<DVec3> = (0..50).map(|i| DVec3::new(i as f64 * 0.01, 0.0, 0.0)).collect();
    let mut normals = vec![DVec3::NEG_Z; 50];
    points.push(DVec3::new(10.0, 0.0, 0.0));
    normals.push(DVec3::Z);
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();

    let hit = index.nearest(DVec3::ZERO, Some(DVec3::Z)).unwrap();
    assert_eq!(hit.index, 50);
    assert!((hit.distance_sq - 100.0).abs() < 1e-9);
}

#[test]
fn no_element_passes_filter() {
    let points = vec![DVec3::ZERO, DVec3::X];
    let normals = vec![DVec3::Z, DVec3::Z];
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();
    assert!(index.nearest(DVec3::ZERO, Some(DVec3::NEG_Z)).is_none());
    assert!(index.range(DVec3::ZERO, Some(DVec3::NEG_Z), 5.0).is_empty());
}

#[test]
fn zero_query_normal_matches_nothing() {
    let points = vec![DVec3::ZERO];
    let index = SpatialIndex::build(&points, Some(&[DVec3::Z])).unwrap();
    assert!(index.nearest(DVec3::ZERO, Some(DVec3::ZERO)).is_none());
}

#[test]
fn zero_normal_elements_are_skipped() {
    let points = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
    let normals = vec![DVec3::ZERO, DVec3::Z, DVec3::Z];
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.skipped(), 1);
    let hit = index.nearest(DVec3::ZERO, Some(DVec3::Z)).unwrap();
    assert_ne!(hit.index, 0);
}

#[test]
fn mismatched_normals_rejected() {
    let points = vec![DVec3::ZERO, DVec3::X];
    assert!(SpatialIndex::build(&points, Some(&[DVec3::Z])).is_err());
}

// ─── Range Tests ──────────────────────────────────────────────

#[test]
fn range_matches_brute_force() {
    let points = scattered_points();
    let index = SpatialIndex::build(&points, None).unwrap();
    let center = DVec3::new(0.5, 0.5, 0.0);
    let radius = 1.2;

    let mut got: Vec<usize> = index.range(center, None, radius).iter().map(|h| h.index).collect();
    got.sort_unstable();
    let expected: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.distance_squared(center) <= radius * radius)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(got, expected);
}

#[test]
fn range_is_monotonic() {
    let points = scattered_points();
    let index = SpatialIndex::build(&points, None).unwrap();
    let center = DVec3::new(-0.4, 0.2, 0.3);

    let small: Vec<usize> = index.range(center, None, 0.8).iter().map(|h| h.index).collect();
    let large: Vec<usize> = index.range(center, None, 1.6).iter().map(|h| h.index).collect();
    assert!(small.len() <= large.len());
    for i in &small {
        assert!(large.contains(i), "{i} found at r=0.8 but not at r=1.6");
    }
}

#[test]
fn range_sphere_is_closed() {
    let points = vec![DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0)];
    let index = SpatialIndex::build(&points, None).unwrap();
    let hits = index.range(DVec3::ZERO, None, 1.0);
    assert_eq!(hits.len(), 2);
}

#[test]
fn range_scores_true_squared_distance() {
    let points = vec![DVec3::new(0.0, 3.0, 4.0)];
    let index = SpatialIndex::build(&points, None).unwrap();
    let hits = index.range(DVec3::ZERO, None, 6.0);
    assert_eq!(hits.len(), 1);
    assert!((hits[0].distance_sq - 25.0).abs() < 1e-12);
}

// ─── Coincident Point Tests ───────────────────────────────────

#[test]
fn many_coincident_points_are_indexed() {
    // More copies of one position than fit in a tree leaf
    let mut points = vec![DVec3::new(0.0, 1.0, 0.0); 300];
    points.push(DVec3::new(2.0, 0.0, 0.0));
    let index = SpatialIndex::build(&points, None).unwrap();
    assert_eq!(index.len(), 301);

    let hit = index.nearest(DVec3::new(0.0, 1.0, 0.0), None).unwrap();
    assert_eq!(hit.index, 0);
    assert_eq!(hit.distance_sq, 0.0);

    let hit = index.nearest(DVec3::new(1.9, 0.0, 0.0), None).unwrap();
    assert_eq!(hit.index, 300);

    let mut got: Vec<usize> = index
        .range(DVec3::new(0.0, 1.0, 0.0), None, 0.1)
        .iter()
        .map(|h| h.index)
        .collect();
    got.sort_unstable();
    assert_eq!(got, (0..300).collect::<Vec<_>>());

    assert_eq!(index.range(DVec3::ZERO, None, 3.0).len(), 301);
}

#[test]
fn coincident_points_keep_their_own_normals() {
    // A seam: the same position twice, facing opposite ways
    let mut points = vec![DVec3::new(0.0, 0.0, 1.0); 300];
    let mut normals = vec![DVec3::NEG_Z; 300];
    normals[299] = DVec3::Z;
    points.push(DVec3::new(-0.0, 0.0, 1.0));
    normals.push(DVec3::Z);
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();

    let hit = index.nearest(DVec3::ZERO, Some(DVec3::Z)).unwrap();
    assert_eq!(hit.index, 299);
    let hit = index.nearest(DVec3::ZERO, Some(DVec3::NEG_Z)).unwrap();
    assert_eq!(hit.index, 0);

    let facing = index.range(DVec3::ZERO, Some(DVec3::Z), 1.0);
    let mut got: Vec<usize> = facing.iter().map(|h| h.index).collect();
    got.sort_unstable();
    assert_eq!(got, vec![299, 300]);
}

#[test]
fn filtered_nearest_falls_back_to_full_scan() {
    // 1000 points facing away; the only facing point is the farthest.
    let mut points: Vec<DVec3> = (0..1000)
        .map(|i| DVec3::new((i % 40) as f64 * 0.1, (i / 40) as f64 * 0.1, 0.0))
        .collect();
    let mut normals = vec![DVec3::NEG_Z; 1000];
    points.push(DVec3::new(50.0, 50.0, 0.0));
    normals.push(DVec3::Z);
    let index = SpatialIndex::build(&points, Some(&normals)).unwrap();

    let hit = index.nearest(DVec3::ZERO, Some(DVec3::Z)).unwrap();
    assert_eq!(hit.index, 1000);
    assert!((hit.distance_sq - 5000.0).abs() < 1e-9);
}

// ─── Mesh Construction Tests ──────────────────────────────────

#[test]
fn face_index_over_sphere() {
    let mesh = uv_sphere(1.0, 8, 16);
    let index = SpatialIndex::from_mesh_faces(&mesh, true).unwrap();
    assert_eq!(index.len(), mesh.triangle_count());
    assert!(index.has_normals());

    // Query just outside the north pole, facing up
    let hit = index.nearest(DVec3::new(0.0, 1.1, 0.0), Some(DVec3::Y)).unwrap();
    assert!(mesh.triangle(hit.index).iter().any(|&v| mesh.position(v as usize).y > 0.99));

    // Facing down from the same point reaches the far side
    let hit = index.nearest(DVec3::new(0.0, 1.1, 0.0), Some(DVec3::NEG_Y)).unwrap();
    assert!(mesh.triangle(hit.index).iter().all(|&v| mesh.position(v as usize).y < 0.5));
}
