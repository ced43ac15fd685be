//! Integration tests for deform-solver.

use approx::assert_relative_eq;

use deform_correspondence::{ConstraintMap, Correspondence};
use deform_math::faer_solver::FaerSolver;
use deform_math::geometry::{gradient_transfer_operator, inverse_surface_matrix, phantom_vertex};
use deform_math::{DQuat, DVec3};
use deform_mesh::generators::{quad_grid, two_triangles, uv_sphere};
use deform_mesh::TriangleMesh;
use deform_solver::assembly::{Corner, LinearSystem};
use deform_solver::{
    CorrespondenceResolver, DeformConfig, ResolverConfig, StageWeights, TransferConfig,
    TransferSolver,
};
use deform_types::{DeformError, VertexId};

fn transformed(mesh: &TriangleMesh, f: impl Fn(DVec3) -> DVec3) -> TriangleMesh {
    let mut out = mesh.clone();
    for i in 0..out.vertex_count() {
        out.set_position(i, f(mesh.position(i)));
    }
    out
}

fn max_error(a: &TriangleMesh, b: &TriangleMesh) -> f64 {
    (0..a.vertex_count())
        .map(|i| a.position(i).distance(b.position(i)))
        .fold(0.0, f64::max)
}

fn identity_faces(faces: usize) -> Correspondence {
    let mut corr = Correspondence::dense_multi(faces);
    for f in 0..faces {
        corr.add(f, f).unwrap();
    }
    corr
}

fn corner_anchors(target: &TriangleMesh, corners: &[u32]) -> ConstraintMap {
    let mut anchors = ConstraintMap::new();
    for &v in corners {
        anchors.insert(VertexId(v), target.position(v as usize));
    }
    anchors
}

// ─── Config Tests ─────────────────────────────────────────────

#[test]
fn default_resolver_schedule() {
    let config = ResolverConfig::default();
    let closest: Vec<f64> = config.stages.iter().map(|s| s.closest).collect();
    assert_eq!(closest, vec![0.0, 1.0, 30.0, 40.0, 50.0]);
    assert!(config.stages.iter().all(|s| s.smoothness == 1.0 && s.identity == 0.1));
    assert_eq!(config.max_correspondences, 3);
    assert!(!config.fallback_to_nearest);
    assert!(config.recompute_normals);
    assert!(config.validate().is_ok());
}

#[test]
fn resolver_config_rejects_bad_weights() {
    let config = ResolverConfig::single_stage(StageWeights::new(1.0, -0.1, 0.0));
    assert!(matches!(config.validate(), Err(DeformError::InvalidConfig(_))));

    let config = ResolverConfig::single_stage(StageWeights::new(f64::NAN, 0.1, 0.0));
    assert!(config.validate().is_err());
}

#[test]
fn transfer_config_defaults() {
    let config = TransferConfig::default();
    assert!(!config.dedup_vertices);
    assert_eq!(config.regularization, 1e-8);
    assert!(config.validate().is_ok());

    let bad = TransferConfig {
        regularization: -1.0,
        ..Default::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn config_from_toml() {
    let text = r#"
[resolver]
max_correspondences = 2

[[resolver.stages]]
smoothness = 1.0
identity = 0.5
closest = 0.0

[[resolver.stages]]
smoothness = 1.0
identity = 0.5
closest = 10.0

[transfer]
dedup_vertices = true
"#;
    let config: DeformConfig = toml::from_str(text).unwrap();
    assert_eq!(config.resolver.stages.len(), 2);
    assert_eq!(config.resolver.stages[1], StageWeights::new(1.0, 0.5, 10.0));
    assert_eq!(config.resolver.max_correspondences, 2);
    assert!(config.resolver.recompute_normals);
    assert!(config.transfer.dedup_vertices);
    assert_eq!(config.transfer.regularization, 1e-8);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_toml_is_default() {
    let config: DeformConfig = toml::from_str("").unwrap();
    assert_eq!(config, DeformConfig::default());
}

// ─── Assembly Tests ───────────────────────────────────────────

#[test]
fn point_constraint_rows() {
    let mut system = LinearSystem::new(2);
    system.push_point(1, DVec3::new(1.0, 2.0, 3.0), 2.0);

    assert_eq!(system.rows(), 3);
    assert_eq!(system.cols(), 6);
    assert_eq!(system.rhs(), &[2.0, 4.0, 6.0]);

    let a = system.matrix();
    assert_eq!(a.get(0, 3), 2.0);
    assert_eq!(a.get(1, 4), 2.0);
    assert_eq!(a.get(2, 5), 2.0);
    assert_eq!(a.get(0, 0), 0.0);
}

#[test]
fn fixed_corners_move_into_constant_term() {
    let (v0, v1, v2) = (
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(2.0, 0.0, 0.0),
        DVec3::new(0.5, 1.5, 0.0),
    );
    let op = gradient_transfer_operator(&inverse_surface_matrix(v0, v1, v2).unwrap());
    let corners = [
        Corner::Fixed(v0),
        Corner::Fixed(v1),
        Corner::Fixed(v2),
        Corner::Fixed(phantom_vertex(v0, v1, v2)),
    ];

    let mut system = LinearSystem::new(0);
    let row = system.push_rows(9);
    system.add_operator(row, &op, &corners, 1.0);

    // E · p reproduces the identity, so the constant term is −I
    let expected = [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0];
    for (c, e) in system.rhs().iter().zip(expected) {
        assert!((c - e).abs() < 1e-12, "constant {c}, expected {e}");
    }
    assert_eq!(system.triplet_count(), 0);
}

#[test]
fn least_squares_averages_conflicting_points() {
    let mut system = LinearSystem::new(1);
    system.push_point(0, DVec3::new(1.0, 0.0, 0.0), 1.0);
    system.push_point(0, DVec3::new(3.0, 2.0, 0.0), 1.0);

    let x = system.solve_least_squares(&mut FaerSolver::new()).unwrap();
    assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    assert_relative_eq!(x[2], 0.0, epsilon = 1e-12);
}

// ─── Resolver Tests ───────────────────────────────────────────

#[test]
fn anchored_vertex_translates_rigidly() {
    let source = two_triangles();
    let offset = DVec3::new(0.5, -0.25, 0.75);
    let target = transformed(&source, |p| p + offset);

    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(3), source.position(3) + offset);

    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, 0.0));
    let mut resolver = CorrespondenceResolver::configure(&source, &target, anchors, config).unwrap();
    assert_eq!(resolver.free_vertex_count(), 3);

    let report = resolver.resolve().unwrap();
    assert_eq!(report.stages.len(), 1);
    // 2 ordered adjacent pairs + 2 identity blocks; 3 free vertices + 2 phantoms
    assert_eq!(report.stages[0].rows, 9 * (2 + 2));
    assert_eq!(report.stages[0].cols, 3 * (3 + 2));
    assert_eq!(report.stages[0].closest_pairs, 0);

    let deformed = resolver.deformed_source();
    for v in 0..source.vertex_count() {
        let expected = source.position(v) + offset;
        assert!(
            deformed.position(v).distance(expected) < 1e-8,
            "Vertex {v}: {:?}, expected {:?}",
            deformed.position(v),
            expected
        );
    }

    let corr = resolver.face_correspondence().unwrap();
    assert_eq!(corr.get(0)[0], 0);
    assert_eq!(corr.get(1)[0], 1);
}

#[test]
fn anchor_in_place_leaves_mesh_unchanged() {
    let source = two_triangles();
    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(3), source.position(3));

    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, 0.0));
    let mut resolver = CorrespondenceResolver::configure(&source, &source, anchors, config).unwrap();
    let report = resolver.resolve().unwrap();

    assert!(report.stages[0].max_displacement < 1e-9);
    assert!(max_error(resolver.deformed_source(), &source) < 1e-9);
}

#[test]
fn caller_meshes_are_not_modified() {
    let source = two_triangles();
    let before = source.clone();
    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(3), DVec3::new(2.0, 2.0, 0.0));

    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, 0.0));
    let mut resolver = CorrespondenceResolver::configure(&source, &source, anchors, config).unwrap();
    resolver.resolve().unwrap();
    assert_eq!(source, before);
}

#[test]
fn full_schedule_recovers_translated_grid() {
    let source = quad_grid(4, 4, 2.0, 2.0);
    let target = transformed(&source, |p| p + DVec3::new(0.1, 0.2, 0.05));
    let anchors = corner_anchors(&target, &[0, 4, 20, 24]);

    let mut resolver =
        CorrespondenceResolver::configure(&source, &target, anchors, ResolverConfig::default())
            .unwrap();
    let report = resolver.resolve().unwrap();

    assert_eq!(report.stages.len(), 5);
    assert_eq!(report.stages[0].closest_pairs, 0);
    for stage in &report.stages[1..] {
        assert_eq!(stage.closest_pairs, 21);
    }
    assert!(max_error(resolver.deformed_source(), &target) < 1e-7);

    assert!(report.summary.unmatched.is_empty());
    let corr = resolver.face_correspondence().unwrap();
    assert_eq!(corr.size(), target.triangle_count());
    for f in 0..target.triangle_count() {
        let matches = corr.get(f);
        assert_eq!(matches[0], f, "face {f} matched {matches:?}");
        assert!(matches.len() <= 3);
    }
}

#[test]
fn observer_sees_every_stage() {
    let source = quad_grid(3, 3, 1.0, 1.0);
    let anchors = corner_anchors(&source, &[0, 3, 12, 15]);
    let mut resolver =
        CorrespondenceResolver::configure(&source, &source, anchors, ResolverConfig::default())
            .unwrap();

    let mut seen = Vec::new();
    resolver
        .resolve_with_observer(|stage, mesh| {
            assert_eq!(mesh.vertex_count(), 16);
            seen.push(stage);
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn observer_error_aborts_resolve() {
    let source = quad_grid(3, 3, 1.0, 1.0);
    let anchors = corner_anchors(&source, &[0, 3, 12, 15]);
    let mut resolver =
        CorrespondenceResolver::configure(&source, &source, anchors, ResolverConfig::default())
            .unwrap();

    let mut calls = 0;
    let result = resolver.resolve_with_observer(|stage, _| {
        calls += 1;
        if stage == 1 {
            Err(DeformError::InvalidConfig("stop".into()))
        } else {
            Ok(())
        }
    });
    assert!(result.is_err());
    assert_eq!(calls, 2);
    assert!(resolver.face_correspondence().is_none());
}

#[test]
fn empty_schedule_matches_undeformed_source() {
    let mesh = quad_grid(3, 3, 1.0, 1.0);
    let config = ResolverConfig {
        stages: Vec::new(),
        ..Default::default()
    };
    let mut resolver =
        CorrespondenceResolver::configure(&mesh, &mesh, ConstraintMap::new(), config).unwrap();
    let report = resolver.resolve().unwrap();

    assert!(report.stages.is_empty());
    assert_eq!(report.summary.matched, mesh.triangle_count());
    let corr = resolver.into_face_correspondence().unwrap();
    for f in 0..mesh.triangle_count() {
        assert_eq!(corr.get(f)[0], f);
    }
}

#[test]
fn distant_target_faces_are_reported_unmatched() {
    let source = quad_grid(3, 3, 1.0, 1.0);
    let target = transformed(&source, |p| p + DVec3::new(0.0, 0.0, 100.0));
    let config = ResolverConfig {
        stages: Vec::new(),
        ..Default::default()
    };
    let mut resolver =
        CorrespondenceResolver::configure(&source, &target, ConstraintMap::new(), config.clone())
            .unwrap();
    let report = resolver.resolve().unwrap();
    assert_eq!(report.summary.unmatched.len(), target.triangle_count());
    assert!((report.summary.unmatched_percent() - 100.0).abs() < 1e-12);
    assert_eq!(resolver.face_correspondence().unwrap().num_pairs(), 0);

    let config = ResolverConfig {
        fallback_to_nearest: true,
        ..config
    };
    let mut resolver =
        CorrespondenceResolver::configure(&source, &target, ConstraintMap::new(), config).unwrap();
    let report = resolver.resolve().unwrap();
    assert!(report.summary.unmatched.is_empty());
    assert_eq!(report.summary.fallback, target.triangle_count());
}

#[test]
fn isolated_vertices_are_not_unknowns() {
    let mut source = two_triangles();
    source.push_vertex(DVec3::new(5.0, 5.0, 5.0), DVec3::Z, None);
    source.uv_u.clear();
    source.uv_v.clear();

    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(3), source.position(3));

    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, 0.0));
    let mut resolver =
        CorrespondenceResolver::configure(&source, &two_triangles(), anchors, config).unwrap();
    assert_eq!(resolver.free_vertex_count(), 3);

    resolver.resolve().unwrap();
    assert_eq!(resolver.deformed_source().position(4), DVec3::new(5.0, 5.0, 5.0));
}

#[test]
fn degenerate_source_face_is_an_error() {
    let mut source = TriangleMesh::with_capacity(3, 1);
    source.push_vertex(DVec3::ZERO, DVec3::Z, None);
    source.push_vertex(DVec3::X, DVec3::Z, None);
    source.push_vertex(DVec3::X * 2.0, DVec3::Z, None);
    source.push_triangle(0, 1, 2);

    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(0), DVec3::ZERO);

    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, 0.0));
    let mut resolver =
        CorrespondenceResolver::configure(&source, &two_triangles(), anchors, config).unwrap();
    assert!(matches!(
        resolver.resolve(),
        Err(DeformError::DegenerateFace { face: 0 })
    ));
}

#[test]
fn configure_rejects_out_of_range_anchor() {
    let mesh = two_triangles();
    let mut anchors = ConstraintMap::new();
    anchors.insert(VertexId(99), DVec3::ZERO);
    let result = CorrespondenceResolver::configure(&mesh, &mesh, anchors, ResolverConfig::default());
    assert!(matches!(result, Err(DeformError::InvalidCorrespondence(_))));
}

#[test]
fn configure_rejects_invalid_config() {
    let mesh = two_triangles();
    let config = ResolverConfig::single_stage(StageWeights::new(1.0, 0.1, -5.0));
    let result = CorrespondenceResolver::configure(&mesh, &mesh, ConstraintMap::new(), config);
    assert!(matches!(result, Err(DeformError::InvalidConfig(_))));
}

// ─── Transfer Tests ───────────────────────────────────────────

fn transfer(
    source_ref: &TriangleMesh,
    source_deform: &TriangleMesh,
    target_ref: &TriangleMesh,
    corr: Correspondence,
    config: &TransferConfig,
) -> TriangleMesh {
    let mut solver = TransferSolver::new();
    solver.set_source_reference(source_ref).unwrap();
    solver.set_source_deform(source_deform).unwrap();
    solver.set_target_reference(target_ref, corr, config).unwrap();
    let mut out = target_ref.clone();
    solver.deform(&mut out).unwrap();
    out
}

#[test]
fn undeformed_source_leaves_target_unchanged() {
    let mesh = quad_grid(4, 4, 2.0, 2.0);
    let out = transfer(
        &mesh,
        &mesh,
        &mesh,
        identity_faces(mesh.triangle_count()),
        &TransferConfig::default(),
    );
    assert!(max_error(&out, &mesh) < 1e-5);
}

#[test]
fn translated_source_leaves_target_in_place() {
    // Translation has an identity gradient
    let mesh = quad_grid(4, 4, 2.0, 2.0);
    let moved = transformed(&mesh, |p| p + DVec3::new(3.0, -1.0, 2.0));
    let out = transfer(
        &mesh,
        &moved,
        &mesh,
        identity_faces(mesh.triangle_count()),
        &TransferConfig::default(),
    );
    assert!(max_error(&out, &mesh) < 1e-5);
}

#[test]
fn uniform_scale_transfers() {
    let mesh = quad_grid(4, 4, 2.0, 2.0);
    let scaled = transformed(&mesh, |p| p * 2.0);
    let out = transfer(
        &mesh,
        &scaled,
        &mesh,
        identity_faces(mesh.triangle_count()),
        &TransferConfig::default(),
    );
    assert!(max_error(&out, &scaled) < 1e-4, "error {}", max_error(&out, &scaled));
}

#[test]
fn rotation_transfers_to_other_mesh() {
    let source = quad_grid(4, 4, 2.0, 2.0);
    let rotation = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2);
    let rotated = transformed(&source, |p| rotation * p);

    // Target has the same connectivity but a different aspect ratio
    let target = quad_grid(4, 4, 3.0, 1.0);
    let expected = transformed(&target, |p| rotation * p);

    let out = transfer(
        &source,
        &rotated,
        &target,
        identity_faces(target.triangle_count()),
        &TransferConfig::default(),
    );
    assert!(max_error(&out, &expected) < 1e-4, "error {}", max_error(&out, &expected));

    // Normals follow the new geometry
    for v in 0..out.vertex_count() {
        assert!((out.normal(v) - DVec3::Z).length() < 1e-6);
    }
}

#[test]
fn unmatched_target_faces_hold_identity() {
    let mesh = quad_grid(3, 3, 1.0, 1.0);
    let scaled = transformed(&mesh, |p| p * 3.0);
    let out = transfer(
        &mesh,
        &scaled,
        &mesh,
        Correspondence::dense_multi(mesh.triangle_count()),
        &TransferConfig::default(),
    );
    assert!(max_error(&out, &mesh) < 1e-5);
}

#[test]
fn identity_source_variants_leave_target_unchanged() {
    let mesh = quad_grid(3, 3, 1.0, 1.0);
    let mut solver = TransferSolver::new();
    solver.set_identity_source_reference(&mesh).unwrap();
    solver.set_identity_source_deform(&mesh).unwrap();
    solver
        .set_target_reference(&mesh, identity_faces(mesh.triangle_count()), &TransferConfig::default())
        .unwrap();

    let mut out = mesh.clone();
    solver.deform(&mut out).unwrap();
    assert!(max_error(&out, &mesh) < 1e-5);
}

#[test]
fn rows_count_correspondence_slots() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut corr = Correspondence::dense_multi(8);
    corr.add(0, 0).unwrap();
    corr.add(0, 1).unwrap();
    for f in 1..7 {
        corr.add(f, f).unwrap();
    }
    // face 7 has no match and keeps one identity slot

    let mut solver = TransferSolver::new();
    solver
        .set_target_reference(&mesh, corr, &TransferConfig::default())
        .unwrap();
    assert_eq!(solver.rows(), 9 * (2 + 6 + 1));
    assert!(solver.is_ready());
}

#[test]
fn dedup_collapses_sphere_seam_and_poles() {
    let (stacks, slices) = (8, 12);
    let sphere = uv_sphere(1.0, stacks, slices);
    let config = TransferConfig {
        dedup_vertices: true,
        ..Default::default()
    };

    let mut solver = TransferSolver::new();
    solver.set_source_reference(&sphere).unwrap();
    solver.set_source_deform(&sphere).unwrap();
    solver
        .set_target_reference(&sphere, identity_faces(sphere.triangle_count()), &config)
        .unwrap();
    assert_eq!(solver.unique_vertex_count(), 2 + (stacks - 1) * slices);

    let mut out = sphere.clone();
    solver.deform(&mut out).unwrap();
    assert!(max_error(&out, &sphere) < 1e-5);
    // Seam copies still coincide
    for i in 0..=stacks {
        let row = i * (slices + 1);
        assert_eq!(out.position(row), out.position(row + slices));
    }
}

#[test]
fn factorization_is_reused_across_poses() {
    let mesh = quad_grid(3, 3, 2.0, 2.0);
    let mut solver = TransferSolver::new();
    solver.set_source_reference(&mesh).unwrap();
    solver
        .set_target_reference(&mesh, identity_faces(mesh.triangle_count()), &TransferConfig::default())
        .unwrap();

    for scale in [0.5, 2.0] {
        let pose = transformed(&mesh, |p| p * scale);
        solver.set_source_deform(&pose).unwrap();
        let mut out = mesh.clone();
        solver.deform(&mut out).unwrap();
        assert!(max_error(&out, &pose) < 1e-4, "scale {scale}");
    }
}

#[test]
fn deform_requires_target_reference() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut solver = TransferSolver::new();
    solver.set_source_reference(&mesh).unwrap();
    solver.set_source_deform(&mesh).unwrap();
    assert!(!solver.is_ready());

    let mut out = mesh.clone();
    assert!(matches!(solver.deform(&mut out), Err(DeformError::Solver(_))));
}

#[test]
fn deform_requires_both_source_sides() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut solver = TransferSolver::new();
    solver.set_source_reference(&mesh).unwrap();
    solver
        .set_target_reference(&mesh, identity_faces(8), &TransferConfig::default())
        .unwrap();

    let mut out = mesh.clone();
    assert!(matches!(solver.deform(&mut out), Err(DeformError::InvalidConfig(_))));
}

#[test]
fn deform_rejects_face_count_mismatch() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut solver = TransferSolver::new();
    solver.set_source_reference(&mesh).unwrap();
    solver.set_source_deform(&mesh).unwrap();
    solver
        .set_target_reference(&mesh, identity_faces(8), &TransferConfig::default())
        .unwrap();

    let mut other = quad_grid(3, 3, 1.0, 1.0);
    assert!(matches!(
        solver.deform(&mut other),
        Err(DeformError::SizeMismatch { expected: 8, actual: 18, .. })
    ));
}

#[test]
fn source_pose_face_count_must_match_reference() {
    let mut solver = TransferSolver::new();
    solver.set_source_reference(&quad_grid(2, 2, 1.0, 1.0)).unwrap();
    let result = solver.set_source_deform(&quad_grid(3, 3, 1.0, 1.0));
    assert!(matches!(result, Err(DeformError::SizeMismatch { .. })));
}

#[test]
fn correspondence_to_missing_source_face_is_an_error() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut corr = Correspondence::dense_multi(8);
    corr.add(0, 50).unwrap();

    let mut solver = TransferSolver::new();
    solver.set_source_reference(&mesh).unwrap();
    solver.set_source_deform(&mesh).unwrap();
    solver
        .set_target_reference(&mesh, corr, &TransferConfig::default())
        .unwrap();

    let mut out = mesh.clone();
    assert!(matches!(
        solver.deform(&mut out),
        Err(DeformError::InvalidCorrespondence(_))
    ));
}

#[test]
fn correspondence_size_must_match_target() {
    let mesh = quad_grid(2, 2, 1.0, 1.0);
    let mut solver = TransferSolver::new();
    let result = solver.set_target_reference(&mesh, identity_faces(5), &TransferConfig::default());
    assert!(matches!(result, Err(DeformError::SizeMismatch { .. })));
}

#[test]
fn degenerate_source_reference_face_is_an_error() {
    let mut mesh = TriangleMesh::with_capacity(3, 1);
    mesh.push_vertex(DVec3::ZERO, DVec3::Z, None);
    mesh.push_vertex(DVec3::X, DVec3::Z, None);
    mesh.push_vertex(DVec3::X * 3.0, DVec3::Z, None);
    mesh.push_triangle(0, 1, 2);

    let mut solver = TransferSolver::new();
    assert!(matches!(
        solver.set_source_reference(&mesh),
        Err(DeformError::DegenerateFace { face: 0 })
    ));
}
