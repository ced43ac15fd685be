//! CLI command implementations.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use deform_correspondence::anchors::{build_constraints, build_constraints_from_uv};
use deform_correspondence::{ConstraintMap, Correspondence, CorrespondenceKind};
use deform_io::{read_mesh, write_mesh, MeshFormat, MeshReport};
use deform_mesh::TriangleMesh;
use deform_solver::{CorrespondenceResolver, DeformConfig, TransferSolver};
use deform_types::constants::DEGENERATE_AREA_EPSILON;

use crate::{CorrespondArgs, TransferArgs};

type CommandResult = Result<(), Box<dyn Error>>;

/// Loads a config file, or the CLI defaults when none is given. Unlike the
/// library default, the CLI collapses coincident target vertices.
fn load_config(path: Option<&Path>) -> Result<DeformConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let config: DeformConfig = toml::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
            info!(path = %path.display(), "Loaded config");
            config
        }
        None => {
            let mut config = DeformConfig::default();
            config.transfer.dedup_vertices = true;
            config
        }
    };
    config.validate()?;
    Ok(config)
}

fn anchors(
    vertex_corr: &Path,
    source: &TriangleMesh,
    target: &TriangleMesh,
    uv_anchors: bool,
) -> Result<ConstraintMap, Box<dyn Error>> {
    let pairs = Correspondence::read_path(vertex_corr, CorrespondenceKind::Sparse)
        .map_err(|e| format!("Failed to read {}: {e}", vertex_corr.display()))?;
    info!(
        vertices = pairs.num_matched(),
        pairs = pairs.num_pairs(),
        "Vertex correspondence"
    );

    if uv_anchors {
        let (map, unlocated) = build_constraints_from_uv(&pairs, source, target)?;
        if !unlocated.is_empty() {
            warn!(skipped = unlocated.len(), "Anchors outside the target UV layout");
        }
        Ok(map)
    } else {
        Ok(build_constraints(&pairs, source, target)?)
    }
}

/// Runs the resolver. With `intermediate`, the deformed source is written
/// after every stage as `correspondence-step-<N>.<ext>`.
fn resolve(
    source: &TriangleMesh,
    target: &TriangleMesh,
    constraints: ConstraintMap,
    config: &DeformConfig,
    intermediate: Option<(&Path, MeshFormat)>,
) -> Result<Correspondence, Box<dyn Error>> {
    let mut resolver =
        CorrespondenceResolver::configure(source, target, constraints, config.resolver.clone())?;

    let report = match intermediate {
        Some((dir, format)) => {
            std::fs::create_dir_all(dir)?;
            resolver.resolve_with_observer(|stage, mesh| {
                let path = dir.join(format!(
                    "correspondence-step-{stage}.{}",
                    format.extension()
                ));
                write_mesh(&path, mesh)
            })?
        }
        None => resolver.resolve()?,
    };

    info!(
        matched = report.summary.matched,
        total = report.summary.total,
        unmatched_percent = report.summary.unmatched_percent(),
        elapsed_ms = report.wall_time.as_millis() as u64,
        "Correspondence resolved"
    );

    resolver
        .into_face_correspondence()
        .ok_or_else(|| "resolver produced no face correspondence".into())
}

/// Generate a face correspondence from a sparse vertex correspondence.
pub fn correspond(args: &CorrespondArgs) -> CommandResult {
    let start = Instant::now();
    let config = load_config(args.config.as_deref())?;

    let source = read_mesh(&args.source_ref)?;
    let target = read_mesh(&args.target_ref)?;
    let constraints = anchors(&args.vertex_corr, &source, &target, args.uv_anchors)?;

    let intermediate = match &args.intermediate {
        Some(dir) => Some((dir.as_path(), MeshFormat::from_path(&args.source_ref)?)),
        None => None,
    };
    let faces = resolve(&source, &target, constraints, &config, intermediate)?;

    faces.write_path(&args.output)?;
    info!(
        path = %args.output.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Face correspondence written"
    );
    Ok(())
}

/// Output path of pose `index` out of `count`.
fn pose_output_path(output: &Path, index: usize, count: usize) -> PathBuf {
    if count == 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{stem}-{index:02}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index:02}"),
    };
    output.with_file_name(name)
}

/// Transfer the deformation of every source pose onto the target.
pub fn transfer(args: &TransferArgs) -> CommandResult {
    let start = Instant::now();
    let config = load_config(args.config.as_deref())?;

    // Fail on an unsupported output extension before any solve
    MeshFormat::from_path(&args.output)?;

    let source_ref = read_mesh(&args.source_ref)?;
    let target_ref = read_mesh(&args.target_ref)?;
    let poses = args
        .source_deform
        .iter()
        .map(read_mesh)
        .collect::<Result<Vec<_>, _>>()?;

    let faces = match (&args.vertex_corr, &args.face_corr) {
        (Some(vertex_corr), _) => {
            info!("Resolving face correspondence");
            let constraints = anchors(vertex_corr, &source_ref, &target_ref, args.uv_anchors)?;
            let resolved = resolve(&source_ref, &target_ref, constraints, &config, None)?;

            // Round trip through a temporary file, removed on drop
            let temp = tempfile::Builder::new()
                .prefix("deform-face-corr-")
                .tempfile()?;
            resolved.write_path(temp.path())?;
            Correspondence::read_path(temp.path(), CorrespondenceKind::DenseMulti)?
        }
        (None, Some(face_corr)) => {
            Correspondence::read_path(face_corr, CorrespondenceKind::DenseMulti)
                .map_err(|e| format!("Failed to read {}: {e}", face_corr.display()))?
        }
        (None, None) => return Err("either --vertex-corr or --face-corr is required".into()),
    };

    let mut solver = TransferSolver::new();
    solver.set_source_reference(&source_ref)?;
    let setup = solver.set_target_reference(&target_ref, faces, &config.transfer)?;
    info!(
        rows = solver.rows(),
        unknowns = solver.unique_vertex_count(),
        assemble_ms = setup.assemble.as_millis() as u64,
        factorize_ms = setup.factorize.as_millis() as u64,
        "Transfer system factorized"
    );

    // Solve every pose before writing so a failure leaves no partial output
    let mut results = Vec::with_capacity(poses.len());
    for (i, pose) in poses.iter().enumerate() {
        solver.set_source_deform(pose)?;
        let mut deformed = target_ref.clone();
        let timings = solver.deform(&mut deformed)?;
        info!(
            pose = i,
            solve_ms = timings.solve.as_millis() as u64,
            "Pose transferred"
        );
        results.push(deformed);
    }

    for (i, mesh) in results.iter().enumerate() {
        write_mesh(pose_output_path(&args.output, i, results.len()), mesh)?;
    }

    info!(
        poses = results.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Transfer complete"
    );
    Ok(())
}

/// Inspect a correspondence file.
pub fn inspect(path: &Path) -> CommandResult {
    let corr = Correspondence::read_path(path, CorrespondenceKind::DenseMulti)?;

    let size = corr.size();
    let matched = corr.num_matched();
    let coverage = if size == 0 {
        0.0
    } else {
        100.0 * matched as f64 / size as f64
    };

    println!("Correspondence: {}", path.display());
    println!("Elements:       {size}");
    println!("Pairs:          {}", corr.num_pairs());
    println!("Matched:        {matched} ({coverage:.1}%)");
    println!("Unmatched:      {}", size - matched);
    match corr.max_target() {
        Some(max) => println!("Max target id:  {max}"),
        None => println!("Max target id:  -"),
    }

    let longest = corr.entries().map(|(_, t)| t.len()).max().unwrap_or(0);
    println!("Longest list:   {longest}");

    Ok(())
}

/// Validate a mesh or config.
pub fn validate(path: &Path) -> CommandResult {
    let is_config = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_config {
        let config = load_config(Some(path))?;
        println!("Config:         {}", path.display());
        println!("Stages:         {}", config.resolver.stages.len());
        println!("Max matches:    {}", config.resolver.max_correspondences);
        println!("Dedup vertices: {}", config.transfer.dedup_vertices);
        println!("Regularization: {:e}", config.transfer.regularization);
        println!("Config is valid.");
        return Ok(());
    }

    let mesh = read_mesh(path)?;
    let report = MeshReport::new(&mesh, DEGENERATE_AREA_EPSILON);
    println!("Mesh: {}", path.display());
    println!("{report}");

    if !report.is_solvable() {
        return Err(format!(
            "{} degenerate faces (first: {})",
            report.degenerate_faces.len(),
            report.degenerate_faces[0]
        )
        .into());
    }
    println!("Mesh is valid.");
    Ok(())
}
