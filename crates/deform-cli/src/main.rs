//! Deform CLI: correspondence resolving and deformation transfer.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "deform")]
#[command(version, about = "Deformation transfer between triangle meshes")]
struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a face-to-face correspondence from a sparse vertex correspondence.
    Correspond(CorrespondArgs),

    /// Transfer the deformation of a source mesh onto a target mesh.
    Transfer(TransferArgs),

    /// Print statistics of a correspondence file.
    Inspect {
        /// Path to the correspondence file.
        path: PathBuf,
    },

    /// Validate a mesh (.obj, .json) or a config file (.toml).
    Validate {
        /// Path to mesh or config file.
        path: PathBuf,
    },
}

#[derive(Args)]
pub struct CorrespondArgs {
    /// Path to the source reference mesh.
    #[arg(short = 's', long)]
    pub source_ref: PathBuf,

    /// Path to the target reference mesh.
    #[arg(short = 't', long)]
    pub target_ref: PathBuf,

    /// Path to the vertex correspondence file (source vertex → target vertex).
    #[arg(short = 'v', long)]
    pub vertex_corr: PathBuf,

    /// Path to write the face correspondence to.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Directory receiving the deformed source after every stage.
    #[arg(short = 'i', long)]
    pub intermediate: Option<PathBuf>,

    /// Anchor source vertices through the target's texture coordinates
    /// instead of the corresponded target vertex positions.
    #[arg(long)]
    pub uv_anchors: bool,

    /// Solver configuration (TOML).
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("correspondence")
        .required(true)
        .args(["vertex_corr", "face_corr"])
))]
pub struct TransferArgs {
    /// Path to the source reference mesh.
    #[arg(short = 'r', long)]
    pub source_ref: PathBuf,

    /// Path to a source deform mesh. Repeat for several poses.
    #[arg(short = 'd', long, required = true)]
    pub source_deform: Vec<PathBuf>,

    /// Path to the target reference mesh.
    #[arg(short = 't', long)]
    pub target_ref: PathBuf,

    /// Path to the vertex correspondence file; the face correspondence is
    /// resolved first.
    #[arg(short = 'v', long)]
    pub vertex_corr: Option<PathBuf>,

    /// Path to a face correspondence file (target face → source faces).
    #[arg(short = 'f', long)]
    pub face_corr: Option<PathBuf>,

    /// Path to save the deformed target mesh to. With several poses,
    /// `<stem>-<NN>.<ext>` is written per pose.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Anchor through texture coordinates (with --vertex-corr).
    #[arg(long, requires = "vertex_corr")]
    pub uv_anchors: bool,

    /// Solver configuration (TOML).
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Correspond(args) => commands::correspond(args),
        Commands::Transfer(args) => commands::transfer(args),
        Commands::Inspect { path } => commands::inspect(path),
        Commands::Validate { path } => commands::validate(path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
