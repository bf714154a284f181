//! Remorph CLI - morph target transfer command-line tool.
//!
//! Usage: remorph [--log-level LEVEL] [--config FILE] <COMMAND> ...
//!
//! Meshes and morph targets are read from and written to meta-morph files.
//! Run `remorph --help` for available commands.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use remorph::algo::diff::diff_meshes;
use remorph::algo::lod::retarget_to_lod;
use remorph::algo::project::{project_deltas, project_mesh};
use remorph::algo::resolve::{author_meta_morph, resolve_meta_morph};
use remorph::algo::weld::weld_mesh;
use remorph::config::TransferConfig;
use remorph::io;
use remorph::io::metamorph::{MetaMorph, MorphTarget, VertexMask};
use remorph::mesh::TriMesh;

#[derive(Parser)]
#[command(name = "remorph")]
#[command(author, version, about = "Morph target transfer CLI", long_about = None)]
struct Cli {
    /// Logging verbosity level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// JSON file with transfer parameters; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the contents of a meta-morph file
    Info {
        /// Input meta-morph file
        input: PathBuf,
    },

    /// Resolve a meta-morph file onto a target mesh
    Resolve {
        /// Meta-morph file with the morph targets
        meta: PathBuf,

        /// Meta-morph file holding the target mesh
        target: PathBuf,

        /// Output meta-morph file
        output: PathBuf,

        /// Keep move sets as separate `Fix_` morph targets
        #[arg(long)]
        no_merge_moves: bool,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Store render-mesh morph targets against the welded mesh
    Author {
        /// Meta-morph file with the render mesh and its morph targets
        input: PathBuf,

        /// Output meta-morph file
        output: PathBuf,

        /// JSON file with `ignore` and `move` vertex masks
        #[arg(long)]
        masks: Option<PathBuf>,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Record the difference between two poses of one mesh
    Diff {
        /// Meta-morph file with the rest pose
        before: PathBuf,

        /// Meta-morph file with the deformed pose
        after: PathBuf,

        /// Output meta-morph file
        output: PathBuf,

        /// Name of the recorded morph target
        #[arg(short, long, default_value = "Diff")]
        name: String,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Project every morph target of one mesh onto another
    Transfer {
        /// Meta-morph file with the source mesh and its morph targets
        source: PathBuf,

        /// Meta-morph file holding the target mesh
        target: PathBuf,

        /// Output meta-morph file
        output: PathBuf,

        /// Treat the target as a lower LOD of the source
        #[arg(long)]
        lod: bool,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Record a morph target that deforms a mesh into the shape of another
    Pose {
        /// Meta-morph file holding the mesh to deform
        target: PathBuf,

        /// Meta-morph file holding the shape to follow
        source: PathBuf,

        /// Output meta-morph file
        output: PathBuf,

        /// Name of the recorded morph target
        #[arg(short, long, default_value = "Pose")]
        name: String,

        #[command(flatten)]
        transfer: TransferArgs,
    },
}

/// Flags mirroring [`TransferConfig`] fields.
#[derive(Args)]
struct TransferArgs {
    /// Maximum source-target vertex distance
    #[arg(short = 't', long)]
    threshold: Option<f64>,

    /// Normal agreement threshold in [0, 1)
    #[arg(long)]
    normal_threshold: Option<f64>,

    /// Scale applied to projected deltas
    #[arg(short, long)]
    multiplier: Option<f64>,

    /// Number of delta smoothing passes
    #[arg(short = 'i', long)]
    smooth_iterations: Option<u32>,

    /// Smoothing strength in [0, 1]
    #[arg(short = 's', long)]
    smooth_strength: Option<f64>,

    /// Use single-threaded execution (for benchmarking)
    #[arg(long)]
    sequential: bool,
}

impl TransferArgs {
    fn apply(&self, mut config: TransferConfig) -> TransferConfig {
        if let Some(t) = self.threshold {
            config.vertex_threshold = t;
        }
        if let Some(t) = self.normal_threshold {
            config.normal_incompatibility_threshold = t;
        }
        if let Some(m) = self.multiplier {
            config.multiplier = m;
        }
        if let Some(i) = self.smooth_iterations {
            config.smooth_iterations = i;
        }
        if let Some(s) = self.smooth_strength {
            config.smooth_strength = s;
        }
        if self.sequential {
            config.parallel = false;
        }
        config
    }
}

/// Masks file of the `author` command.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MaskFile {
    ignore: Vec<VertexMask>,
    #[serde(rename = "move")]
    moves: Vec<VertexMask>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let base_config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
        }

        Commands::Resolve {
            meta,
            target,
            output,
            no_merge_moves,
            transfer,
        } => {
            let config = transfer.apply(base_config);
            config.validate()?;
            cmd_resolve(&meta, &target, &output, !no_merge_moves, &config)?;
        }

        Commands::Author {
            input,
            output,
            masks,
            sequential,
        } => {
            let parallel = !sequential && base_config.parallel;
            let config = base_config.with_parallel(parallel);
            config.validate()?;
            cmd_author(&input, &output, masks.as_deref(), &config)?;
        }

        Commands::Diff {
            before,
            after,
            output,
            name,
            sequential,
        } => {
            cmd_diff(&before, &after, &output, &name, !sequential && base_config.parallel)?;
        }

        Commands::Transfer {
            source,
            target,
            output,
            lod,
            transfer,
        } => {
            let config = transfer.apply(base_config);
            config.validate()?;
            cmd_transfer(&source, &target, &output, lod, &config)?;
        }

        Commands::Pose {
            target,
            source,
            output,
            name,
            transfer,
        } => {
            let config = transfer.apply(base_config);
            config.validate()?;
            cmd_pose(&target, &source, &output, &name, &config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TransferConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(TransferConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config: TransferConfig = serde_json::from_str(&text)?;
    debug!(path = %path.display(), ?config, "config loaded");
    Ok(config)
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let meta: MetaMorph = io::load(input)?;
    let mesh = meta.base_mesh()?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.vertex_count());
    println!("Triangles: {}", mesh.num_triangles());

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }

    let welded = weld_mesh(&mesh, TransferConfig::default().merge_vertex_tolerance, true);
    println!(
        "Welded: {} vertices, {} triangles",
        welded.mesh.vertex_count(),
        welded.mesh.num_triangles()
    );

    println!("Morph targets: {}", meta.morph_targets.len());
    for target in &meta.morph_targets {
        println!("  {}: {} deltas", target.name, target.deltas.len());
    }

    if !meta.requirement_blocks.is_empty() {
        println!("Requirement blocks: {}", meta.requirement_blocks.len());
        for block in &meta.requirement_blocks {
            let requirement = match &block.requirement {
                Some(r) => format!("{} vertices, {} triangles", r.vertex_count, r.triangle_count),
                None => "always".to_string(),
            };
            println!(
                "  [{}] mask={} ignore={} moves={}",
                requirement,
                block.mask.as_deref().unwrap_or("-"),
                block.ignore.len(),
                block.moves.len()
            );
        }
    }

    Ok(())
}

fn cmd_resolve(
    meta_path: &Path,
    target_path: &Path,
    output: &Path,
    merge_moves: bool,
    config: &TransferConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let meta: MetaMorph = io::load(meta_path)?;
    let target: TriMesh = io::load_mesh(target_path)?;
    info!(
        morph_targets = meta.morph_targets.len(),
        vertices = target.vertex_count(),
        "resolving"
    );

    let start = Instant::now();
    let welded = weld_mesh(&target, config.merge_vertex_tolerance, config.parallel);
    let resolved = resolve_meta_morph(&meta, &target, &welded.mesh, config, merge_moves)?;
    let elapsed = start.elapsed();

    write_result(&target, resolved, output)?;
    info!(output = %output.display(), ?elapsed, "saved");
    Ok(())
}

fn cmd_author(
    input: &Path,
    output: &Path,
    masks_path: Option<&Path>,
    config: &TransferConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let meta: MetaMorph = io::load(input)?;
    let render = meta.base_mesh()?;
    let masks = match masks_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => MaskFile::default(),
    };
    info!(
        morph_targets = meta.morph_targets.len(),
        ignore_masks = masks.ignore.len(),
        move_masks = masks.moves.len(),
        "authoring"
    );

    let start = Instant::now();
    let welded = weld_mesh(&render, config.merge_vertex_tolerance, config.parallel);
    let authored = author_meta_morph(
        &render,
        &welded.mesh,
        &meta.morph_targets,
        &masks.ignore,
        &masks.moves,
        config,
    );
    let elapsed = start.elapsed();
    info!(
        welded_vertices = welded.mesh.vertex_count(),
        stored = authored.morph_targets.len(),
        ?elapsed,
        "authored"
    );

    io::save(&authored, output)?;
    info!(output = %output.display(), "saved");
    Ok(())
}

fn cmd_diff(
    before_path: &Path,
    after_path: &Path,
    output: &Path,
    name: &str,
    parallel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let before: TriMesh = io::load_mesh(before_path)?;
    let after: TriMesh = io::load_mesh(after_path)?;
    if before.num_vertices() != after.num_vertices() {
        return Err(format!(
            "meshes differ in vertex count ({} vs {})",
            before.num_vertices(),
            after.num_vertices()
        )
        .into());
    }

    let deltas = diff_meshes(&before, &after, parallel);
    info!(name, moved = deltas.len(), "diffed");

    write_result(&before, vec![MorphTarget::new(name, deltas)], output)?;
    info!(output = %output.display(), "saved");
    Ok(())
}

fn cmd_transfer(
    source_path: &Path,
    target_path: &Path,
    output: &Path,
    lod: bool,
    config: &TransferConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let meta: MetaMorph = io::load(source_path)?;
    let source = meta.base_mesh()?;
    let target: TriMesh = io::load_mesh(target_path)?;

    let mode = if lod { "lod" } else { "projection" };
    info!(
        mode,
        morph_targets = meta.morph_targets.len(),
        source_vertices = source.vertex_count(),
        target_vertices = target.vertex_count(),
        "transferring"
    );

    let start = Instant::now();
    let transferred: Vec<MorphTarget> = meta
        .morph_targets
        .iter()
        .map(|morph| {
            let deltas = if lod {
                retarget_to_lod(&source, &target, &morph.deltas, config)
            } else {
                project_deltas(&target, &source, &morph.deltas, true, config)
            };
            info!(name = %morph.name, deltas = deltas.len(), "morph target transferred");
            MorphTarget::new(morph.name.clone(), deltas)
        })
        .collect();
    let elapsed = start.elapsed();

    write_result(&target, transferred, output)?;
    info!(output = %output.display(), ?elapsed, "saved");
    Ok(())
}

fn cmd_pose(
    target_path: &Path,
    source_path: &Path,
    output: &Path,
    name: &str,
    config: &TransferConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let target: TriMesh = io::load_mesh(target_path)?;
    let source: TriMesh = io::load_mesh(source_path)?;

    let start = Instant::now();
    let deltas = project_mesh(&target, &source, true, config);
    let elapsed = start.elapsed();
    info!(name, moved = deltas.len(), ?elapsed, "target posed");

    write_result(&target, vec![MorphTarget::new(name, deltas)], output)?;
    info!(output = %output.display(), "saved");
    Ok(())
}

fn write_result(
    mesh: &TriMesh,
    morph_targets: Vec<MorphTarget>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut result = MetaMorph::from_mesh(mesh);
    result.morph_targets = morph_targets;
    io::save(&result, output)?;
    Ok(())
}
