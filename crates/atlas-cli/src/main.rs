//! mesh-atlas: convert a raw mesh into a repaired, textured asset.
//!
//! Loads one input mesh, runs the repair / decimate / orient / atlas / bake
//! pipeline, and writes the processed mesh plus optional baked texture and
//! normal map.
//!
//! # Logging
//!
//! Pass `-v`/`-vv`/`-vvv` for increasing detail, or set `RUST_LOG` directly:
//!
//! ```bash
//! RUST_LOG=mesh_atlas=debug mesh-atlas scan.obj out.obj
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use mesh_atlas::{PipelineConfig, convert_file};

/// Convert a polygonal mesh into a clean, UV-atlased, baked asset.
#[derive(Parser)]
#[command(name = "mesh-atlas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input mesh file (STL, OBJ, or PLY)
    input: PathBuf,

    /// Output mesh file (defaults to out.obj)
    out_mesh: Option<PathBuf>,

    /// Output texture map (baked vertex colors, PNG)
    out_texture: Option<PathBuf>,

    /// Output normal map (baked facet normals, PNG)
    out_normal_map: Option<PathBuf>,

    /// Pipeline configuration file (TOML); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Colocation tolerance (absolute; default derives from edge length)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Relative area threshold for pruning small components
    #[arg(long)]
    min_component_area: Option<f64>,

    /// Decimation grid resolution (cells along longest axis); omit to skip
    #[arg(long)]
    bins: Option<u32>,

    /// Hard dihedral angle for chart boundaries, in degrees
    #[arg(long)]
    hard_angle: Option<f64>,

    /// Baked image resolution (square)
    #[arg(long)]
    texture_size: Option<u32>,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // Argument-parse failures exit with status 1
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mesh_atlas={}", filter)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => PipelineConfig::default(),
    };

    if let Some(tolerance) = cli.tolerance {
        config.repair.colocate_tolerance = Some(tolerance);
    }
    if let Some(area) = cli.min_component_area {
        config.repair.min_component_area = area;
    }
    if let Some(bins) = cli.bins {
        config.decimate_bins = Some(bins);
    }
    if let Some(angle) = cli.hard_angle {
        config.atlas.hard_angle_deg = angle;
    }
    if let Some(size) = cli.texture_size {
        config.texture_size = size;
    }

    let out_mesh = cli
        .out_mesh
        .clone()
        .unwrap_or_else(|| PathBuf::from("out.obj"));

    if !cli.quiet {
        println!("{} {}", "Input mesh:".bold(), cli.input.display());
        println!("{} {}", "Output mesh:".bold(), out_mesh.display());
        if let Some(tex) = &cli.out_texture {
            println!("{} {}", "Output texture map:".bold(), tex.display());
        }
        if let Some(nm) = &cli.out_normal_map {
            println!("{} {}", "Output normal map:".bold(), nm.display());
        }
    }

    let stats = convert_file(
        &cli.input,
        &out_mesh,
        cli.out_texture.as_deref(),
        cli.out_normal_map.as_deref(),
        &config,
    )
    .with_context(|| format!("conversion of {:?} failed", cli.input))?;

    if !cli.quiet {
        println!(
            "{} {} vertices, {} facets, {} component(s)",
            "Done:".green().bold(),
            stats.vertices,
            stats.facets,
            stats.components
        );
    }

    Ok(())
}
