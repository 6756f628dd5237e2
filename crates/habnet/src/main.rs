//! habnet: build habitat networks from a habitat layer and a landcover
//! cost layer, and write them as GeoJSON with optional statistics.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use habnet_core::io::{list_fields, read_geotiff, write_polygons};
use habnet_core::stats::write_stats_csv;
use habnet_core::{
    build_networks, load_inputs, InputKind, InputSpec, Neighbourhood, NetworkParams, OutputSpec, RunConfig,
    RunSummary,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "habnet", version, about = "Habitat network builder")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build networks and write the output layers
    Run(RunArgs),
    /// List the attribute fields of a GeoJSON landcover layer
    Fields {
        /// Landcover GeoJSON
        landcover: PathBuf,
    },
    /// Show information about a raster file
    Info {
        /// Input GeoTIFF
        raster: PathBuf,
    },
}

/// Every flag overrides the matching entry of `--config`.
#[derive(Args, Debug)]
struct RunArgs {
    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input format: vector (GeoJSON) or raster (GeoTIFF)
    #[arg(long)]
    kind: Option<InputKind>,

    /// Habitat layer
    #[arg(long)]
    habitat: Option<PathBuf>,

    /// Landcover layer
    #[arg(long)]
    landcover: Option<PathBuf>,

    /// Landcover attribute holding the cost (vector input)
    #[arg(long)]
    cost_field: Option<String>,

    /// Cell size for rasterizing vector input [default: 10]
    #[arg(long)]
    cell_size: Option<f64>,

    /// Cell neighbourhood: 4 or 8 [default: 8]
    #[arg(long, value_parser = parse_neighbourhood)]
    neighbourhood: Option<Neighbourhood>,

    /// Minimum habitat patch area [default: 0]
    #[arg(long)]
    min_area: Option<f64>,

    /// Maximum dispersal cost
    #[arg(long)]
    max_cost: Option<f64>,

    /// Habitat value to treat as background [default: none, every data cell is habitat]
    #[arg(long)]
    background: Option<f64>,

    /// Output habitat layer (GeoJSON)
    #[arg(long)]
    habitat_out: Option<PathBuf>,

    /// Output network layer (GeoJSON)
    #[arg(long)]
    network_out: Option<PathBuf>,

    /// Write the per-network statistics table
    #[arg(long)]
    stats: bool,

    /// Statistics table path [default: next to the network layer]
    #[arg(long)]
    stats_path: Option<PathBuf>,

    /// Linear unit name for the statistics headers [default: undefined]
    #[arg(long)]
    linear_unit: Option<String>,

    /// Directory for the intermediate GeoTIFFs
    #[arg(long)]
    rasters_dir: Option<PathBuf>,

    /// Write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn parse_neighbourhood(s: &str) -> std::result::Result<Neighbourhood, String> {
    s.parse::<Neighbourhood>().map_err(|e| e.to_string())
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("missing --{flag} (or --config)"))
}

impl RunArgs {
    /// Merge the config file (if any) with the command-line flags.
    fn resolve(self) -> Result<RunConfig> {
        let base = match &self.config {
            Some(path) => Some(
                RunConfig::from_json_file(path).with_context(|| format!("Cannot load config {}", path.display()))?,
            ),
            None => None,
        };

        let mut cfg = match base {
            Some(cfg) => cfg,
            None => RunConfig {
                inputs: InputSpec {
                    kind: self.kind.unwrap_or_default(),
                    habitat: required(self.habitat.clone(), "habitat")?,
                    landcover: required(self.landcover.clone(), "landcover")?,
                    cost_field: None,
                },
                params: NetworkParams::new(required(self.max_cost, "max-cost")?),
                outputs: OutputSpec {
                    habitat: required(self.habitat_out.clone(), "habitat-out")?,
                    network: required(self.network_out.clone(), "network-out")?,
                    stats_csv: false,
                    stats_path: None,
                    rasters_dir: None,
                    summary: None,
                    linear_unit: None,
                },
            },
        };

        let RunConfig { inputs, params, outputs } = &mut cfg;
        if let Some(kind) = self.kind {
            inputs.kind = kind;
        }
        if let Some(p) = self.habitat {
            inputs.habitat = p;
        }
        if let Some(p) = self.landcover {
            inputs.landcover = p;
        }
        if self.cost_field.is_some() {
            inputs.cost_field = self.cost_field;
        }
        if let Some(v) = self.cell_size {
            params.cell_size = v;
        }
        if let Some(n) = self.neighbourhood {
            params.neighbourhood = n;
        }
        if let Some(v) = self.min_area {
            params.min_patch_area = v;
        }
        if let Some(v) = self.max_cost {
            params.max_cost = v;
        }
        if self.background.is_some() {
            params.background = self.background;
        }
        if let Some(p) = self.habitat_out {
            outputs.habitat = p;
        }
        if let Some(p) = self.network_out {
            outputs.network = p;
        }
        if self.stats || self.stats_path.is_some() {
            outputs.stats_csv = true;
        }
        if self.stats_path.is_some() {
            outputs.stats_path = self.stats_path;
        }
        if self.linear_unit.is_some() {
            outputs.linear_unit = self.linear_unit;
        }
        if self.rasters_dir.is_some() {
            outputs.rasters_dir = self.rasters_dir;
        }
        if self.summary.is_some() {
            outputs.summary = self.summary;
        }

        cfg.params.validate().context("Invalid parameters")?;
        if cfg.inputs.kind == InputKind::Vector && cfg.inputs.cost_field.is_none() {
            bail!("vector landcover needs --cost-field (see `habnet fields <landcover>`)");
        }
        Ok(cfg)
    }
}

// ── Run manifest ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Manifest<'a> {
    config: &'a RunConfig,
    summary: &'a RunSummary,
    stats_file: Option<&'a Path>,
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn run(args: RunArgs) -> Result<()> {
    let cfg = args.resolve()?;
    let outputs = &cfg.outputs;
    info!(
        "Building networks: {} habitat {}, max cost {}",
        cfg.inputs.kind,
        cfg.inputs.habitat.display(),
        cfg.params.max_cost
    );

    let inputs = load_inputs(&cfg.inputs, cfg.params.cell_size).context("Failed to load inputs")?;
    let result = build_networks(&inputs.habitat, &inputs.cost, &cfg.params).context("Network construction failed")?;

    write_polygons(&outputs.network, &result.network_polygons, None)
        .with_context(|| format!("Cannot write {}", outputs.network.display()))?;
    write_polygons(&outputs.habitat, &result.habitat_polygons, Some(&result.patch_counts))
        .with_context(|| format!("Cannot write {}", outputs.habitat.display()))?;

    let stats_file = outputs.stats_file();
    if let Some(path) = &stats_file {
        write_stats_csv(path, &result.stats, outputs.linear_unit.as_deref())
            .with_context(|| format!("Cannot write {}", path.display()))?;
        info!("Statistics: {}", path.display());
    }

    if let Some(dir) = &outputs.rasters_dir {
        result
            .write_rasters(dir)
            .with_context(|| format!("Cannot write rasters to {}", dir.display()))?;
    }

    if let Some(path) = &outputs.summary {
        let manifest = Manifest {
            config: &cfg,
            summary: &result.summary,
            stats_file: stats_file.as_deref(),
        };
        fs::write(path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }

    info!(
        "Done: {} networks from {} of {} patches ({} ms). Output: {}, {}",
        result.summary.networks,
        result.summary.patches_kept,
        result.summary.patches_total,
        result.summary.elapsed_ms,
        outputs.network.display(),
        outputs.habitat.display()
    );
    Ok(())
}

fn fields(landcover: &Path) -> Result<()> {
    let names = list_fields(landcover).with_context(|| format!("Cannot read {}", landcover.display()))?;
    if names.is_empty() {
        info!("{} has no attribute fields", landcover.display());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn raster_info(path: &Path) -> Result<()> {
    let grid = read_geotiff(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let (min_x, min_y, max_x, max_y) = grid.transform.extent(grid.width, grid.height);
    println!("File:      {}", path.display());
    println!("Size:      {} x {} ({} cells)", grid.width, grid.height, grid.data.len());
    println!("Cell size: {}", grid.transform.cell_size);
    println!("Extent:    ({min_x}, {min_y}) - ({max_x}, {max_y})");
    println!("Nodata:    {} cells", grid.count(f64::is_nan));
    match grid.valid_range() {
        Some((lo, hi)) => println!("Range:     {lo} .. {hi}"),
        None => println!("Range:     no valid cells"),
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::Fields { landcover } => fields(&landcover),
        Command::Info { raster } => raster_info(&raster),
    }
}
