//! Diagnostic visualizer: renders the rasters written by `habnet run
//! --rasters-dir` as PNG images.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use habnet_core::io::read_geotiff;
use habnet_core::Grid;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render habitat network rasters as PNG")]
struct Args {
    /// Directory holding patches.tif, cost_distance.tif, networks.tif and habitat_networks.tif
    rasters_dir: PathBuf,

    /// Output directory (created if absent) [default: the rasters directory]
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

const BACKGROUND: [u8; 3] = [245, 245, 240];
const NODATA: [u8; 3] = [40, 40, 40];

/// Label → stable distinct colour; hue steps by the golden angle.
fn label_color(label: u32) -> [u8; 3] {
    if label == 0 {
        return BACKGROUND;
    }
    let h = (label as f32 * 137.508) % 360.0;
    let (s, v) = (0.65, 0.85);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [((r + m) * 255.0) as u8, ((g + m) * 255.0) as u8, ((b + m) * 255.0) as u8]
}

/// Accumulated cost in [0, max] → yellow (source) to dark red (budget edge).
fn heat(t: f64) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let r = (255.0 - 115.0 * t) as u8;
    let g = (230.0 * (1.0 - t)) as u8;
    let b = (80.0 * (1.0 - t)) as u8;
    [r, g, b]
}

/// True if `(row, col)` belongs to a network but has a 4-connected neighbour
/// outside it (or sits on the grid edge).
fn is_network_boundary(row: usize, col: usize, networks: &Grid<f64>) -> bool {
    let id = networks.get(row, col);
    if id.is_nan() {
        return false;
    }
    [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dr, dc)| {
        match networks.offset(row, col, dr, dc) {
            Some((r, c)) => networks.get(r, c) != id,
            None => true,
        }
    })
}

fn save(grid: &Grid<f64>, path: &Path, pixel: impl Fn(usize, usize, f64) -> [u8; 3]) -> Result<()> {
    let mut img = image::RgbImage::new(grid.width as u32, grid.height as u32);
    for r in 0..grid.height {
        for c in 0..grid.width {
            img.put_pixel(c as u32, r as u32, image::Rgb(pixel(r, c, grid.get(r, c))));
        }
    }
    img.save(path).with_context(|| format!("failed to save {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Label rasters store background as nodata.
fn label_pixel(v: f64) -> [u8; 3] {
    if v.is_nan() {
        BACKGROUND
    } else {
        label_color(v as u32)
    }
}

fn read(dir: &Path, name: &str) -> Result<Grid<f64>> {
    let path = dir.join(name);
    read_geotiff(&path).with_context(|| format!("Cannot read {}", path.display()))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    let out_dir = args.output.unwrap_or_else(|| args.rasters_dir.clone());
    fs::create_dir_all(&out_dir).with_context(|| format!("cannot create {}", out_dir.display()))?;

    let patches = read(&args.rasters_dir, "patches.tif")?;
    let cost = read(&args.rasters_dir, "cost_distance.tif")?;
    let networks = read(&args.rasters_dir, "networks.tif")?;
    let habitat = read(&args.rasters_dir, "habitat_networks.tif")?;

    // ── 1. Patches and networks, categorical ────────────────────────────────
    save(&patches, &out_dir.join("patches.png"), |_, _, v| label_pixel(v))?;
    save(&networks, &out_dir.join("networks.png"), |_, _, v| label_pixel(v))?;

    // ── 2. Habitat drawn over its network, lighter ──────────────────────────
    save(&habitat, &out_dir.join("habitat_networks.png"), |r, c, v| {
        if !v.is_nan() {
            return label_color(v as u32);
        }
        let net = networks.get(r, c);
        if net.is_nan() {
            return BACKGROUND;
        }
        let [rv, gv, bv] = label_color(net as u32);
        [rv / 2 + 127, gv / 2 + 127, bv / 2 + 127]
    })?;

    // ── 3. Cost surface with network outlines ───────────────────────────────
    let max_cost = cost.valid_range().map(|(_, hi)| hi).unwrap_or(1.0).max(f64::MIN_POSITIVE);
    save(&cost, &out_dir.join("cost_distance.png"), |r, c, v| {
        if is_network_boundary(r, c, &networks) {
            [20, 20, 120]
        } else if v.is_nan() {
            NODATA
        } else {
            heat(v / max_cost)
        }
    })?;

    println!("Done.");
    Ok(())
}
