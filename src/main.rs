use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use s2compose::{
    render_rgb, AoiPolygon, AoiSelection, BandId, Catalog, CompositeConfig, Compositor,
    ExportParams, ExportQueue, ExportRejection, FilterParams, VisualizationParams,
};

#[derive(Parser, Debug)]
#[command(name = "s2compose")]
#[command(about = "Composite cloud-free Sentinel-2 imagery and export a clipped region")]
#[command(version)]
struct Args {
    /// Catalog manifest XML listing granules and band rasters
    #[arg(short, long, value_name = "FILE")]
    manifest: PathBuf,

    /// First sensing date kept (inclusive)
    #[arg(long, value_name = "DATE", default_value = "2024-10-01")]
    start: NaiveDate,

    /// First sensing date excluded
    #[arg(long, value_name = "DATE", default_value = "2024-11-30")]
    end: NaiveDate,

    /// Keep scenes with cloud cover strictly below this percentage
    #[arg(long, value_name = "PCT", default_value_t = 20.0)]
    max_cloud: f32,

    /// Area of interest: text file with one "x y" vertex per line
    #[arg(short, long, value_name = "FILE")]
    aoi: Option<PathBuf>,

    /// Destination folder for exported rasters
    #[arg(long, value_name = "DIR", default_value = "EarthEngine")]
    folder: PathBuf,

    /// File name prefix for exported rasters
    #[arg(long, default_value = "Sentinel2_Export")]
    prefix: String,

    /// Description stored in the raster metadata
    #[arg(long, default_value = "Sentinel2_Exported_Image")]
    description: String,

    /// Export resolution in meters
    #[arg(long, value_name = "METERS", default_value_t = 10.0)]
    scale: f64,

    /// Maximum pixel count the export accepts
    #[arg(long, value_name = "N", default_value_t = 1_000_000_000)]
    max_pixels: u64,

    /// Bands mapped to the red, green, blue preview channels
    #[arg(long, value_name = "R,G,B", default_value = "B04,B03,B02")]
    vis_bands: String,

    /// Reflectance displayed as black in the preview
    #[arg(long, value_name = "REFL", default_value_t = 0.0)]
    vis_min: f32,

    /// Reflectance displayed as full brightness in the preview
    #[arg(long, value_name = "REFL", default_value_t = 0.3)]
    vis_max: f32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let catalog = Catalog::from_manifest(&args.manifest)
        .with_context(|| format!("loading catalog manifest {}", args.manifest.display()))?;

    let filter = FilterParams {
        start: args.start,
        end: args.end,
        max_cloud_pct: args.max_cloud,
    };
    let collection = catalog.query(&filter);
    let compositor = Compositor::new(CompositeConfig {
        // Composite every band the collection carries
        bands: Vec::new(),
        empty_shape: (0, 0),
    });
    let composite = compositor.composite(&collection)?;

    let vis = VisualizationParams {
        bands: parse_vis_bands(&args.vis_bands)?,
        min: args.vis_min,
        max: args.vis_max,
    };
    match render_rgb(&composite, &vis) {
        Ok(rgb) => {
            let (_, rows, cols) = rgb.dim();
            log::info!("True color preview ready ({}x{} pixels)", rows, cols);
        }
        Err(e) => log::warn!("No true color preview: {}", e),
    }

    let Some(aoi_path) = args.aoi.as_ref() else {
        log::info!("No AOI supplied, nothing to export");
        return Ok(());
    };
    let polygon = read_aoi_ring(aoi_path)
        .with_context(|| format!("reading AOI ring {}", aoi_path.display()))?;

    let selection = AoiSelection::new();
    selection.replace(polygon);

    let queue = ExportQueue::start().context("starting export queue")?;
    let export_params = ExportParams {
        folder: args.folder.clone(),
        prefix: args.prefix.clone(),
        description: args.description.clone(),
        scale_m: args.scale,
        max_pixels: args.max_pixels,
    };

    let current = selection.current();
    match queue.prepare_export(&composite, current.as_ref(), &export_params) {
        Ok(request) => {
            log::info!("Export task has been added (job {})", request.job_id);
            loop {
                match queue.status(request.job_id) {
                    Some(status) if status.is_settled() => {
                        match status {
                            s2compose::ExportStatus::Completed(path) => {
                                log::info!("Exported raster: {}", path.display());
                            }
                            s2compose::ExportStatus::Failed(reason) => {
                                bail!("export job {} failed: {}", request.job_id, reason);
                            }
                            _ => {}
                        }
                        break;
                    }
                    _ => std::thread::sleep(Duration::from_millis(100)),
                }
            }
        }
        Err(ExportRejection::NoGeometry) => log::warn!("No geometry drawn!"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Parse a comma-separated band triple like "B04,B03,B02"
fn parse_vis_bands(value: &str) -> Result<[BandId; 3]> {
    let bands: Vec<BandId> = value
        .split(',')
        .map(|name| name.trim().parse::<BandId>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("parsing band triple '{}'", value))?;
    if bands.len() != 3 {
        bail!("expected exactly three bands, found {}", bands.len());
    }
    Ok([bands[0], bands[1], bands[2]])
}

/// Read a polygon ring from a whitespace-separated "x y" vertex file.
/// Blank lines and lines starting with '#' are skipped.
fn read_aoi_ring(path: &Path) -> Result<AoiPolygon> {
    let text = std::fs::read_to_string(path)?;
    let mut ring = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(x), Some(y)) = (parts.next(), parts.next()) else {
            bail!("line {}: expected 'x y'", number + 1);
        };
        let x: f64 = x.parse().with_context(|| format!("line {}: bad x", number + 1))?;
        let y: f64 = y.parse().with_context(|| format!("line {}: bad y", number + 1))?;
        ring.push((x, y));
    }
    if ring.len() < 3 {
        bail!("AOI ring needs at least three vertices, found {}", ring.len());
    }
    Ok(AoiPolygon::new(ring))
}
