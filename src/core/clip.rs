//! Spatial subsetting of composites: polygon clipping and grid
//! resampling for export.

use crate::types::{AoiPolygon, Composite, ReflectanceGrid, S2Error, S2Result};
use ndarray::{s, Array2};
use std::collections::HashMap;

/// Clip a composite to the area of interest.
///
/// The output grid is the polygon's bounding box snapped outward to
/// whole pixels and intersected with the composite extent; pixels whose
/// centers fall outside the ring become no-data. An AOI that misses the
/// composite entirely produces a zero-sized grid, which the export
/// subsystem rejects downstream.
pub fn clip_to_polygon(composite: &Composite, aoi: &AoiPolygon) -> Composite {
    let (rows, cols) = composite.shape();
    let gt = &composite.geo_transform;

    let (row_range, col_range) = match aoi.bounding_box() {
        Some(bbox) => {
            // Map all four bbox corners so the window stays correct for
            // any axis orientation
            let corners = [
                gt.ground_to_pixel(bbox.min_x, bbox.min_y),
                gt.ground_to_pixel(bbox.min_x, bbox.max_y),
                gt.ground_to_pixel(bbox.max_x, bbox.min_y),
                gt.ground_to_pixel(bbox.max_x, bbox.max_y),
            ];
            let row_min = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
            let row_max = corners
                .iter()
                .map(|c| c.0)
                .fold(f64::NEG_INFINITY, f64::max);
            let col_min = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
            let col_max = corners
                .iter()
                .map(|c| c.1)
                .fold(f64::NEG_INFINITY, f64::max);

            let r0 = row_min.floor().clamp(0.0, rows as f64) as usize;
            let r1 = row_max.ceil().clamp(0.0, rows as f64) as usize;
            let c0 = col_min.floor().clamp(0.0, cols as f64) as usize;
            let c1 = col_max.ceil().clamp(0.0, cols as f64) as usize;
            (r0..r1, c0..c1)
        }
        None => (0..0, 0..0),
    };

    let (row0, col0) = (row_range.start, col_range.start);
    let out_rows = row_range.end.saturating_sub(row_range.start);
    let out_cols = col_range.end.saturating_sub(col_range.start);
    let window_gt = gt.window(row0, col0);

    let mut bands: HashMap<_, ReflectanceGrid> = HashMap::new();
    for (&band, grid) in &composite.bands {
        let mut cropped = if out_rows > 0 && out_cols > 0 {
            grid.slice(s![row0..row0 + out_rows, col0..col0 + out_cols])
                .to_owned()
        } else {
            Array2::from_elem((out_rows, out_cols), f32::NAN)
        };
        for ((r, c), value) in cropped.indexed_iter_mut() {
            let (x, y) = window_gt.pixel_center(r, c);
            if !aoi.contains(x, y) {
                *value = f32::NAN;
            }
        }
        bands.insert(band, cropped);
    }

    log::info!(
        "Clipped composite {}x{} -> {}x{} pixels",
        rows,
        cols,
        out_rows,
        out_cols
    );

    Composite {
        bands,
        geo_transform: window_gt,
        crs: composite.crs.clone(),
        source_granules: composite.source_granules.clone(),
    }
}

/// Nearest-neighbor resampling to the requested ground sample distance.
///
/// Keeps the grid origin and axis orientation; a scale matching the
/// source spacing returns an unchanged copy.
pub fn resample_nearest(composite: &Composite, scale_m: f64) -> S2Result<Composite> {
    if scale_m <= 0.0 {
        return Err(S2Error::Processing(format!(
            "Output resolution must be positive, got {} m",
            scale_m
        )));
    }

    let (rows, cols) = composite.shape();
    let src_gt = &composite.geo_transform;
    let src_width = src_gt.pixel_width.abs();
    let src_height = src_gt.pixel_height.abs();

    if rows == 0 || cols == 0 {
        return Ok(composite.clone());
    }
    if (src_width - scale_m).abs() < 1e-9 && (src_height - scale_m).abs() < 1e-9 {
        return Ok(composite.clone());
    }

    let out_rows = ((rows as f64 * src_height) / scale_m).ceil() as usize;
    let out_cols = ((cols as f64 * src_width) / scale_m).ceil() as usize;
    let mut out_gt = src_gt.clone();
    out_gt.pixel_width = scale_m * src_gt.pixel_width.signum();
    out_gt.pixel_height = scale_m * src_gt.pixel_height.signum();

    log::info!(
        "Resampling {}x{} @ {:.1} m -> {}x{} @ {:.1} m",
        rows,
        cols,
        src_width,
        out_rows,
        out_cols,
        scale_m
    );

    let mut bands: HashMap<_, ReflectanceGrid> = HashMap::new();
    for (&band, grid) in &composite.bands {
        let resampled = Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
            let (x, y) = out_gt.pixel_center(r, c);
            let (fr, fc) = src_gt.ground_to_pixel(x, y);
            let sr = fr.floor();
            let sc = fc.floor();
            if sr >= 0.0 && sc >= 0.0 && (sr as usize) < rows && (sc as usize) < cols {
                grid[[sr as usize, sc as usize]]
            } else {
                f32::NAN
            }
        });
        bands.insert(band, resampled);
    }

    Ok(Composite {
        bands,
        geo_transform: out_gt,
        crs: composite.crs.clone(),
        source_granules: composite.source_granules.clone(),
    })
}
