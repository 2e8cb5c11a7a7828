//! True-color rendering of composites for quick visual inspection.

use crate::types::{BandId, Composite, S2Error, S2Result};
use ndarray::Array3;

/// Band triple and display range for RGB rendering
#[derive(Debug, Clone)]
pub struct VisualizationParams {
    /// Bands mapped to the red, green, blue channels
    pub bands: [BandId; 3],
    /// Reflectance mapped to channel value 0
    pub min: f32,
    /// Reflectance mapped to channel value 255
    pub max: f32,
}

impl Default for VisualizationParams {
    fn default() -> Self {
        Self {
            bands: BandId::TRUE_COLOR,
            min: 0.0,
            max: 0.3,
        }
    }
}

/// Linearly rescale the band triple into an 8-bit RGB cube
/// (channel x rows x cols). No-data pixels render black.
pub fn render_rgb(composite: &Composite, params: &VisualizationParams) -> S2Result<Array3<u8>> {
    if params.max <= params.min {
        return Err(S2Error::Processing(format!(
            "Display range [{}, {}] is empty",
            params.min, params.max
        )));
    }

    let (rows, cols) = composite.shape();
    let span = params.max - params.min;
    let mut rgb = Array3::<u8>::zeros((3, rows, cols));

    for (channel, &band) in params.bands.iter().enumerate() {
        let grid = composite.band(band).ok_or_else(|| {
            S2Error::Processing(format!("Composite has no {} band to display", band))
        })?;
        for ((r, c), &value) in grid.indexed_iter() {
            if value.is_nan() {
                continue;
            }
            let scaled = ((value - params.min) / span).clamp(0.0, 1.0);
            rgb[[channel, r, c]] = (scaled * 255.0).round() as u8;
        }
    }

    log::debug!(
        "Rendered {}x{} RGB preview from {}/{}/{}",
        rows,
        cols,
        params.bands[0],
        params.bands[1],
        params.bands[2]
    );

    Ok(rgb)
}
