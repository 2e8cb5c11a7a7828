//! GeoTIFF raster access through GDAL.

use crate::types::{BandId, Composite, DnGrid, GeoTransform, S2Error, S2Result};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

/// Reads Sentinel-2 band rasters
pub struct GeoTiffReader;

impl GeoTiffReader {
    /// Read a single-band u16 raster together with its georeferencing
    pub fn read_dn_band<P: AsRef<Path>>(path: P) -> S2Result<(DnGrid, GeoTransform, String)> {
        let path = path.as_ref();
        log::debug!("Reading band raster: {}", path.display());

        let dataset = Dataset::open(path)?;
        let band = dataset.rasterband(1)?;
        let width = band.x_size();
        let height = band.y_size();
        if width == 0 || height == 0 {
            return Err(S2Error::InvalidFormat(format!(
                "Raster {} has zero extent",
                path.display()
            )));
        }

        let buffer = band.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
        let data: Vec<u16> = buffer.into_iter().collect();
        let grid = Array2::from_shape_vec((height, width), data).map_err(|e| {
            S2Error::InvalidFormat(format!("Raster {} reshape failed: {}", path.display(), e))
        })?;

        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let projection = dataset.projection();

        Ok((grid, geo_transform, projection))
    }
}

/// Writes composites as multi-band float32 GeoTIFFs
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    /// Write every band of the composite, in ascending wavelength
    /// order, with NaN declared as the no-data value.
    pub fn write_composite<P: AsRef<Path>>(
        path: P,
        composite: &Composite,
        description: Option<&str>,
    ) -> S2Result<()> {
        let path = path.as_ref();
        let (rows, cols) = composite.shape();
        if rows == 0 || cols == 0 {
            return Err(S2Error::Processing(
                "Composite has no pixels to write".to_string(),
            ));
        }

        let band_ids: Vec<BandId> = BandId::ALL
            .iter()
            .copied()
            .filter(|id| composite.bands.contains_key(id))
            .collect();
        if band_ids.is_empty() {
            return Err(S2Error::Processing(
                "Composite has no bands to write".to_string(),
            ));
        }

        log::info!(
            "Writing {} bands ({}x{} pixels) to {}",
            band_ids.len(),
            rows,
            cols,
            path.display()
        );

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset =
            driver.create_with_band_type::<f32, _>(path, cols, rows, band_ids.len())?;

        dataset.set_geo_transform(&composite.geo_transform.to_gdal())?;
        if !composite.crs.is_empty() {
            dataset.set_projection(&composite.crs)?;
        }
        if let Some(text) = description {
            dataset.set_metadata_item("TIFFTAG_IMAGEDESCRIPTION", text, "")?;
        }

        for (index, band_id) in band_ids.iter().enumerate() {
            let grid = composite.band(*band_id).ok_or_else(|| {
                S2Error::Processing(format!("Band {} disappeared from composite", band_id))
            })?;
            let mut raster_band = dataset.rasterband(index + 1)?;
            let mut buffer = Buffer::new((cols, rows), grid.iter().copied().collect());
            raster_band.write((0, 0), (cols, rows), &mut buffer)?;
            raster_band.set_description(&band_id.to_string())?;
            raster_band.set_no_data_value(Some(f64::NAN))?;
        }

        Ok(())
    }
}
