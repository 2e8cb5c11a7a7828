use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw digital numbers as delivered in L2A band rasters
pub type DnGrid = Array2<u16>;

/// Surface reflectance fraction, NaN marks no-data
pub type ReflectanceGrid = Array2<f32>;

/// Per-pixel validity derived from the QA60 bitmask
pub type ValidityMask = Array2<bool>;

/// Scale factor converting L2A digital numbers to reflectance fraction
pub const REFLECTANCE_SCALE: f32 = 10000.0;

/// Sentinel-2 MSI spectral bands (L2A band set, no B10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandId {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B11,
    B12,
}

impl BandId {
    /// All bands in ascending wavelength order
    pub const ALL: [BandId; 12] = [
        BandId::B01,
        BandId::B02,
        BandId::B03,
        BandId::B04,
        BandId::B05,
        BandId::B06,
        BandId::B07,
        BandId::B08,
        BandId::B8A,
        BandId::B09,
        BandId::B11,
        BandId::B12,
    ];

    /// True-color display triple (red, green, blue)
    pub const TRUE_COLOR: [BandId; 3] = [BandId::B04, BandId::B03, BandId::B02];
}

impl std::fmt::Display for BandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BandId::B01 => "B01",
            BandId::B02 => "B02",
            BandId::B03 => "B03",
            BandId::B04 => "B04",
            BandId::B05 => "B05",
            BandId::B06 => "B06",
            BandId::B07 => "B07",
            BandId::B08 => "B08",
            BandId::B8A => "B8A",
            BandId::B09 => "B09",
            BandId::B11 => "B11",
            BandId::B12 => "B12",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for BandId {
    type Err = S2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "B01" | "B1" => Ok(BandId::B01),
            "B02" | "B2" => Ok(BandId::B02),
            "B03" | "B3" => Ok(BandId::B03),
            "B04" | "B4" => Ok(BandId::B04),
            "B05" | "B5" => Ok(BandId::B05),
            "B06" | "B6" => Ok(BandId::B06),
            "B07" | "B7" => Ok(BandId::B07),
            "B08" | "B8" => Ok(BandId::B08),
            "B8A" => Ok(BandId::B8A),
            "B09" | "B9" => Ok(BandId::B09),
            "B11" => Ok(BandId::B11),
            "B12" => Ok(BandId::B12),
            other => Err(S2Error::InvalidFormat(format!(
                "Unknown band identifier: {}",
                other
            ))),
        }
    }
}

/// Geospatial bounding box in the scene's horizontal CRS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Affine geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels, no rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Ground coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.top_left_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.top_left_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (row, col) of a ground point
    pub fn ground_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }

    /// Transform of a window whose origin sits at (row0, col0) of this grid
    pub fn window(&self, row0: usize, col0: usize) -> Self {
        Self {
            top_left_x: self.top_left_x + col0 as f64 * self.pixel_width,
            top_left_y: self.top_left_y + row0 as f64 * self.pixel_height,
            ..self.clone()
        }
    }

    /// Bounding box of a grid with the given shape under this transform
    pub fn grid_bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + cols as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + rows as f64 * self.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// GDAL-ordered coefficient array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// User-drawn area of interest: a closed ring of (x, y) ground coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiPolygon {
    ring: Vec<(f64, f64)>,
}

impl AoiPolygon {
    /// A ring needs at least three distinct vertices to enclose area
    pub fn new(ring: Vec<(f64, f64)>) -> Self {
        Self { ring }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.len() < 3
    }

    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        if self.is_empty() {
            return None;
        }
        let mut bbox = BoundingBox {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for &(x, y) in &self.ring {
            bbox.min_x = bbox.min_x.min(x);
            bbox.max_x = bbox.max_x.max(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    /// Even-odd ray cast; points on an edge count as inside on one side only
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut inside = false;
        let n = self.ring.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.ring[i];
            let (xj, yj) = self.ring[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// One Sentinel-2 acquisition: spectral bands, QA bitmask, georeferencing.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Scene {
    granule_id: String,
    sensing_time: DateTime<Utc>,
    cloud_pct: f32,
    bands: HashMap<BandId, DnGrid>,
    qa: DnGrid,
    geo_transform: GeoTransform,
    crs: String,
}

impl Scene {
    pub fn new(
        granule_id: impl Into<String>,
        sensing_time: DateTime<Utc>,
        cloud_pct: f32,
        bands: HashMap<BandId, DnGrid>,
        qa: DnGrid,
        geo_transform: GeoTransform,
        crs: impl Into<String>,
    ) -> S2Result<Self> {
        let granule_id = granule_id.into();
        if bands.is_empty() {
            return Err(S2Error::InvalidFormat(format!(
                "Scene {} carries no spectral bands",
                granule_id
            )));
        }
        let shape = qa.dim();
        for (band, grid) in &bands {
            if grid.dim() != shape {
                return Err(S2Error::InvalidFormat(format!(
                    "Scene {}: band {} shape {:?} does not match QA shape {:?}",
                    granule_id,
                    band,
                    grid.dim(),
                    shape
                )));
            }
        }
        if !(0.0..=100.0).contains(&cloud_pct) {
            return Err(S2Error::Metadata(format!(
                "Scene {}: cloud cover {}% outside 0-100",
                granule_id, cloud_pct
            )));
        }
        Ok(Self {
            granule_id,
            sensing_time,
            cloud_pct,
            bands,
            qa,
            geo_transform,
            crs: crs.into(),
        })
    }

    pub fn granule_id(&self) -> &str {
        &self.granule_id
    }

    pub fn sensing_time(&self) -> DateTime<Utc> {
        self.sensing_time
    }

    pub fn cloud_pct(&self) -> f32 {
        self.cloud_pct
    }

    pub fn band(&self, id: BandId) -> Option<&DnGrid> {
        self.bands.get(&id)
    }

    pub fn band_ids(&self) -> impl Iterator<Item = BandId> + '_ {
        self.bands.keys().copied()
    }

    pub fn qa(&self) -> &DnGrid {
        &self.qa
    }

    /// Grid shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.qa.dim()
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }
}

/// Ordered query result over a catalog; empty is a valid outcome
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl SceneCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn empty() -> Self {
        Self { scenes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }
}

/// Pixelwise temporal mean of a masked scene collection, NaN where no
/// scene contributed a valid observation
#[derive(Debug, Clone)]
pub struct Composite {
    pub bands: HashMap<BandId, ReflectanceGrid>,
    pub geo_transform: GeoTransform,
    pub crs: String,
    pub source_granules: Vec<String>,
}

impl Composite {
    pub fn band(&self, id: BandId) -> Option<&ReflectanceGrid> {
        self.bands.get(&id)
    }

    /// Grid shape as (rows, cols); (0, 0) when the composite has no bands
    pub fn shape(&self) -> (usize, usize) {
        self.bands
            .values()
            .next()
            .map(|g| g.dim())
            .unwrap_or((0, 0))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        self.geo_transform.grid_bounds(rows, cols)
    }
}

/// Error types for Sentinel-2 compositing and export
#[derive(Debug, thiserror::Error)]
pub enum S2Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),
}

/// Result type for compositing operations
pub type S2Result<T> = Result<T, S2Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dummy_scene(cloud_pct: f32) -> S2Result<Scene> {
        let mut bands = HashMap::new();
        bands.insert(BandId::B04, Array2::<u16>::zeros((2, 2)));
        Scene::new(
            "S2A_TEST",
            Utc::now(),
            cloud_pct,
            bands,
            Array2::<u16>::zeros((2, 2)),
            GeoTransform::north_up(0.0, 0.0, 10.0),
            "EPSG:32610",
        )
    }

    #[test]
    fn test_band_id_round_trip() {
        for band in BandId::ALL {
            let parsed: BandId = band.to_string().parse().unwrap();
            assert_eq!(parsed, band);
        }
        assert!("B10".parse::<BandId>().is_err());
    }

    #[test]
    fn test_scene_shape_validation() {
        let mut bands = HashMap::new();
        bands.insert(BandId::B04, Array2::<u16>::zeros((2, 3)));
        let result = Scene::new(
            "S2A_BAD",
            Utc::now(),
            5.0,
            bands,
            Array2::<u16>::zeros((2, 2)),
            GeoTransform::north_up(0.0, 0.0, 10.0),
            "EPSG:32610",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_scene_cloud_pct_bounds() {
        assert!(dummy_scene(101.0).is_err());
        assert!(dummy_scene(20.0).is_ok());
    }

    #[test]
    fn test_geo_transform_round_trip() {
        let gt = GeoTransform::north_up(600000.0, 4260000.0, 10.0);
        let (x, y) = gt.pixel_center(3, 7);
        let (row, col) = gt.ground_to_pixel(x, y);
        assert!((row - 3.5).abs() < 1e-9);
        assert!((col - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_grid_bounds_north_up() {
        let gt = GeoTransform::north_up(100.0, 200.0, 10.0);
        let bbox = gt.grid_bounds(4, 8);
        assert_eq!(bbox.min_x, 100.0);
        assert_eq!(bbox.max_x, 180.0);
        assert_eq!(bbox.max_y, 200.0);
        assert_eq!(bbox.min_y, 160.0);
    }

    #[test]
    fn test_polygon_contains() {
        let square = AoiPolygon::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert!(square.contains(5.0, 5.0));
        assert!(!square.contains(15.0, 5.0));
        assert!(!square.contains(-1.0, -1.0));
    }

    #[test]
    fn test_degenerate_polygon_is_empty() {
        let line = AoiPolygon::new(vec![(0.0, 0.0), (10.0, 10.0)]);
        assert!(line.is_empty());
        assert!(line.bounding_box().is_none());
        assert!(!line.contains(5.0, 5.0));
    }

    #[test]
    fn test_polygon_bounding_box() {
        let triangle = AoiPolygon::new(vec![(2.0, 1.0), (8.0, 3.0), (4.0, 9.0)]);
        let bbox = triangle.bounding_box().unwrap();
        assert_eq!(bbox.min_x, 2.0);
        assert_eq!(bbox.max_x, 8.0);
        assert_eq!(bbox.min_y, 1.0);
        assert_eq!(bbox.max_y, 9.0);
    }
}
