//! Scene catalog: granule-list manifest parsing and scene loading.
//!
//! A manifest is a small XML document enumerating granules with their
//! sensing time, scene-level cloud cover, and per-band raster paths:
//!
//! ```xml
//! <granuleList>
//!   <granule>
//!     <granuleId>S2A_MSIL2A_20241012T184221</granuleId>
//!     <sensingTime>2024-10-12T18:42:21Z</sensingTime>
//!     <cloudyPixelPercentage>12.4</cloudyPixelPercentage>
//!     <bandFileList>
//!       <bandFile band="B04">granules/20241012/B04.tif</bandFile>
//!       <bandFile band="QA60">granules/20241012/QA60.tif</bandFile>
//!     </bandFileList>
//!   </granule>
//! </granuleList>
//! ```

use crate::core::scene_filter::{FilterParams, SceneFilter};
use crate::io::geotiff::GeoTiffReader;
use crate::types::{BandId, DnGrid, S2Error, S2Result, Scene, SceneCollection};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Band name reserved for the quality bitmask raster
const QA_BAND_NAME: &str = "QA60";

#[derive(Debug, Deserialize)]
pub struct GranuleList {
    #[serde(rename = "granule", default)]
    pub granules: Vec<GranuleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GranuleEntry {
    #[serde(rename = "granuleId")]
    pub granule_id: String,
    #[serde(rename = "sensingTime")]
    pub sensing_time: String,
    #[serde(rename = "cloudyPixelPercentage")]
    pub cloudy_pixel_percentage: f32,
    #[serde(rename = "bandFileList")]
    pub band_file_list: BandFileList,
}

#[derive(Debug, Deserialize)]
pub struct BandFileList {
    #[serde(rename = "bandFile", default)]
    pub band_files: Vec<BandFile>,
}

#[derive(Debug, Deserialize)]
pub struct BandFile {
    #[serde(rename = "@band")]
    pub band: String,
    #[serde(rename = "$text")]
    pub path: String,
}

/// Parser for catalog manifest XML
pub struct CatalogManifestParser;

impl CatalogManifestParser {
    /// Parse a manifest document
    pub fn parse(xml_content: &str) -> S2Result<GranuleList> {
        from_str::<GranuleList>(xml_content)
            .map_err(|e| S2Error::XmlParsing(format!("Failed to parse catalog manifest: {}", e)))
    }

    /// Parse a sensing timestamp, with or without an explicit offset
    pub fn parse_sensing_time(value: &str) -> S2Result<DateTime<Utc>> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
            return Ok(with_offset.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| S2Error::Metadata(format!("Bad sensing time '{}': {}", value, e)))
    }
}

/// An in-memory scene catalog, queryable by date window and cloud cover
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    scenes: Vec<Scene>,
}

impl Catalog {
    /// Catalog over scenes already in memory
    pub fn from_scenes(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    /// Load a catalog from a manifest file; band paths resolve relative
    /// to the manifest location
    pub fn from_manifest<P: AsRef<Path>>(path: P) -> S2Result<Self> {
        let path = path.as_ref();
        log::info!("Loading catalog manifest: {}", path.display());

        let xml = std::fs::read_to_string(path)?;
        let list = CatalogManifestParser::parse(&xml)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut scenes = Vec::with_capacity(list.granules.len());
        for granule in &list.granules {
            scenes.push(Self::load_granule(base, granule)?);
        }

        log::info!("Catalog holds {} scenes", scenes.len());
        Ok(Self { scenes })
    }

    fn load_granule(base: &Path, granule: &GranuleEntry) -> S2Result<Scene> {
        let sensing_time = CatalogManifestParser::parse_sensing_time(&granule.sensing_time)?;

        let mut bands: HashMap<BandId, DnGrid> = HashMap::new();
        let mut qa: Option<DnGrid> = None;
        let mut georef = None;

        for band_file in &granule.band_file_list.band_files {
            let raster_path: PathBuf = base.join(&band_file.path);
            let (grid, geo_transform, crs) = GeoTiffReader::read_dn_band(&raster_path)?;
            if georef.is_none() {
                georef = Some((geo_transform, crs));
            }
            if band_file.band == QA_BAND_NAME {
                qa = Some(grid);
            } else {
                bands.insert(band_file.band.parse()?, grid);
            }
        }

        let qa = qa.ok_or_else(|| {
            S2Error::Metadata(format!(
                "Granule {} lists no {} raster",
                granule.granule_id, QA_BAND_NAME
            ))
        })?;
        let (geo_transform, crs) = georef.ok_or_else(|| {
            S2Error::Metadata(format!(
                "Granule {} lists no band rasters",
                granule.granule_id
            ))
        })?;

        Scene::new(
            granule.granule_id.clone(),
            sensing_time,
            granule.cloudy_pixel_percentage,
            bands,
            qa,
            geo_transform,
            crs,
        )
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Select scenes by date window and cloud ceiling
    pub fn query(&self, params: &FilterParams) -> SceneCollection {
        SceneFilter::new(params.clone()).filter(&self.scenes)
    }
}
