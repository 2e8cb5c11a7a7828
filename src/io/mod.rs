//! I/O modules for catalog manifests and GeoTIFF rasters

pub mod catalog;
pub mod geotiff;

pub use catalog::{Catalog, CatalogManifestParser};
pub use geotiff::{GeoTiffReader, GeoTiffWriter};
