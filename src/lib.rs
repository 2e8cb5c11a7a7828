//! s2compose: A Fast, Modular Sentinel-2 Cloud-Free Compositing and Export Toolkit
//!
//! This library turns a catalog of Sentinel-2 L2A acquisitions into a single
//! cloud-free composite over a date window, clips it to a user-drawn area of
//! interest, and hands the result to an asynchronous GeoTIFF export queue.

pub mod types;
pub mod io;
pub mod core;
pub mod export;

// Re-export main types and functions for easier access
pub use types::{
    AoiPolygon, BandId, BoundingBox, Composite, GeoTransform, S2Error, S2Result, Scene,
    SceneCollection,
};

pub use crate::core::{
    clip_to_polygon, cloud_mask, render_rgb, resample_nearest, CloudMasker, CompositeConfig,
    Compositor, FilterParams, SceneFilter, VisualizationParams,
};

pub use export::{
    AoiSelection, ExportParams, ExportQueue, ExportRejection, ExportRequest, ExportStatus,
};

pub use io::{Catalog, CatalogManifestParser, GeoTiffReader, GeoTiffWriter};
