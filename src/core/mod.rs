//! Core Sentinel-2 processing modules

pub mod cloud_mask;
pub mod scene_filter;
pub mod compositor;
pub mod clip;
pub mod visualize;

// Re-export main types
pub use cloud_mask::{cloud_mask, CloudMasker, MaskedScene, CIRRUS_BIT_MASK, CLOUD_BIT_MASK};
pub use scene_filter::{FilterParams, SceneFilter};
pub use compositor::{CompositeConfig, Compositor};
pub use clip::{clip_to_polygon, resample_nearest};
pub use visualize::{render_rgb, VisualizationParams};
