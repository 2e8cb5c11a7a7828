//! Temporal mean compositing of masked scene collections.
//!
//! Every scene is masked through the QA60 predicate and scaled to
//! reflectance, then the collection is reduced band by band with a
//! per-pixel mean over the valid contributions only. Pixels with no
//! valid observation anywhere in the collection stay no-data.

use crate::core::cloud_mask::{CloudMasker, MaskedScene};
use crate::types::{
    BandId, Composite, GeoTransform, ReflectanceGrid, S2Error, S2Result, SceneCollection,
};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::collections::HashMap;

/// Compositing configuration
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Bands included in the composite. An empty list selects every
    /// band present in the collection.
    pub bands: Vec<BandId>,
    /// Grid shape of the all-no-data composite produced for an empty
    /// collection.
    pub empty_shape: (usize, usize),
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            // 10 m band set
            bands: vec![BandId::B02, BandId::B03, BandId::B04, BandId::B08],
            empty_shape: (0, 0),
        }
    }
}

/// Reduces a scene collection to one representative image
pub struct Compositor {
    config: CompositeConfig,
}

impl Compositor {
    pub fn new(config: CompositeConfig) -> Self {
        Self { config }
    }

    /// Compositor with the standard 10 m band set
    pub fn standard() -> Self {
        Self::new(CompositeConfig::default())
    }

    /// Reduce the collection to its unweighted temporal mean.
    ///
    /// The result depends only on the set of input scenes, not on their
    /// order (up to floating-point rounding). A zero-scene collection
    /// yields an all-no-data image over the configured band set.
    pub fn composite(&self, collection: &SceneCollection) -> S2Result<Composite> {
        if collection.is_empty() {
            log::warn!("Compositing an empty collection: output is all no-data");
            let bands: HashMap<BandId, ReflectanceGrid> = self
                .config
                .bands
                .iter()
                .map(|&band| (band, Array2::from_elem(self.config.empty_shape, f32::NAN)))
                .collect();
            return Ok(Composite {
                bands,
                geo_transform: GeoTransform::north_up(0.0, 0.0, 1.0),
                crs: String::new(),
                source_granules: Vec::new(),
            });
        }

        let first = &collection.scenes()[0];
        let shape = first.shape();
        for scene in collection.iter() {
            if scene.shape() != shape {
                return Err(S2Error::Processing(format!(
                    "Scene {} shape {:?} differs from collection shape {:?}",
                    scene.granule_id(),
                    scene.shape(),
                    shape
                )));
            }
            if scene.geo_transform() != first.geo_transform() || scene.crs() != first.crs() {
                return Err(S2Error::Processing(format!(
                    "Scene {} is not on the collection grid",
                    scene.granule_id()
                )));
            }
        }

        let band_ids = self.resolve_bands(collection);
        log::info!(
            "Compositing {} scenes over {} bands ({}x{} pixels)",
            collection.len(),
            band_ids.len(),
            shape.0,
            shape.1
        );

        let masked: Vec<MaskedScene> = collection
            .iter()
            .map(CloudMasker::apply)
            .collect::<S2Result<_>>()?;

        let bands: HashMap<BandId, ReflectanceGrid> = band_ids
            .par_iter()
            .map(|&band| (band, mean_of_valid(&masked, band, shape)))
            .collect();

        Ok(Composite {
            bands,
            geo_transform: first.geo_transform().clone(),
            crs: first.crs().to_string(),
            source_granules: collection
                .iter()
                .map(|s| s.granule_id().to_string())
                .collect(),
        })
    }

    /// Configured band set, or every band seen in the collection when
    /// the configuration leaves it open
    fn resolve_bands(&self, collection: &SceneCollection) -> Vec<BandId> {
        if !self.config.bands.is_empty() {
            return self.config.bands.clone();
        }
        BandId::ALL
            .iter()
            .copied()
            .filter(|&band| collection.iter().any(|s| s.band(band).is_some()))
            .collect()
    }
}

/// Per-pixel mean over the non-NaN contributions at that pixel. Scenes
/// lacking the band contribute nothing; zero contributions leaves NaN.
fn mean_of_valid(masked: &[MaskedScene], band: BandId, shape: (usize, usize)) -> ReflectanceGrid {
    let mut sum = Array2::<f64>::zeros(shape);
    let mut count = Array2::<u32>::zeros(shape);

    for scene in masked {
        if let Some(grid) = scene.band(band) {
            Zip::from(&mut sum)
                .and(&mut count)
                .and(grid)
                .for_each(|s, c, &v| {
                    if !v.is_nan() {
                        *s += v as f64;
                        *c += 1;
                    }
                });
        } else {
            log::debug!("Scene {} carries no {} band", scene.granule_id, band);
        }
    }

    Zip::from(&sum).and(&count).map_collect(|&s, &c| {
        if c > 0 {
            (s / c as f64) as f32
        } else {
            f32::NAN
        }
    })
}
