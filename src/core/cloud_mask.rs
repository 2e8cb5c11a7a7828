//! Cloud and cirrus masking from the Sentinel-2 QA60 bitmask band.
//!
//! QA60 packs per-pixel quality flags into an integer grid: bit 10 marks
//! opaque clouds, bit 11 marks cirrus. A pixel is usable only when both
//! flags are clear. Masking also converts raw digital numbers to surface
//! reflectance fraction.

use crate::types::{
    BandId, DnGrid, ReflectanceGrid, S2Error, S2Result, Scene, ValidityMask, REFLECTANCE_SCALE,
};
use ndarray::Zip;
use std::collections::HashMap;

/// QA60 bit 10: opaque cloud
pub const CLOUD_BIT_MASK: u16 = 1 << 10;
/// QA60 bit 11: cirrus
pub const CIRRUS_BIT_MASK: u16 = 1 << 11;

/// Decode the QA60 bitmask into a per-pixel validity mask.
///
/// Both the cloud and the cirrus flag must be zero for a pixel to be
/// valid. All other bits are ignored, so the predicate is defined for
/// any input value.
pub fn cloud_mask(qa: &DnGrid) -> ValidityMask {
    qa.mapv(|v| v & CLOUD_BIT_MASK == 0 && v & CIRRUS_BIT_MASK == 0)
}

/// A scene after masking: reflectance-scaled bands with NaN at every
/// pixel the QA60 predicate rejected. Derived data, no independent
/// lifecycle.
#[derive(Debug, Clone)]
pub struct MaskedScene {
    pub granule_id: String,
    pub bands: HashMap<BandId, ReflectanceGrid>,
}

impl MaskedScene {
    pub fn band(&self, id: BandId) -> Option<&ReflectanceGrid> {
        self.bands.get(&id)
    }
}

/// Applies the QA60 predicate and reflectance scaling to whole scenes
pub struct CloudMasker;

impl CloudMasker {
    /// Mask one scene: invalid pixels become NaN, valid digital numbers
    /// are divided by the reflectance scale factor (10000).
    pub fn apply(scene: &Scene) -> S2Result<MaskedScene> {
        let validity = cloud_mask(scene.qa());
        let total = validity.len();
        let valid = validity.iter().filter(|&&v| v).count();

        log::debug!(
            "Scene {}: {}/{} pixels clear of cloud/cirrus ({:.1}%)",
            scene.granule_id(),
            valid,
            total,
            if total > 0 {
                100.0 * valid as f64 / total as f64
            } else {
                0.0
            }
        );

        let mut bands = HashMap::new();
        for band_id in scene.band_ids() {
            let dn = scene.band(band_id).ok_or_else(|| {
                S2Error::Processing(format!(
                    "Band {} disappeared from scene {}",
                    band_id,
                    scene.granule_id()
                ))
            })?;
            let reflectance = Zip::from(dn).and(&validity).map_collect(|&value, &ok| {
                if ok {
                    value as f32 / REFLECTANCE_SCALE
                } else {
                    f32::NAN
                }
            });
            bands.insert(band_id, reflectance);
        }

        Ok(MaskedScene {
            granule_id: scene.granule_id().to_string(),
            bands,
        })
    }
}
