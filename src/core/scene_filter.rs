//! Catalog filtering by sensing date and scene-level cloud cover.

use crate::types::{Scene, SceneCollection};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Scene selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterParams {
    /// First sensing date kept (inclusive)
    pub start: NaiveDate,
    /// First sensing date excluded (exclusive)
    pub end: NaiveDate,
    /// Scenes with cloud cover strictly below this percentage are kept
    pub max_cloud_pct: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2024, 11, 30).unwrap_or(NaiveDate::MAX),
            max_cloud_pct: 20.0,
        }
    }
}

/// Filters a scene catalog into an ordered collection
pub struct SceneFilter {
    params: FilterParams,
}

impl SceneFilter {
    pub fn new(params: FilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    fn keeps(&self, scene: &Scene) -> bool {
        let date = scene.sensing_time().date_naive();
        date >= self.params.start
            && date < self.params.end
            && scene.cloud_pct() < self.params.max_cloud_pct
    }

    /// Select the subset of scenes inside the date window and below the
    /// cloud ceiling, preserving catalog order. An empty result is a
    /// valid collection, not an error.
    pub fn filter(&self, catalog: &[Scene]) -> SceneCollection {
        let scenes: Vec<Scene> = catalog
            .iter()
            .filter(|s| self.keeps(s))
            .cloned()
            .collect();

        log::info!(
            "Scene filter [{} .. {}), cloud < {}%: kept {}/{} scenes",
            self.params.start,
            self.params.end,
            self.params.max_cloud_pct,
            scenes.len(),
            catalog.len()
        );
        if scenes.is_empty() && !catalog.is_empty() {
            log::warn!("No scenes matched the filter window");
        }

        SceneCollection::new(scenes)
    }
}
