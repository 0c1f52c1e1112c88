//! Engine configuration.
//!
//! Settings the host application would otherwise keep as global state
//! (default speeds, dwell times, transit behaviour) are passed to the engine
//! explicitly through this struct.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::JobCategory;

/// Configuration parameters for path and conflict computations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Speed assumed for a job with no rollingstock coupled (km/h).
    pub default_train_speed_kmh: u32,

    /// Per-category dwell time overrides (minutes).
    /// Categories not listed use their built-in default.
    pub stop_mins: BTreeMap<JobCategory, u32>,

    /// Mark stops with zero dwell as transit when inserting them.
    pub auto_transit: bool,

    /// Shift following stops when a stop is inserted in the middle of a job.
    pub rebase_on_insert: bool,

    /// Shortest travel time between two stops (minutes).
    pub min_travel_mins: i64,
}

impl EngineConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(
        default_train_speed_kmh: u32,
        auto_transit: bool,
        rebase_on_insert: bool,
        min_travel_mins: i64,
    ) -> Self {
        Self {
            default_train_speed_kmh,
            stop_mins: BTreeMap::new(),
            auto_transit,
            rebase_on_insert,
            min_travel_mins,
        }
    }

    /// Override the dwell time for a category.
    pub fn with_stop_mins(mut self, category: JobCategory, mins: u32) -> Self {
        self.stop_mins.insert(category, mins);
        self
    }

    /// Dwell time used for a newly inserted stop of this category.
    pub fn default_stop(&self, category: JobCategory) -> Duration {
        let mins = self
            .stop_mins
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_stop_mins());
        Duration::minutes(i64::from(mins))
    }

    /// Returns the minimum travel time as a Duration.
    pub fn min_travel(&self) -> Duration {
        Duration::minutes(self.min_travel_mins)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_train_speed_kmh: 120,
            stop_mins: BTreeMap::new(),
            auto_transit: true,
            rebase_on_insert: true,
            min_travel_mins: 1,
        }
    }
}
