//! Run configuration: classifier thresholds and source priority.
//!
//! The thresholds ship as compiled-in defaults and may be overridden from a
//! JSON config file. They have no empirical calibration behind them — the
//! classifier is reproducible, not certified — so they are configuration,
//! never inline literals.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Minimum received-transfer count before an identity is evaluated at all.
pub const MIN_RECIPIENT_COUNT: usize = 10;
/// Minimum distinct received amounts that must also appear as transaction
/// prices.
pub const MIN_MATCHING_AMOUNTS: usize = 5;
/// Matching-amount share of all distinct received amounts; must be exceeded
/// strictly.
pub const MATCH_RATIO_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub min_recipient_count: usize,
    pub min_matching_amounts: usize,
    pub match_ratio_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_recipient_count: MIN_RECIPIENT_COUNT,
            min_matching_amounts: MIN_MATCHING_AMOUNTS,
            match_ratio_threshold: MATCH_RATIO_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Person sources in priority order; the first listed source wins merge
    /// conflicts. The runner loads person batches in exactly this order.
    #[serde(default)]
    pub source_priority: Vec<String>,
}

impl ReconConfig {
    /// Load a config file, JSON. Missing file is not an error path callers
    /// need — they should pass a path only when one exists.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ReconConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}
