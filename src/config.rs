use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_MAX_SCORED_ROWS: usize = 100;
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;
pub const DEFAULT_PLACEHOLDER_BINS: usize = 20;
pub const DEFAULT_MAX_SERIES_POINTS: usize = 50;
pub const DEFAULT_SCORING_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackendKind {
    Synthetic,
    Precomputed { scores_path: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisConfig {
    pub seed: Option<u64>,
    pub backend: BackendKind,
    pub max_scored_rows: usize,
    pub contamination: f64,
    pub histogram_bins: usize,
    pub placeholder_bins: usize,
    pub max_series_points: usize,
    pub scoring_timeout_ms: u64,
    pub label_column: Option<String>,
    pub reference_date: NaiveDate,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: None,
            backend: BackendKind::Synthetic,
            max_scored_rows: DEFAULT_MAX_SCORED_ROWS,
            contamination: DEFAULT_CONTAMINATION,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            placeholder_bins: DEFAULT_PLACEHOLDER_BINS,
            max_series_points: DEFAULT_MAX_SERIES_POINTS,
            scoring_timeout_ms: DEFAULT_SCORING_TIMEOUT_MS,
            label_column: None,
            reference_date: Utc::now().date_naive(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            Utc::now()
                .timestamp_nanos_opt()
                .map(|nanos| nanos as u64)
                .unwrap_or(0x9e37_79b9_7f4a_7c15)
        })
    }
}
