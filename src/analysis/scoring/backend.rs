use serde::{Deserialize, Serialize};

use crate::analysis::rng::SeededRng;
use crate::error::Result;
use crate::model::{Dataset, Explanation, ModelResult, ModelVote, Schema};

pub const CANONICAL_MODELS: [&str; 4] = ["IsolationForest", "LightGBM", "LOF", "HBOS"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowScore {
    pub row_index: usize,
    pub anomaly_score: f64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub explanations: Vec<Explanation>,
    #[serde(default)]
    pub model_votes: Vec<ModelVote>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Scored(RowScore),
    Unscored { row_index: usize, reason: String },
}

impl RowOutcome {
    pub fn row_index(&self) -> usize {
        match self {
            Self::Scored(score) => score.row_index,
            Self::Unscored { row_index, .. } => *row_index,
        }
    }
}

/// Source of anomaly scores. Implementations must keep every score and vote
/// in `[0, 1]`; rows they cannot score are reported as `Unscored`.
pub trait ScoringBackend: Send + Sync {
    fn name(&self) -> &str;

    fn models(&self, schema: &Schema, rng: &mut SeededRng) -> Result<Vec<ModelResult>>;

    fn score(
        &self,
        dataset: &Dataset,
        schema: &Schema,
        analyzed_rows: usize,
        rng: &mut SeededRng,
    ) -> Result<Vec<RowOutcome>>;
}
