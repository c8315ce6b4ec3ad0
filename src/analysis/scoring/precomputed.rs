use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::backend::{RowOutcome, RowScore, ScoringBackend};
use crate::analysis::rng::SeededRng;
use crate::error::Result;
use crate::model::{Dataset, ModelResult, Schema};

const BACKEND_NAME: &str = "precomputed";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedScores {
    #[serde(default)]
    pub models: Vec<ModelResult>,
    pub rows: Vec<RowScore>,
}

#[derive(Debug, Clone)]
pub struct PrecomputedBackend {
    models: Vec<ModelResult>,
    rows: HashMap<usize, RowScore>,
    rejected: HashMap<usize, String>,
}

impl PrecomputedBackend {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        let scores: PrecomputedScores = serde_json::from_slice(&raw)?;
        Ok(Self::from_scores(scores))
    }

    pub fn from_scores(scores: PrecomputedScores) -> Self {
        let mut rows = HashMap::with_capacity(scores.rows.len());
        let mut rejected = HashMap::new();
        for row in scores.rows {
            let row_index = row.row_index;
            if rejected.contains_key(&row_index) {
                continue;
            }
            if rows.remove(&row_index).is_some() {
                rejected.insert(row_index, "row scored more than once".to_string());
                continue;
            }
            match out_of_range(&row) {
                Some(reason) => {
                    rejected.insert(row_index, reason);
                }
                None => {
                    rows.insert(row_index, row);
                }
            }
        }

        if !rejected.is_empty() {
            warn!(
                backend = BACKEND_NAME,
                rejected = rejected.len(),
                "precomputed rows rejected; they will be unscored"
            );
        }

        Self {
            models: scores.models,
            rows,
            rejected,
        }
    }
}

impl ScoringBackend for PrecomputedBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn models(&self, _schema: &Schema, _rng: &mut SeededRng) -> Result<Vec<ModelResult>> {
        Ok(self.models.clone())
    }

    fn score(
        &self,
        dataset: &Dataset,
        _schema: &Schema,
        analyzed_rows: usize,
        _rng: &mut SeededRng,
    ) -> Result<Vec<RowOutcome>> {
        Ok((0..analyzed_rows.min(dataset.row_count()))
            .map(|row_index| {
                if let Some(score) = self.rows.get(&row_index) {
                    return RowOutcome::Scored(score.clone());
                }
                let reason = self
                    .rejected
                    .get(&row_index)
                    .cloned()
                    .unwrap_or_else(|| "no precomputed score for row".to_string());
                RowOutcome::Unscored { row_index, reason }
            })
            .collect())
    }
}

fn out_of_range(row: &RowScore) -> Option<String> {
    if !is_unit(row.anomaly_score) {
        return Some(format!("anomalyScore {} is outside [0, 1]", row.anomaly_score));
    }
    row.model_votes
        .iter()
        .find(|vote| !is_unit(vote.score))
        .map(|vote| format!("{} vote {} is outside [0, 1]", vote.model, vote.score))
}

fn is_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
