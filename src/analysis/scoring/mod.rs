mod backend;
mod precomputed;
mod synthetic;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

pub use backend::{CANONICAL_MODELS, RowOutcome, RowScore, ScoringBackend};
pub use precomputed::{PrecomputedBackend, PrecomputedScores};
pub use synthetic::SyntheticBackend;

use crate::analysis::rng::SeededRng;
use crate::config::{AnalysisConfig, BackendKind};
use crate::error::{AnalysisError, Result};
use crate::model::{AnomalyResult, Dataset, Explanation, ModelResult, Schema, ScoreStatus};

const MODELS_STREAM: u64 = 1;
const SCORES_STREAM: u64 = 2;
const UNSCORED_FLAG: &str = "unscored";

pub fn backend_for(config: &AnalysisConfig) -> Result<Arc<dyn ScoringBackend>> {
    match &config.backend {
        BackendKind::Synthetic => Ok(Arc::new(SyntheticBackend::new(config.contamination))),
        BackendKind::Precomputed { scores_path } => {
            Ok(Arc::new(PrecomputedBackend::from_path(scores_path)?))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutput {
    pub models: Vec<ModelResult>,
    pub results: Vec<AnomalyResult>,
    pub warnings: Vec<String>,
}

impl ScoringOutput {
    pub fn unscored_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == ScoreStatus::Unscored)
            .count()
    }
}

pub struct EnsembleScorer {
    backend: Arc<dyn ScoringBackend>,
    max_scored_rows: usize,
    timeout: Option<Duration>,
}

impl EnsembleScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>, max_scored_rows: usize, timeout_ms: u64) -> Self {
        Self {
            backend,
            max_scored_rows,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }

    pub fn score(&self, dataset: &Arc<Dataset>, schema: &Arc<Schema>, seed: u64) -> ScoringOutput {
        let analyzed_rows = self.max_scored_rows.min(dataset.row_count());
        let started = Instant::now();

        let backend_result = match self.timeout {
            None => call_backend(self.backend.as_ref(), dataset, schema, analyzed_rows, seed),
            Some(timeout) => self.call_with_budget(dataset, schema, analyzed_rows, seed, timeout),
        };

        let mut warnings = Vec::new();
        let (models, outcomes) = match backend_result {
            Ok(output) => output,
            Err(err) => {
                warn!(backend = %self.backend.name(), error = %err, "scoring backend failed; rows left unscored");
                warnings.push(format!("all {analyzed_rows} analyzed rows unscored: {err}"));
                (Vec::new(), Vec::new())
            }
        };

        let results = assemble_results(dataset, analyzed_rows, outcomes);
        let unscored = results
            .iter()
            .filter(|result| result.status == ScoreStatus::Unscored)
            .count();
        if unscored > 0 && warnings.is_empty() {
            warnings.push(format!(
                "{unscored} of {analyzed_rows} analyzed rows have no score"
            ));
        }

        info!(
            backend = %self.backend.name(),
            analyzed_rows,
            unscored,
            model_count = models.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "scoring completed"
        );

        ScoringOutput {
            models,
            results,
            warnings,
        }
    }

    fn call_with_budget(
        &self,
        dataset: &Arc<Dataset>,
        schema: &Arc<Schema>,
        analyzed_rows: usize,
        seed: u64,
        timeout: Duration,
    ) -> Result<(Vec<ModelResult>, Vec<RowOutcome>)> {
        let (sender, receiver) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let dataset = Arc::clone(dataset);
        let schema = Arc::clone(schema);

        thread::Builder::new()
            .name("scoring-backend".to_string())
            .spawn(move || {
                let output = call_backend(backend.as_ref(), &dataset, &schema, analyzed_rows, seed);
                // The receiver is gone once the budget has expired.
                let _ = sender.send(output);
            })?;

        match receiver.recv_timeout(timeout) {
            Ok(output) => output,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(AnalysisError::Timeout {
                backend: self.backend.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(AnalysisError::Backend {
                backend: self.backend.name().to_string(),
                reason: "worker exited without a result".to_string(),
            }),
        }
    }
}

fn call_backend(
    backend: &dyn ScoringBackend,
    dataset: &Dataset,
    schema: &Schema,
    analyzed_rows: usize,
    seed: u64,
) -> Result<(Vec<ModelResult>, Vec<RowOutcome>)> {
    let models = backend.models(schema, &mut SeededRng::stream(seed, MODELS_STREAM))?;
    let outcomes = backend.score(
        dataset,
        schema,
        analyzed_rows,
        &mut SeededRng::stream(seed, SCORES_STREAM),
    )?;
    Ok((models, outcomes))
}

fn assemble_results(
    dataset: &Dataset,
    analyzed_rows: usize,
    outcomes: Vec<RowOutcome>,
) -> Vec<AnomalyResult> {
    let mut by_row: HashMap<usize, RowOutcome> = outcomes
        .into_iter()
        .filter(|outcome| outcome.row_index() < analyzed_rows)
        .map(|outcome| (outcome.row_index(), outcome))
        .collect();

    (0..analyzed_rows)
        .map(|row_index| {
            let raw = dataset.raw_record(row_index);
            match by_row.remove(&row_index) {
                Some(RowOutcome::Scored(score))
                    if is_unit(score.anomaly_score)
                        && score.model_votes.iter().all(|vote| is_unit(vote.score)) =>
                {
                    AnomalyResult {
                        row_index,
                        raw,
                        anomaly_score: Some(score.anomaly_score),
                        status: ScoreStatus::Scored,
                        flags: score.flags,
                        explanations: score.explanations,
                        model_votes: score.model_votes,
                    }
                }
                Some(RowOutcome::Scored(score)) => unscored(
                    row_index,
                    raw,
                    "backend returned an out-of-range score or vote".to_string(),
                ),
                Some(RowOutcome::Unscored { reason, .. }) => unscored(row_index, raw, reason),
                None => unscored(row_index, raw, "backend returned no result".to_string()),
            }
        })
        .collect()
}

fn unscored(
    row_index: usize,
    raw: BTreeMap<String, String>,
    reason: String,
) -> AnomalyResult {
    AnomalyResult {
        row_index,
        raw,
        anomaly_score: None,
        status: ScoreStatus::Unscored,
        flags: vec![UNSCORED_FLAG.to_string()],
        explanations: vec![Explanation {
            title: "Score unavailable".to_string(),
            description: reason,
        }],
        model_votes: Vec::new(),
    }
}

fn is_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
