use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use super::aggregation::{distribution, time_series};
use super::csv_parser::parse_csv;
use super::evaluation::{dispersion, evaluate_labeled, parse_label, synthetic_metrics};
use super::preprocessing::plan_preprocessing;
use super::rng::SeededRng;
use super::schema_inference::infer_schema;
use super::scoring::{EnsembleScorer, ScoringBackend, backend_for};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result, Stage, StageContext, StageError};
use crate::model::{
    AnalysisResult, AnomalyResult, Dataset, DispersionMetrics, EvaluationMetrics, ScoreStatus,
    Summary,
};

const EVALUATION_STREAM: u64 = 3;
const SERIES_STREAM: u64 = 4;
const TOP_REASON_LIMIT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: AnalysisResult,
    pub seed: u64,
    pub backend: String,
    pub timings: Vec<StageTiming>,
}

pub fn analyze_text(text: &str, config: &AnalysisConfig) -> Result<AnalysisResult, StageError> {
    run_pipeline(text, config).map(|run| run.result)
}

pub fn analyze(dataset: Dataset, config: &AnalysisConfig) -> Result<AnalysisResult, StageError> {
    let backend = backend_for(config).stage(Stage::Scoring)?;
    Pipeline::new(config, backend)
        .run_dataset(dataset)
        .map(|run| run.result)
}

pub fn run_pipeline(text: &str, config: &AnalysisConfig) -> Result<PipelineRun, StageError> {
    let backend = backend_for(config).stage(Stage::Scoring)?;
    run_with_backend(text, config, backend)
}

pub fn run_with_backend(
    text: &str,
    config: &AnalysisConfig,
    backend: Arc<dyn ScoringBackend>,
) -> Result<PipelineRun, StageError> {
    let mut pipeline = Pipeline::new(config, backend);
    let dataset = pipeline.timed(Stage::Parsing, || parse_csv(text))?;
    info!(
        rows = dataset.row_count(),
        columns = dataset.headers.len(),
        "parsed csv input"
    );
    pipeline.run_dataset(dataset)
}

struct Pipeline<'a> {
    config: &'a AnalysisConfig,
    backend: Arc<dyn ScoringBackend>,
    seed: u64,
    timings: Vec<StageTiming>,
}

impl<'a> Pipeline<'a> {
    fn new(config: &'a AnalysisConfig, backend: Arc<dyn ScoringBackend>) -> Self {
        let seed = config.resolved_seed();
        info!(seed, backend = %backend.name(), "starting analysis run");
        Self {
            config,
            backend,
            seed,
            timings: Vec::new(),
        }
    }

    fn timed<T>(&mut self, stage: Stage, work: impl FnOnce() -> Result<T>) -> Result<T, StageError> {
        let started = Instant::now();
        let outcome = work().stage(stage);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &outcome {
            Ok(_) => info!(stage = %stage, duration_ms, "stage finished"),
            Err(err) => warn!(stage = %stage, duration_ms, error = %err.source, "stage failed"),
        }
        self.timings.push(StageTiming { stage, duration_ms });
        outcome
    }

    fn run_dataset(mut self, dataset: Dataset) -> Result<PipelineRun, StageError> {
        let dataset = Arc::new(dataset);
        let config = self.config;

        let schema = self.timed(Stage::Inferring, || infer_schema(&dataset))?;
        let features = Arc::new(match &config.label_column {
            Some(label_column) => schema.without_column(label_column),
            None => schema.clone(),
        });
        let preprocessing =
            self.timed(Stage::Preprocessing, || Ok(plan_preprocessing(&features)))?;

        let scorer = EnsembleScorer::new(
            Arc::clone(&self.backend),
            config.max_scored_rows,
            config.scoring_timeout_ms,
        );
        let seed = self.seed;
        let scoring = self.timed(Stage::Scoring, || Ok(scorer.score(&dataset, &features, seed)))?;
        let mut warnings = scoring.warnings;

        let (evaluation, dispersion) = self.timed(Stage::Evaluating, || {
            evaluate(&dataset, &scoring.results, config, seed, &mut warnings)
        })?;

        let (distribution_data, time_series_data) = self.timed(Stage::Aggregating, || {
            let bins = distribution(
                &dataset,
                &features,
                config.histogram_bins,
                config.placeholder_bins,
            )?;
            let series = time_series(
                &dataset,
                &features,
                config.max_series_points,
                config.reference_date,
                &mut SeededRng::stream(seed, SERIES_STREAM),
            );
            Ok((bins, series))
        })?;

        let summary = summarize(&dataset, &scoring.results, warnings);
        info!(
            rows = summary.rows,
            anomalies = summary.anomaly_count,
            unscored = summary.unscored_count,
            warnings = summary.warnings.len(),
            "analysis run completed"
        );

        let result = AnalysisResult {
            schema,
            preprocessing,
            models: scoring.models,
            evaluation,
            dispersion,
            summary,
            results: scoring.results,
            time_series_data: Some(time_series_data),
            distribution_data: Some(distribution_data),
        };

        Ok(PipelineRun {
            result,
            seed: self.seed,
            backend: self.backend.name().to_string(),
            timings: self.timings,
        })
    }
}

fn evaluate(
    dataset: &Dataset,
    results: &[AnomalyResult],
    config: &AnalysisConfig,
    seed: u64,
    warnings: &mut Vec<String>,
) -> Result<(EvaluationMetrics, Option<DispersionMetrics>)> {
    let scores: Vec<f64> = results.iter().filter_map(|result| result.anomaly_score).collect();

    let spread = if scores.is_empty() && dataset.row_count() > 0 {
        warnings.push("score dispersion skipped: no scored rows".to_string());
        None
    } else {
        Some(dispersion(&scores)?)
    };

    let metrics = match &config.label_column {
        None => synthetic_metrics(&mut SeededRng::stream(seed, EVALUATION_STREAM)),
        Some(label_column) => {
            if dataset.column_index(label_column).is_none() {
                return Err(AnalysisError::InvalidInput(format!(
                    "label column '{label_column}' is not in the header"
                )));
            }
            let pairs: Vec<(f64, bool)> = results
                .iter()
                .filter_map(|result| {
                    let score = result.anomaly_score?;
                    let label = parse_label(result.raw.get(label_column)?)?;
                    Some((score, label))
                })
                .collect();
            let skipped = scores.len() - pairs.len();
            if pairs.is_empty() {
                if !scores.is_empty() {
                    warnings.push(format!(
                        "no scored rows carry a usable '{label_column}' label; metrics unavailable"
                    ));
                }
                EvaluationMetrics::default()
            } else {
                if skipped > 0 {
                    warnings.push(format!(
                        "{skipped} scored rows have no usable '{label_column}' label"
                    ));
                }
                evaluate_labeled(&pairs)?
            }
        }
    };

    Ok((metrics, spread))
}

fn summarize(dataset: &Dataset, results: &[AnomalyResult], warnings: Vec<String>) -> Summary {
    Summary {
        rows: dataset.row_count(),
        columns: dataset.headers.clone(),
        anomaly_count: results.iter().filter(|result| result.is_flagged()).count(),
        unscored_count: results
            .iter()
            .filter(|result| result.status == ScoreStatus::Unscored)
            .count(),
        top_reasons: top_reasons(results),
        warnings,
    }
}

fn top_reasons(results: &[AnomalyResult]) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let explanations = results
        .iter()
        .filter(|result| result.status == ScoreStatus::Scored)
        .flat_map(|result| &result.explanations);
    for explanation in explanations {
        match counts
            .iter()
            .position(|(title, _)| *title == explanation.title)
        {
            Some(index) => counts[index].1 += 1,
            None => counts.push((explanation.title.as_str(), 1)),
        }
    }

    counts.sort_by(|left, right| right.1.cmp(&left.1));
    counts
        .into_iter()
        .take(TOP_REASON_LIMIT)
        .map(|(title, _)| title.to_string())
        .collect()
}
