use std::sync::Arc;

use chrono::NaiveDate;

use super::scoring::{PrecomputedBackend, PrecomputedScores, RowOutcome, ScoringBackend};
use super::{analyze_text, run_with_backend};
use crate::analysis::rng::SeededRng;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result, Stage};
use crate::model::{ColumnType, Dataset, ModelResult, Schema, ScoreStatus};

fn config(seed: u64) -> AnalysisConfig {
    AnalysisConfig {
        reference_date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"),
        ..AnalysisConfig::with_seed(seed)
    }
}

fn transactions(rows: usize) -> String {
    let mut csv = String::from("id,date,amount,merchant\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "TX-{i:04},2024-01-{:02},{}.50,\"Shop, {}\"\n",
            i % 28 + 1,
            10 + (i * 37) % 97,
            ["A", "B", "C"][i % 3]
        ));
    }
    csv
}

fn precomputed(raw: &str) -> Arc<dyn ScoringBackend> {
    let scores: PrecomputedScores =
        serde_json::from_str(raw).expect("scores document should deserialize");
    Arc::new(PrecomputedBackend::from_scores(scores))
}

struct UnavailableBackend;

impl ScoringBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn models(&self, _schema: &Schema, _rng: &mut SeededRng) -> Result<Vec<ModelResult>> {
        Ok(Vec::new())
    }

    fn score(
        &self,
        _dataset: &Dataset,
        _schema: &Schema,
        _analyzed_rows: usize,
        _rng: &mut SeededRng,
    ) -> Result<Vec<RowOutcome>> {
        Err(AnalysisError::Backend {
            backend: "unavailable".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

#[test]
fn full_run_covers_every_stage() {
    let result = analyze_text(&transactions(120), &config(42)).expect("run should succeed");

    let types: Vec<ColumnType> = result
        .schema
        .columns
        .iter()
        .map(|column| column.column_type)
        .collect();
    assert_eq!(
        types,
        vec![
            ColumnType::Id,
            ColumnType::Datetime,
            ColumnType::Numeric,
            ColumnType::Categorical,
        ]
    );
    assert_eq!(result.schema.row_count, 120);
    assert_eq!(result.preprocessing.len(), 3);

    assert_eq!(result.models.len(), 4);
    assert_eq!(result.results.len(), 100);
    assert_eq!(result.summary.rows, 120);
    assert_eq!(result.summary.unscored_count, 0);
    assert!(result.summary.warnings.is_empty());
    assert!(result.summary.anomaly_count <= 6);
    assert_eq!(result.results[0].raw["merchant"], "Shop, A");

    assert!(result.evaluation.is_synthetic);
    let spread = result.dispersion.as_ref().expect("dispersion");
    assert_eq!(spread.count, 100);

    let bins = result.distribution_data.as_ref().expect("histogram");
    assert_eq!(bins.iter().map(|bin| bin.value).sum::<usize>(), 120);
    let series = result.time_series_data.as_ref().expect("series");
    assert_eq!(series.len(), 50);
    assert_eq!(series[0].timestamp, "2024-01-01");
}

#[test]
fn result_uses_camel_case_wire_names() {
    let result = analyze_text(&transactions(30), &config(3)).expect("run should succeed");
    let json = serde_json::to_value(&result).expect("result serializes");

    for key in [
        "schema",
        "preprocessing",
        "models",
        "evaluation",
        "dispersion",
        "summary",
        "results",
        "timeSeriesData",
        "distributionData",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["schema"]["rowCount"], 30);
    assert_eq!(json["schema"]["columns"][2]["type"], "numeric");
    assert!(json["schema"]["columns"][2].get("nullCount").is_some());
    assert!(json["summary"].get("anomalyCount").is_some());
    assert!(json["summary"].get("topReasons").is_some());
    assert!(json["evaluation"].get("rocAuc").is_some());
    assert_eq!(json["evaluation"]["isSynthetic"], true);
    assert!(json["models"][0].get("featureImportance").is_some());
    let first = &json["results"][0];
    assert_eq!(first["rowIndex"], 0);
    assert_eq!(first["status"], "scored");
    assert!(first["anomalyScore"].is_f64());
    assert_eq!(first["modelVotes"].as_array().map(Vec::len), Some(4));
}

#[test]
fn same_seed_reproduces_the_whole_result() {
    let csv = transactions(80);
    let first = analyze_text(&csv, &config(1234)).expect("first run");
    let second = analyze_text(&csv, &config(1234)).expect("second run");
    assert_eq!(first, second);
}

#[test]
fn header_only_input_fails_while_evaluating() {
    let err = analyze_text("amount,merchant\n", &config(1)).expect_err("no rows must fail");
    assert_eq!(err.stage, Stage::Evaluating);
    assert!(matches!(err.source, AnalysisError::InsufficientData { .. }));
    assert!(err.to_string().starts_with("evaluating stage failed"));
}

#[test]
fn unterminated_quote_fails_while_parsing() {
    let err = analyze_text("name,amount\n\"open,1\n", &config(1)).expect_err("must fail");
    assert_eq!(err.stage, Stage::Parsing);
    assert!(matches!(err.source, AnalysisError::Parse { line: 2, .. }));
}

#[test]
fn repeated_header_fails_while_parsing() {
    let err = analyze_text("amount,merchant,amount\n1,a,2\n", &config(1))
        .expect_err("repeated header must fail");
    assert_eq!(err.stage, Stage::Parsing);
    assert!(matches!(
        &err.source,
        AnalysisError::Parse { line: 1, message } if message.contains("'amount'")
    ));
}

#[test]
fn out_of_range_precomputed_row_is_unscored_and_run_completes() {
    let backend = precomputed(
        r#"{"rows": [
            {"rowIndex": 0, "anomalyScore": 0.2},
            {"rowIndex": 1, "anomalyScore": 1.5},
            {"rowIndex": 2, "anomalyScore": 0.4}
        ]}"#,
    );
    let run = run_with_backend("amount\n1\n2\n3\n", &config(5), backend)
        .expect("one bad row must not fail the run");
    let result = run.result;

    assert_eq!(result.results[0].anomaly_score, Some(0.2));
    assert_eq!(result.results[1].status, ScoreStatus::Unscored);
    assert_eq!(result.results[1].anomaly_score, None);
    assert!(result.results[1].explanations[0].description.contains("1.5"));
    assert_eq!(result.results[2].anomaly_score, Some(0.4));
    assert_eq!(result.summary.unscored_count, 1);
    assert_eq!(result.summary.warnings.len(), 1);
}

#[test]
fn missing_rows_come_back_unscored() {
    let backend = precomputed(
        r#"{"rows": [
            {"rowIndex": 0, "anomalyScore": 0.2},
            {"rowIndex": 2, "anomalyScore": 0.9,
             "explanations": [{"title": "Spike", "description": "amount jumped"}]}
        ]}"#,
    );
    let run = run_with_backend("amount\n1\n2\n300\n", &config(5), backend).expect("run succeeds");
    let result = run.result;

    assert_eq!(run.backend, "precomputed");
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.results[1].status, ScoreStatus::Unscored);
    assert_eq!(result.results[1].anomaly_score, None);
    assert_eq!(result.results[1].flags, vec!["unscored".to_string()]);
    assert_eq!(result.summary.unscored_count, 1);
    assert_eq!(result.summary.anomaly_count, 1);
    assert_eq!(result.summary.top_reasons, vec!["Spike".to_string()]);
    assert_eq!(result.summary.warnings.len(), 1);
    assert_eq!(result.dispersion.as_ref().map(|spread| spread.count), Some(2));

    let json = serde_json::to_value(&result.results[1]).expect("row serializes");
    assert!(json["anomalyScore"].is_null());
    assert_eq!(json["status"], "unscored");
}

#[test]
fn backend_failure_leaves_rows_unscored_without_failing() {
    let run = run_with_backend("amount\n1\n2\n3\n", &config(5), Arc::new(UnavailableBackend))
        .expect("backend failure is not a stage failure");
    let result = run.result;

    assert!(result.results.iter().all(|row| row.status == ScoreStatus::Unscored));
    assert_eq!(result.summary.unscored_count, 3);
    assert_eq!(result.summary.anomaly_count, 0);
    assert!(result.dispersion.is_none());
    assert!(
        result
            .summary
            .warnings
            .iter()
            .any(|warning| warning.contains("connection refused"))
    );
}

#[test]
fn label_column_yields_real_metrics_and_ranked_reasons() {
    let backend = precomputed(
        r#"{"rows": [
            {"rowIndex": 0, "anomalyScore": 0.1,
             "explanations": [{"title": "Odd", "description": ""}]},
            {"rowIndex": 1, "anomalyScore": 0.8,
             "explanations": [{"title": "Spike", "description": ""}]},
            {"rowIndex": 2, "anomalyScore": 0.9,
             "explanations": [{"title": "Spike", "description": ""}, {"title": "Rare", "description": ""}]},
            {"rowIndex": 3, "anomalyScore": 0.95,
             "explanations": [{"title": "Rare", "description": ""}, {"title": "Late", "description": ""}]}
        ]}"#,
    );
    let config = AnalysisConfig {
        label_column: Some("is_fraud".to_string()),
        ..config(9)
    };
    let run = run_with_backend(
        "amount,is_fraud\n10,no\n20,no\n30,yes\n1000,yes\n",
        &config,
        backend,
    )
    .expect("labeled run");
    let evaluation = &run.result.evaluation;

    assert!(!evaluation.is_synthetic);
    assert_eq!(evaluation.accuracy, Some(0.75));
    assert_eq!(evaluation.recall, Some(1.0));
    assert_eq!(evaluation.roc_auc, Some(1.0));
    assert!((evaluation.precision.expect("precision") - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(
        run.result.summary.top_reasons,
        vec!["Spike", "Rare", "Odd", "Late"]
    );
}

#[test]
fn label_column_without_usable_labels_reports_unavailable_metrics() {
    let config = AnalysisConfig {
        label_column: Some("is_fraud".to_string()),
        ..config(3)
    };
    let result = analyze_text("amount,is_fraud\n10,\n20,\n30,\n", &config)
        .expect("unusable labels must not fail the run");
    let evaluation = &result.evaluation;

    assert!(!evaluation.is_synthetic);
    assert_eq!(evaluation.accuracy, None);
    assert_eq!(evaluation.precision, None);
    assert_eq!(evaluation.recall, None);
    assert_eq!(evaluation.f1_score, None);
    assert_eq!(evaluation.roc_auc, None);
    assert!(
        result
            .summary
            .warnings
            .iter()
            .any(|warning| warning.contains("'is_fraud'"))
    );
}

#[test]
fn label_column_is_not_treated_as_a_feature() {
    let mut labeled_csv = String::from("is_fraud,amount\n");
    let mut plain_csv = String::from("amount\n");
    for i in 0..30 {
        let amount = 10 + (i * 37) % 97;
        labeled_csv.push_str(&format!("{},{amount}\n", i % 2));
        plain_csv.push_str(&format!("{amount}\n"));
    }
    let labeled_config = AnalysisConfig {
        label_column: Some("is_fraud".to_string()),
        ..config(11)
    };

    let labeled = analyze_text(&labeled_csv, &labeled_config).expect("labeled run");
    let plain = analyze_text(&plain_csv, &config(11)).expect("plain run");

    assert_eq!(labeled.schema.columns[0].name, "is_fraud");
    assert_eq!(labeled.schema.columns[0].column_type, ColumnType::Numeric);
    assert!(labeled.preprocessing.iter().all(|step| step.column != "is_fraud"));
    for model in &labeled.models {
        assert!(!model.feature_importance.contains_key("is_fraud"));
        assert!(model.feature_importance.contains_key("amount"));
    }
    assert_eq!(labeled.distribution_data, plain.distribution_data);
}

#[test]
fn unknown_label_column_fails_while_evaluating() {
    let config = AnalysisConfig {
        label_column: Some("missing".to_string()),
        ..config(2)
    };
    let err = analyze_text(&transactions(10), &config).expect_err("unknown label column");
    assert_eq!(err.stage, Stage::Evaluating);
    assert!(matches!(err.source, AnalysisError::InvalidInput(_)));
}

#[test]
fn run_records_seed_and_stage_timings() {
    let run = super::run_pipeline(&transactions(20), &config(77)).expect("run");
    assert_eq!(run.seed, 77);
    assert_eq!(run.backend, "synthetic");
    let stages: Vec<Stage> = run.timings.iter().map(|timing| timing.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Parsing,
            Stage::Inferring,
            Stage::Preprocessing,
            Stage::Scoring,
            Stage::Evaluating,
            Stage::Aggregating,
        ]
    );
}
