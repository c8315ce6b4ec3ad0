use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use anomaly_scan::analysis::{PipelineRun, StageTiming, run_pipeline};
use anomaly_scan::config::{AnalysisConfig, BackendKind};
use anomaly_scan::model::{ANOMALY_THRESHOLD, AnalysisResult};

use crate::cli::{AnalyzeArgs, BackendChoice};
use crate::util::{now_utc_string, read_csv_input, sha256_file, utc_compact_string, write_json_pretty};

const FLAGGED_ROWS_SHOWN: usize = 10;

#[derive(Debug, Serialize)]
struct AnalysisRunManifest {
    manifest_version: u32,
    run_id: String,
    status: String,
    started_at: String,
    completed_at: String,
    command: String,
    input: InputFingerprint,
    seed: u64,
    backend: String,
    config: AnalysisConfig,
    stage_timings: Vec<StageTiming>,
    counts: RunCounts,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct InputFingerprint {
    path: String,
    sha256: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct RunCounts {
    rows: usize,
    columns: usize,
    analyzed_rows: usize,
    anomaly_count: usize,
    unscored_count: usize,
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    info!(input = %args.input.display(), run_id = %run_id, "starting analysis");

    let text = read_csv_input(&args.input)?;
    let config = analysis_config(&args);
    let run = run_pipeline(&text, &config)
        .with_context(|| format!("failed to analyze {}", args.input.display()))?;

    for warning in &run.result.summary.warnings {
        warn!(warning = %warning, "analysis warning");
    }

    if let Some(output_path) = &args.output {
        write_json_pretty(output_path, &run.result)?;
        info!(path = %output_path.display(), "wrote analysis report");
    }

    if let Some(manifest_path) = &args.manifest_path {
        let manifest = AnalysisRunManifest {
            manifest_version: 1,
            run_id: run_id.clone(),
            status: "completed".to_string(),
            started_at,
            completed_at: now_utc_string(),
            command: render_analyze_command(&args),
            input: InputFingerprint {
                path: args.input.display().to_string(),
                sha256: sha256_file(&args.input)?,
                bytes: text.len(),
            },
            seed: run.seed,
            backend: run.backend.clone(),
            config: config.clone(),
            stage_timings: run.timings.clone(),
            counts: run_counts(&run.result),
            warnings: run.result.summary.warnings.clone(),
        };
        write_json_pretty(manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), run_id = %run_id, "wrote run manifest");
    }

    if args.json {
        write_json_response(&run.result)
    } else {
        write_text_response(&args.input, &run)
    }
}

fn analysis_config(args: &AnalyzeArgs) -> AnalysisConfig {
    let backend = match (args.backend, &args.scores_path) {
        (BackendChoice::Precomputed, Some(scores_path)) => BackendKind::Precomputed {
            scores_path: scores_path.clone(),
        },
        _ => BackendKind::Synthetic,
    };

    AnalysisConfig {
        seed: args.seed,
        backend,
        max_scored_rows: args.max_scored_rows,
        contamination: args.contamination,
        scoring_timeout_ms: args.scoring_timeout_ms,
        label_column: args.label_column.clone(),
        ..AnalysisConfig::default()
    }
}

fn run_counts(result: &AnalysisResult) -> RunCounts {
    RunCounts {
        rows: result.summary.rows,
        columns: result.summary.columns.len(),
        analyzed_rows: result.results.len(),
        anomaly_count: result.summary.anomaly_count,
        unscored_count: result.summary.unscored_count,
    }
}

fn render_analyze_command(args: &AnalyzeArgs) -> String {
    let mut command = vec![
        "anomaly-scan".to_string(),
        "analyze".to_string(),
        "--input".to_string(),
        args.input.display().to_string(),
        "--backend".to_string(),
        args.backend.as_str().to_string(),
        "--max-scored-rows".to_string(),
        args.max_scored_rows.to_string(),
        "--contamination".to_string(),
        args.contamination.to_string(),
        "--scoring-timeout-ms".to_string(),
        args.scoring_timeout_ms.to_string(),
    ];

    if let Some(seed) = args.seed {
        command.push("--seed".to_string());
        command.push(seed.to_string());
    }
    if let Some(path) = &args.scores_path {
        command.push("--scores-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(label_column) = &args.label_column {
        command.push("--label-column".to_string());
        command.push(label_column.clone());
    }
    if let Some(path) = &args.output {
        command.push("--output".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.json {
        command.push("--json".to_string());
    }

    command.join(" ")
}

fn write_json_response(result: &AnalysisResult) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, result)
        .context("failed to serialize analysis json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(input: &Path, run: &PipelineRun) -> Result<()> {
    let result = &run.result;
    let summary = &result.summary;
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Input: {}", input.display())?;
    writeln!(
        output,
        "Rows: {} columns={} analyzed={} seed={} backend={}",
        summary.rows,
        summary.columns.len(),
        result.results.len(),
        run.seed,
        run.backend,
    )?;
    writeln!(
        output,
        "Anomalies: {} unscored={} threshold={ANOMALY_THRESHOLD}",
        summary.anomaly_count, summary.unscored_count,
    )?;

    let evaluation = &result.evaluation;
    writeln!(
        output,
        "Evaluation: accuracy={} precision={} recall={} f1={} roc_auc={} synthetic={}",
        format_metric(evaluation.accuracy),
        format_metric(evaluation.precision),
        format_metric(evaluation.recall),
        format_metric(evaluation.f1_score),
        format_metric(evaluation.roc_auc),
        evaluation.is_synthetic,
    )?;
    if let Some(spread) = &result.dispersion {
        writeln!(
            output,
            "Scores: mean={:.4} std_dev={:.4} q1={:.4} median={:.4} q3={:.4} iqr={:.4}",
            spread.mean, spread.std_dev, spread.q1, spread.q2, spread.q3, spread.iqr,
        )?;
    }

    writeln!(output, "Columns:")?;
    for column in &result.schema.columns {
        writeln!(
            output,
            "\t{}\t{}\tnulls={} unique={}",
            column.name, column.column_type, column.null_count, column.unique_count
        )?;
    }

    if !summary.top_reasons.is_empty() {
        writeln!(output, "Top reasons: {}", summary.top_reasons.join("; "))?;
    }
    for warning in &summary.warnings {
        writeln!(output, "Warning: {warning}")?;
    }

    let flagged: Vec<_> = result.results.iter().filter(|row| row.is_flagged()).collect();
    writeln!(output, "Flagged rows: {}", flagged.len())?;
    for row in flagged.into_iter().take(FLAGGED_ROWS_SHOWN) {
        let reasons: Vec<&str> = row
            .explanations
            .iter()
            .map(|explanation| explanation.title.as_str())
            .collect();
        writeln!(
            output,
            "\trow {}\tscore={:.4}\t{}",
            row.row_index,
            row.anomaly_score.unwrap_or_default(),
            reasons.join(", ")
        )?;
    }

    output.flush()?;
    Ok(())
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.4}"))
}
