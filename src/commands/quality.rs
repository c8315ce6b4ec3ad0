use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use anomaly_scan::analysis::csv_parser::parse_csv;
use anomaly_scan::analysis::quality::data_quality;
use anomaly_scan::analysis::schema_inference::infer_schema;

use crate::cli::QualityArgs;
use crate::util::read_csv_input;

pub fn run(args: QualityArgs) -> Result<()> {
    let text = read_csv_input(&args.input)?;
    let dataset = parse_csv(&text)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let schema = infer_schema(&dataset)
        .with_context(|| format!("failed to infer schema for {}", args.input.display()))?;
    let report = data_quality(&schema)
        .with_context(|| format!("failed to assess {}", args.input.display()))?;

    info!(
        input = %args.input.display(),
        overall_completeness = report.overall_completeness,
        issues = report.issues.len(),
        "computed data quality"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize quality json output")?;
        writeln!(output)?;
    } else {
        writeln!(
            output,
            "Completeness: {:.1}% nulls={:.1}% cardinality={:.1}%",
            report.overall_completeness, report.null_percentage, report.average_cardinality
        )?;
        for column in &report.columns {
            writeln!(
                output,
                "\t{}\t{}\tcomplete={:.1}% cardinality={:.1}%",
                column.name, column.column_type, column.completeness, column.cardinality
            )?;
        }
        for issue in &report.issues {
            writeln!(output, "Issue: {issue}")?;
        }
    }

    output.flush()?;
    Ok(())
}
