use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use anomaly_scan::analysis::csv_parser::parse_csv;
use anomaly_scan::analysis::preprocessing::plan_preprocessing;
use anomaly_scan::analysis::schema_inference::infer_schema;
use anomaly_scan::model::{PreprocessingStep, Schema};

use crate::cli::SchemaArgs;
use crate::util::read_csv_input;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaResponse {
    schema: Schema,
    preprocessing: Vec<PreprocessingStep>,
}

pub fn run(args: SchemaArgs) -> Result<()> {
    let text = read_csv_input(&args.input)?;
    let dataset = parse_csv(&text)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let schema = infer_schema(&dataset)
        .with_context(|| format!("failed to infer schema for {}", args.input.display()))?;
    let preprocessing = plan_preprocessing(&schema);

    info!(
        input = %args.input.display(),
        rows = schema.row_count,
        columns = schema.columns.len(),
        steps = preprocessing.len(),
        "inferred schema"
    );

    let response = SchemaResponse {
        schema,
        preprocessing,
    };
    let mut output = io::BufWriter::new(io::stdout().lock());

    if args.json {
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize schema json output")?;
        writeln!(output)?;
    } else {
        writeln!(output, "Rows: {}", response.schema.row_count)?;
        for column in &response.schema.columns {
            writeln!(
                output,
                "{}\t{}\tnulls={} unique={}\tsamples={}",
                column.name,
                column.column_type,
                column.null_count,
                column.unique_count,
                column.sample_values.join(" | ")
            )?;
        }
        writeln!(output, "Preprocessing: {}", response.preprocessing.len())?;
        for step in &response.preprocessing {
            writeln!(
                output,
                "\t{}\t{}\t{}",
                step.column,
                step.action.as_str(),
                step.details
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
