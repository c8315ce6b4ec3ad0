use crate::error::{AnalysisError, Result};
use crate::model::{ColumnQuality, DataQualityReport, Schema};

const MISSING_SHARE_LIMIT: f64 = 5.0;
const COMPLETENESS_FLOOR: f64 = 90.0;
const CARDINALITY_CEILING: f64 = 95.0;

pub fn data_quality(schema: &Schema) -> Result<DataQualityReport> {
    if schema.row_count == 0 {
        return Err(AnalysisError::insufficient("data quality", "dataset has no rows"));
    }
    if schema.columns.is_empty() {
        return Err(AnalysisError::insufficient("data quality", "dataset has no columns"));
    }

    let rows = schema.row_count as f64;
    let columns: Vec<ColumnQuality> = schema
        .columns
        .iter()
        .map(|column| ColumnQuality {
            name: column.name.clone(),
            column_type: column.column_type,
            completeness: (rows - column.null_count as f64) / rows * 100.0,
            null_count: column.null_count,
            unique_count: column.unique_count,
            cardinality: column.unique_count as f64 / rows * 100.0,
        })
        .collect();

    let width = columns.len() as f64;
    let overall_completeness = columns.iter().map(|c| c.completeness).sum::<f64>() / width;
    let total_nulls: usize = columns.iter().map(|c| c.null_count).sum();
    let null_percentage = total_nulls as f64 / (rows * width) * 100.0;
    let average_cardinality = columns.iter().map(|c| c.cardinality).sum::<f64>() / width;

    let mut issues = Vec::new();
    if null_percentage > MISSING_SHARE_LIMIT {
        issues.push(format!("{null_percentage:.1}% missing values across dataset"));
    }
    let incomplete = columns
        .iter()
        .filter(|c| c.completeness < COMPLETENESS_FLOOR)
        .count();
    if incomplete > 0 {
        issues.push(format!("{incomplete} column(s) with <90% completeness"));
    }
    let high_cardinality = columns
        .iter()
        .filter(|c| c.cardinality > CARDINALITY_CEILING)
        .count();
    if high_cardinality > 0 {
        issues.push(format!("{high_cardinality} column(s) with very high cardinality"));
    }
    if issues.is_empty() {
        issues.push("Excellent data quality overall".to_string());
    }

    Ok(DataQualityReport {
        columns,
        overall_completeness,
        null_percentage,
        average_cardinality,
        issues,
    })
}
