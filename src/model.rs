use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Score above which a row counts as anomalous everywhere in the report.
pub const ANOMALY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|fields| fields.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn column_values(&self, column: usize) -> Vec<&str> {
        (0..self.rows.len())
            .map(|row| self.cell(row, column))
            .collect()
    }

    pub fn raw_record(&self, row: usize) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .enumerate()
            .map(|(column, name)| (name.clone(), self.cell(row, column).to_string()))
            .collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Id,
    Text,
    Geo,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Id => "id",
            Self::Text => "text",
            Self::Geo => "geo",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub null_count: usize,
    pub unique_count: usize,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub columns: Vec<SchemaColumn>,
    pub row_count: usize,
}

impl Schema {
    pub fn first_of_type(&self, column_type: ColumnType) -> Option<&SchemaColumn> {
        self.columns
            .iter()
            .find(|column| column.column_type == column_type)
    }

    pub fn columns_of_type(&self, column_type: ColumnType) -> Vec<&SchemaColumn> {
        self.columns
            .iter()
            .filter(|column| column.column_type == column_type)
            .collect()
    }

    pub fn without_column(&self, name: &str) -> Schema {
        Schema {
            columns: self
                .columns
                .iter()
                .filter(|column| column.name != name)
                .cloned()
                .collect(),
            row_count: self.row_count,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessAction {
    Normalize,
    Impute,
    Encode,
    Extract,
}

impl PreprocessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Impute => "impute",
            Self::Encode => "encode",
            Self::Extract => "extract",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessingStep {
    pub column: String,
    pub action: PreprocessAction,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResult {
    pub name: String,
    pub params: BTreeMap<String, Value>,
    pub feature_importance: BTreeMap<String, f64>,
    pub training_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVote {
    pub model: String,
    pub score: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreStatus {
    Scored,
    Unscored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResult {
    pub row_index: usize,
    pub raw: BTreeMap<String, String>,
    /// `None` when the backend produced no score for this row.
    pub anomaly_score: Option<f64>,
    pub status: ScoreStatus,
    pub flags: Vec<String>,
    pub explanations: Vec<Explanation>,
    pub model_votes: Vec<ModelVote>,
}

impl AnomalyResult {
    pub fn is_flagged(&self) -> bool {
        self.anomaly_score
            .is_some_and(|score| score > ANOMALY_THRESHOLD)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
    pub is_synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispersionMetrics {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub iqr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub anomaly_count: usize,
    pub unscored_count: usize,
    pub top_reasons: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub timestamp: String,
    pub value: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBin {
    pub name: String,
    pub value: usize,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub schema: Schema,
    pub preprocessing: Vec<PreprocessingStep>,
    pub models: Vec<ModelResult>,
    pub evaluation: EvaluationMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispersion: Option<DispersionMetrics>,
    pub summary: Summary,
    pub results: Vec<AnomalyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series_data: Option<Vec<TimeSeriesPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_data: Option<Vec<DistributionBin>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnQuality {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub completeness: f64,
    pub null_count: usize,
    pub unique_count: usize,
    pub cardinality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityReport {
    pub columns: Vec<ColumnQuality>,
    pub overall_completeness: f64,
    pub null_percentage: f64,
    pub average_cardinality: f64,
    pub issues: Vec<String>,
}
