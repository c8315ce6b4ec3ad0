use std::collections::HashSet;

use regex::Regex;

use crate::error::Result;
use crate::model::{ColumnType, Dataset, Schema, SchemaColumn};

const TYPE_MATCH_RATIO_MIN: f64 = 0.8;
const ID_UNIQUE_RATIO_MIN: f64 = 0.9;
const CATEGORICAL_UNIQUE_RATIO_MAX: f64 = 0.3;
const SAMPLE_VALUE_LIMIT: usize = 5;
const BOOLEAN_TOKENS: [&str; 6] = ["true", "false", "0", "1", "yes", "no"];

pub struct ColumnClassifier {
    date_patterns: [Regex; 3],
}

impl ColumnClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date_patterns: [
                // YYYY-MM-DD, optionally followed by a time part
                Regex::new(r"^\d{4}-\d{2}-\d{2}")?,
                // DD/MM/YYYY or MM/DD/YYYY
                Regex::new(r"^\d{2}/\d{2}/\d{4}")?,
                // D-MMM-YYYY
                Regex::new(r"^\d{1,2}-[A-Za-z]{3}-\d{4}")?,
            ],
        })
    }

    pub fn classify(&self, values: &[&str]) -> ColumnType {
        let sample: Vec<&str> = values
            .iter()
            .copied()
            .filter(|value| !is_null_like(value))
            .collect();
        if sample.is_empty() {
            return ColumnType::Text;
        }

        let total = sample.len() as f64;
        let ratio = |count: usize| count as f64 / total;

        if ratio(sample.iter().filter(|value| is_finite_number(value)).count())
            >= TYPE_MATCH_RATIO_MIN
        {
            return ColumnType::Numeric;
        }

        if ratio(sample.iter().filter(|value| self.is_date(value)).count()) >= TYPE_MATCH_RATIO_MIN
        {
            return ColumnType::Datetime;
        }

        if ratio(sample.iter().filter(|value| is_boolean_token(value)).count())
            >= TYPE_MATCH_RATIO_MIN
        {
            return ColumnType::Boolean;
        }

        let unique_ratio = ratio(sample.iter().collect::<HashSet<_>>().len());
        if unique_ratio > ID_UNIQUE_RATIO_MIN {
            ColumnType::Id
        } else if unique_ratio < CATEGORICAL_UNIQUE_RATIO_MAX {
            ColumnType::Categorical
        } else {
            ColumnType::Text
        }
    }

    pub fn is_date(&self, value: &str) -> bool {
        self.date_patterns
            .iter()
            .any(|pattern| pattern.is_match(value))
    }
}

pub fn infer_schema(dataset: &Dataset) -> Result<Schema> {
    let classifier = ColumnClassifier::new()?;

    let columns = dataset
        .headers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let values = dataset.column_values(index);
            summarize_column(&classifier, name, &values)
        })
        .collect();

    Ok(Schema {
        columns,
        row_count: dataset.row_count(),
    })
}

fn summarize_column(classifier: &ColumnClassifier, name: &str, values: &[&str]) -> SchemaColumn {
    let mut seen = HashSet::new();
    let mut sample_values = Vec::new();
    let mut null_count = 0;

    for value in values {
        if is_null_like(value) {
            null_count += 1;
            continue;
        }
        seen.insert(*value);
        if sample_values.len() < SAMPLE_VALUE_LIMIT {
            sample_values.push((*value).to_string());
        }
    }

    SchemaColumn {
        name: name.to_string(),
        column_type: classifier.classify(values),
        null_count,
        unique_count: seen.len(),
        sample_values,
    }
}

pub fn is_null_like(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn is_finite_number(value: &str) -> bool {
    parse_finite(value).is_some()
}

pub fn parse_finite(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn is_boolean_token(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    BOOLEAN_TOKENS.contains(&lowered.as_str())
}
