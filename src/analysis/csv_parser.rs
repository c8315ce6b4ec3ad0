use std::collections::HashSet;

use crate::error::{AnalysisError, Result};
use crate::model::Dataset;

/// One physical line is one record. Blank lines between records are rows of
/// empty cells; leading and trailing blank lines are ignored.
pub fn parse_csv(content: &str) -> Result<Dataset> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines: Vec<&str> = content.lines().collect();

    let first = lines.iter().position(|line| !line.trim().is_empty());
    let last = lines.iter().rposition(|line| !line.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return Err(AnalysisError::Parse {
            line: 1,
            message: "missing header row".to_string(),
        });
    };

    let headers = split_record(lines[first], first + 1)?
        .into_iter()
        .map(|field| field.replace('"', "").trim().to_string())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(AnalysisError::Parse {
                line: first + 1,
                message: format!("duplicate column name '{header}'"),
            });
        }
    }

    let mut rows = Vec::with_capacity(last - first);
    for (index, line) in lines.iter().enumerate().take(last + 1).skip(first + 1) {
        rows.push(split_record(line, index + 1)?);
    }

    Ok(Dataset::new(headers, rows))
}

fn split_record(line: &str, line_number: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            other => current.push(other),
        }
    }

    if in_quotes {
        return Err(AnalysisError::Parse {
            line: line_number,
            message: "unterminated quoted field".to_string(),
        });
    }

    fields.push(current.trim().to_string());
    Ok(fields)
}
