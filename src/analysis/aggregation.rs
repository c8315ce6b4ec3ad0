use chrono::{Days, NaiveDate};

use crate::analysis::rng::SeededRng;
use crate::analysis::schema_inference::parse_finite;
use crate::error::{AnalysisError, Result};
use crate::model::{ColumnType, Dataset, DistributionBin, Schema, TimeSeriesPoint};

const SPARSE_BIN_COUNT: usize = 3;
const DENSE_BIN_SHARE: f64 = 0.3;
const SERIES_ANOMALY_CHANCE: f64 = 0.05;

/// Equal-width histogram over `[min, max]`. Bins are lower-inclusive and
/// upper-exclusive, except the last one which also holds `max`. A column
/// whose values are all equal collapses into one full bin.
pub fn histogram(values: &[f64], bins: usize) -> Result<Vec<DistributionBin>> {
    if bins == 0 {
        return Err(AnalysisError::InvalidInput(
            "histogram needs at least one bin".to_string(),
        ));
    }
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return Err(AnalysisError::insufficient(
            "histogram",
            "column has no valid numeric values",
        ));
    }

    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let total = valid.len();

    if max == min {
        return Ok(vec![bin(format!("{min:.0}-{max:.0}"), total, total)]);
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in &valid {
        let index = ((value - min) / width).floor() as usize;
        counts[index.min(bins - 1)] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let low = min + index as f64 * width;
            let high = low + width;
            bin(format!("{low:.0}-{high:.0}"), count, total)
        })
        .collect())
}

fn bin(name: String, count: usize, total: usize) -> DistributionBin {
    DistributionBin {
        name,
        value: count,
        is_anomaly: count < SPARSE_BIN_COUNT || count as f64 > total as f64 * DENSE_BIN_SHARE,
    }
}

pub fn distribution(
    dataset: &Dataset,
    schema: &Schema,
    bins: usize,
    placeholder_bins: usize,
) -> Result<Vec<DistributionBin>> {
    let Some(column) = schema
        .first_of_type(ColumnType::Numeric)
        .and_then(|column| dataset.column_index(&column.name))
    else {
        return Ok(placeholder_distribution(placeholder_bins));
    };

    let values: Vec<f64> = dataset
        .column_values(column)
        .into_iter()
        .filter_map(parse_finite)
        .collect();
    histogram(&values, bins)
}

pub fn placeholder_distribution(bins: usize) -> Vec<DistributionBin> {
    let center = bins.saturating_sub(1) as f64 / 2.0;
    let spread = (bins as f64 / 4.0).max(1.0);
    (0..bins)
        .map(|index| {
            let z = (index as f64 - center) / spread;
            DistributionBin {
                name: format!("{}-{}", index * 10, (index + 1) * 10),
                value: 5 + (45.0 * (-z * z).exp()).round() as usize,
                is_anomaly: index == 0 || index + 1 == bins,
            }
        })
        .collect()
}

/// Anomaly marks are an independent draw per point and do not reflect row
/// scores.
pub fn time_series(
    dataset: &Dataset,
    schema: &Schema,
    max_points: usize,
    reference_date: NaiveDate,
    rng: &mut SeededRng,
) -> Vec<TimeSeriesPoint> {
    let index_of = |column_type: ColumnType| {
        schema
            .first_of_type(column_type)
            .and_then(|column| dataset.column_index(&column.name))
    };

    let (Some(date_column), Some(value_column)) =
        (index_of(ColumnType::Datetime), index_of(ColumnType::Numeric))
    else {
        return placeholder_series(max_points, reference_date, rng);
    };

    (0..dataset.row_count().min(max_points))
        .filter_map(|row| {
            let timestamp = dataset.cell(row, date_column).trim();
            if timestamp.is_empty() {
                return None;
            }
            let value = parse_finite(dataset.cell(row, value_column))?;
            Some(TimeSeriesPoint {
                timestamp: timestamp.to_string(),
                value,
                is_anomaly: rng.next_f64() < SERIES_ANOMALY_CHANCE,
            })
        })
        .collect()
}

pub fn placeholder_series(
    points: usize,
    reference_date: NaiveDate,
    rng: &mut SeededRng,
) -> Vec<TimeSeriesPoint> {
    (0..points)
        .map(|index| {
            let day = reference_date
                .checked_sub_days(Days::new((points - index) as u64))
                .unwrap_or(reference_date);
            let wave = (index as f64 * 0.2).sin() * 50.0 + 100.0;
            TimeSeriesPoint {
                timestamp: day.format("%Y-%m-%d").to_string(),
                value: wave + rng.range(0.0, 20.0),
                is_anomaly: rng.next_f64() < SERIES_ANOMALY_CHANCE,
            }
        })
        .collect()
}
