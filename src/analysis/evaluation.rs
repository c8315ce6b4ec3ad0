use crate::analysis::rng::SeededRng;
use crate::error::{AnalysisError, Result};
use crate::model::{ANOMALY_THRESHOLD, DispersionMetrics, EvaluationMetrics};

pub fn dispersion(scores: &[f64]) -> Result<DispersionMetrics> {
    if scores.is_empty() {
        return Err(AnalysisError::insufficient(
            "score dispersion",
            "no scored rows",
        ));
    }
    if let Some(bad) = scores.iter().find(|score| !score.is_finite()) {
        return Err(AnalysisError::InvalidInput(format!(
            "non-finite score {bad} in dispersion input"
        )));
    }

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores
        .iter()
        .map(|score| (score - mean).powi(2))
        .sum::<f64>()
        / n;

    let mut sorted = scores.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));
    let q1 = nearest_rank(&sorted, 0.25);
    let q2 = nearest_rank(&sorted, 0.5);
    let q3 = nearest_rank(&sorted, 0.75);

    Ok(DispersionMetrics {
        count: scores.len(),
        mean,
        variance,
        std_dev: variance.sqrt(),
        q1,
        q2,
        q3,
        iqr: q3 - q1,
    })
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let index = ((sorted.len() as f64) * p).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

pub fn parse_label(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn evaluate_labeled(pairs: &[(f64, bool)]) -> Result<EvaluationMetrics> {
    if pairs.is_empty() {
        return Err(AnalysisError::insufficient(
            "labeled evaluation",
            "no scored rows carry a recognizable label",
        ));
    }

    let mut true_positive = 0usize;
    let mut false_positive = 0usize;
    let mut true_negative = 0usize;
    let mut false_negative = 0usize;
    for (score, actual) in pairs {
        match (*score > ANOMALY_THRESHOLD, *actual) {
            (true, true) => true_positive += 1,
            (true, false) => false_positive += 1,
            (false, false) => true_negative += 1,
            (false, true) => false_negative += 1,
        }
    }

    let ratio = |numerator: usize, denominator: usize| {
        (denominator > 0).then(|| numerator as f64 / denominator as f64)
    };
    let precision = ratio(true_positive, true_positive + false_positive);
    let recall = ratio(true_positive, true_positive + false_negative);
    let f1_score = match (precision, recall) {
        (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
        _ => None,
    };

    Ok(EvaluationMetrics {
        accuracy: ratio(true_positive + true_negative, pairs.len()),
        precision,
        recall,
        f1_score,
        roc_auc: roc_auc(pairs),
        is_synthetic: false,
    })
}

fn roc_auc(pairs: &[(f64, bool)]) -> Option<f64> {
    let positives = pairs.iter().filter(|(_, actual)| *actual).count();
    let negatives = pairs.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut ordered: Vec<(f64, bool)> = pairs.to_vec();
    ordered.sort_by(|left, right| left.0.total_cmp(&right.0));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < ordered.len() {
        let mut end = start;
        while end + 1 < ordered.len() && ordered[end + 1].0 == ordered[start].0 {
            end += 1;
        }
        // ranks are 1-based; tied block shares the mean rank
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        let tied_positives = ordered[start..=end]
            .iter()
            .filter(|(_, actual)| *actual)
            .count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end + 1;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

pub fn synthetic_metrics(rng: &mut SeededRng) -> EvaluationMetrics {
    EvaluationMetrics {
        accuracy: Some(rng.range(0.92, 0.97)),
        precision: Some(rng.range(0.85, 0.95)),
        recall: Some(rng.range(0.80, 0.95)),
        f1_score: Some(rng.range(0.82, 0.92)),
        roc_auc: Some(rng.range(0.90, 0.98)),
        is_synthetic: true,
    }
}
