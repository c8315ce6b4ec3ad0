use std::collections::{BTreeMap, HashSet};

use serde_json::{Value, json};

use super::backend::{CANONICAL_MODELS, RowOutcome, RowScore, ScoringBackend};
use crate::analysis::rng::SeededRng;
use crate::error::Result;
use crate::model::{ColumnType, Dataset, Explanation, ModelResult, ModelVote, Schema};

const ANOMALOUS_SCORE_RANGE: (f64, f64) = (0.7, 1.0);
const NORMAL_SCORE_RANGE: (f64, f64) = (0.0, 0.4);
const VOTE_JITTER: f64 = 0.1;
const STATISTICAL_OUTLIER_CHANCE: f64 = 0.5;
const RARE_COMBINATION_CHANCE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    contamination: f64,
}

impl SyntheticBackend {
    pub fn new(contamination: f64) -> Self {
        Self {
            contamination: contamination.clamp(0.0, 1.0),
        }
    }

    fn anomalous_rows(&self, row_count: usize, rng: &mut SeededRng) -> HashSet<usize> {
        let exact = row_count as f64 * self.contamination;
        // 100 × 0.07 lands just above 7.0 in f64
        let count = if (exact - exact.round()).abs() < 1e-9 {
            exact.round()
        } else {
            exact.ceil()
        };
        rng.sample_indices(row_count, count as usize)
            .into_iter()
            .collect()
    }
}

impl ScoringBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn models(&self, schema: &Schema, rng: &mut SeededRng) -> Result<Vec<ModelResult>> {
        let numeric: Vec<&str> = schema
            .columns_of_type(ColumnType::Numeric)
            .into_iter()
            .map(|column| column.name.as_str())
            .collect();

        Ok(CANONICAL_MODELS
            .iter()
            .map(|name| {
                let (low, high) = training_time_range(name);
                ModelResult {
                    name: (*name).to_string(),
                    params: reference_params(name),
                    feature_importance: normalized_importance(&numeric, rng),
                    training_time: rng.range(low, high),
                }
            })
            .collect())
    }

    fn score(
        &self,
        dataset: &Dataset,
        schema: &Schema,
        analyzed_rows: usize,
        rng: &mut SeededRng,
    ) -> Result<Vec<RowOutcome>> {
        let anomalous = self.anomalous_rows(dataset.row_count(), rng);
        let numeric: Vec<&str> = schema
            .columns_of_type(ColumnType::Numeric)
            .into_iter()
            .map(|column| column.name.as_str())
            .collect();

        let outcomes = (0..analyzed_rows.min(dataset.row_count()))
            .map(|row_index| {
                let is_anomalous = anomalous.contains(&row_index);
                let (low, high) = if is_anomalous {
                    ANOMALOUS_SCORE_RANGE
                } else {
                    NORMAL_SCORE_RANGE
                };
                let anomaly_score = rng.range(low, high);

                let (flags, explanations) = if is_anomalous {
                    explain(&numeric, rng)
                } else {
                    (Vec::new(), Vec::new())
                };

                let model_votes = CANONICAL_MODELS
                    .iter()
                    .map(|model| ModelVote {
                        model: (*model).to_string(),
                        score: (anomaly_score + rng.range(-VOTE_JITTER, VOTE_JITTER))
                            .clamp(0.0, 1.0),
                    })
                    .collect();

                RowOutcome::Scored(RowScore {
                    row_index,
                    anomaly_score,
                    flags,
                    explanations,
                    model_votes,
                })
            })
            .collect();

        Ok(outcomes)
    }
}

fn explain(numeric: &[&str], rng: &mut SeededRng) -> (Vec<String>, Vec<Explanation>) {
    let mut flags = Vec::new();
    let mut explanations = Vec::new();

    if !numeric.is_empty() {
        let column = numeric[rng.below(numeric.len())];
        flags.push(format!("High z-score in {column}"));
        explanations.push(Explanation {
            title: format!("Unusual value in {column}"),
            description: format!(
                "The value for {column} was significantly different from the typical distribution."
            ),
        });
    }

    let outlier = rng.next_f64() < STATISTICAL_OUTLIER_CHANCE;
    let rare = rng.next_f64() < RARE_COMBINATION_CHANCE;

    // An anomalous row always carries at least one explanation.
    if outlier || explanations.is_empty() {
        flags.push("Statistical outlier detected".to_string());
        explanations.push(Explanation {
            title: "Statistical outlier".to_string(),
            description: "The data point was identified as a statistical outlier by multiple models."
                .to_string(),
        });
    }
    if rare {
        flags.push("Rare pattern combination".to_string());
        explanations.push(Explanation {
            title: "Rare feature combination".to_string(),
            description: "A rare combination of feature values was observed for this data point."
                .to_string(),
        });
    }

    (flags, explanations)
}

fn normalized_importance(columns: &[&str], rng: &mut SeededRng) -> BTreeMap<String, f64> {
    let raw: Vec<f64> = columns.iter().map(|_| rng.range(0.1, 0.6)).collect();
    let total: f64 = raw.iter().sum();
    columns
        .iter()
        .zip(raw)
        .map(|(column, weight)| ((*column).to_string(), weight / total))
        .collect()
}

fn training_time_range(model: &str) -> (f64, f64) {
    match model {
        "IsolationForest" => (0.5, 2.5),
        "LightGBM" => (1.0, 4.0),
        "LOF" => (0.3, 1.8),
        _ => (0.1, 0.6),
    }
}

fn reference_params(model: &str) -> BTreeMap<String, Value> {
    let params = match model {
        "IsolationForest" => json!({ "n_estimators": 100, "contamination": 0.05, "random_state": 42 }),
        "LightGBM" => json!({ "num_leaves": 31, "learning_rate": 0.05, "n_estimators": 100 }),
        "LOF" => json!({ "n_neighbors": 20, "contamination": 0.05 }),
        _ => json!({ "n_bins": 10, "alpha": 0.1 }),
    };
    match params {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::SyntheticBackend;
    use crate::analysis::rng::SeededRng;
    use crate::analysis::scoring::backend::{CANONICAL_MODELS, RowOutcome, ScoringBackend};
    use crate::model::{ANOMALY_THRESHOLD, ColumnType, Dataset, Schema, SchemaColumn};

    fn numeric_dataset(rows: usize) -> (Dataset, Schema) {
        let dataset = Dataset::new(
            vec!["amount".to_string(), "fee".to_string(), "merchant".to_string()],
            (0..rows)
                .map(|i| vec![i.to_string(), (i % 7).to_string(), format!("m{}", i % 3)])
                .collect(),
        );
        let column = |name: &str, column_type| SchemaColumn {
            name: name.to_string(),
            column_type,
            null_count: 0,
            unique_count: 0,
            sample_values: Vec::new(),
        };
        let schema = Schema {
            columns: vec![
                column("amount", ColumnType::Numeric),
                column("fee", ColumnType::Numeric),
                column("merchant", ColumnType::Categorical),
            ],
            row_count: rows,
        };
        (dataset, schema)
    }

    fn scored(outcomes: Vec<RowOutcome>) -> Vec<super::RowScore> {
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                RowOutcome::Scored(score) => score,
                RowOutcome::Unscored { row_index, .. } => panic!("row {row_index} unscored"),
            })
            .collect()
    }

    #[test]
    fn five_percent_of_rows_score_above_threshold() {
        let (dataset, schema) = numeric_dataset(100);
        let backend = SyntheticBackend::new(0.05);

        for seed in [1_u64, 2, 3, 42, 1234] {
            let mut rng = SeededRng::new(seed);
            let rows = scored(
                backend
                    .score(&dataset, &schema, 100, &mut rng)
                    .expect("synthetic scoring should succeed"),
            );
            assert_eq!(rows.len(), 100);
            let flagged = rows
                .iter()
                .filter(|row| row.anomaly_score > ANOMALY_THRESHOLD)
                .count();
            assert!((4..=5).contains(&flagged), "seed {seed}: {flagged} flagged");
        }
    }

    #[test]
    fn scores_votes_and_explanations_respect_contract() {
        let (dataset, schema) = numeric_dataset(250);
        let backend = SyntheticBackend::new(0.05);
        let mut rng = SeededRng::new(9);
        let rows = scored(
            backend
                .score(&dataset, &schema, 100, &mut rng)
                .expect("synthetic scoring should succeed"),
        );

        assert_eq!(rows.len(), 100);
        for (expected_index, row) in rows.iter().enumerate() {
            assert_eq!(row.row_index, expected_index);
            assert!((0.0..1.0).contains(&row.anomaly_score));
            assert_eq!(row.model_votes.len(), CANONICAL_MODELS.len());
            for (vote, name) in row.model_votes.iter().zip(CANONICAL_MODELS) {
                assert_eq!(vote.model, name);
                assert!((0.0..=1.0).contains(&vote.score));
                assert!((vote.score - row.anomaly_score).abs() <= 0.1 + 1e-12);
            }

            let high = row.anomaly_score >= 0.7;
            if high {
                assert!((1..=3).contains(&row.explanations.len()));
                assert!(row.explanations[0].title.starts_with("Unusual value in "));
                assert_eq!(row.flags.len(), row.explanations.len());
            } else {
                assert!(row.anomaly_score < 0.4);
                assert!(row.explanations.is_empty());
            }
        }
    }

    #[test]
    fn rows_without_numeric_columns_still_get_an_explanation() {
        let dataset = Dataset::new(
            vec!["name".to_string()],
            (0..20).map(|i| vec![format!("n{i}")]).collect(),
        );
        let schema = Schema {
            columns: Vec::new(),
            row_count: 20,
        };
        let backend = SyntheticBackend::new(1.0);
        let mut rng = SeededRng::new(5);
        let rows = scored(
            backend
                .score(&dataset, &schema, 20, &mut rng)
                .expect("synthetic scoring should succeed"),
        );
        assert!(rows.iter().all(|row| !row.explanations.is_empty()));
    }

    #[test]
    fn feature_importance_sums_to_one_per_model() {
        let (_, schema) = numeric_dataset(10);
        let mut rng = SeededRng::new(77);
        let models = SyntheticBackend::new(0.05)
            .models(&schema, &mut rng)
            .expect("models should build");

        assert_eq!(models.len(), 4);
        for model in &models {
            let total: f64 = model.feature_importance.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "{} sums to {total}", model.name);
            assert_eq!(model.feature_importance.len(), 2);
            assert!(!model.feature_importance.contains_key("merchant"));
            assert!(model.training_time > 0.0);
        }
        assert_eq!(models[0].params["n_estimators"], 100);
    }

    #[test]
    fn same_seed_reproduces_scores() {
        let (dataset, schema) = numeric_dataset(60);
        let backend = SyntheticBackend::new(0.05);
        let first = backend
            .score(&dataset, &schema, 60, &mut SeededRng::new(21))
            .expect("first run");
        let second = backend
            .score(&dataset, &schema, 60, &mut SeededRng::new(21))
            .expect("second run");
        assert_eq!(first, second);
    }
}
