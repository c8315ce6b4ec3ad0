use crate::model::{ColumnType, PreprocessAction, PreprocessingStep, Schema, SchemaColumn};

pub fn plan_preprocessing(schema: &Schema) -> Vec<PreprocessingStep> {
    schema.columns.iter().flat_map(steps_for_column).collect()
}

fn steps_for_column(column: &SchemaColumn) -> Vec<PreprocessingStep> {
    let step = |action: PreprocessAction, details: String| PreprocessingStep {
        column: column.name.clone(),
        action,
        details,
    };

    match column.column_type {
        ColumnType::Numeric => {
            let mut steps = vec![step(
                PreprocessAction::Normalize,
                "Applied RobustScaler normalization".to_string(),
            )];
            if column.null_count > 0 {
                steps.push(step(
                    PreprocessAction::Impute,
                    format!("Median imputation for {} missing values", column.null_count),
                ));
            }
            steps
        }
        ColumnType::Categorical => vec![step(
            PreprocessAction::Encode,
            format!("Frequency encoding ({} categories)", column.unique_count),
        )],
        ColumnType::Datetime => vec![step(
            PreprocessAction::Extract,
            "Extracted: timestamp, hour, weekday, month features".to_string(),
        )],
        ColumnType::Boolean | ColumnType::Id | ColumnType::Text | ColumnType::Geo => Vec::new(),
    }
}
