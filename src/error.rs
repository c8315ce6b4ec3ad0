use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("insufficient data for {operation}: {reason}")]
    InsufficientData {
        operation: &'static str,
        reason: String,
    },

    #[error("scoring backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("scoring backend {backend} exceeded budget of {timeout_ms} ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to compile pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn insufficient(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            operation,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parsing,
    Inferring,
    Preprocessing,
    Scoring,
    Evaluating,
    Aggregating,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Inferring => "inferring",
            Self::Preprocessing => "preprocessing",
            Self::Scoring => "scoring",
            Self::Evaluating => "evaluating",
            Self::Aggregating => "aggregating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: AnalysisError,
}

impl StageError {
    pub fn new(stage: Stage, source: AnalysisError) -> Self {
        Self { stage, source }
    }
}

pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> StageContext<T> for Result<T, AnalysisError> {
    fn stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|source| StageError::new(stage, source))
    }
}
