pub mod analysis;
pub mod config;
pub mod error;
pub mod model;

pub use analysis::{analyze, analyze_text};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Stage, StageError};
pub use model::AnalysisResult;
