pub mod aggregation;
pub mod csv_parser;
pub mod evaluation;
pub mod preprocessing;
pub mod quality;
pub mod rng;
pub mod schema_inference;
pub mod scoring;

mod run;

pub use run::{
    PipelineRun, StageTiming, analyze, analyze_text, run_pipeline, run_with_backend,
};

#[cfg(test)]
mod tests;
