use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use anomaly_scan::config::{
    DEFAULT_CONTAMINATION, DEFAULT_MAX_SCORED_ROWS, DEFAULT_SCORING_TIMEOUT_MS,
};

#[derive(Parser, Debug)]
#[command(
    name = "anomaly-scan",
    version,
    about = "Schema inference and anomaly scoring for CSV datasets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Analyze(AnalyzeArgs),
    Schema(SchemaArgs),
    Quality(QualityArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Synthetic)]
    pub backend: BackendChoice,

    #[arg(long, required_if_eq("backend", "precomputed"))]
    pub scores_path: Option<PathBuf>,

    #[arg(long)]
    pub label_column: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_SCORED_ROWS)]
    pub max_scored_rows: usize,

    #[arg(long, default_value_t = DEFAULT_CONTAMINATION)]
    pub contamination: f64,

    #[arg(long, default_value_t = DEFAULT_SCORING_TIMEOUT_MS)]
    pub scoring_timeout_ms: u64,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackendChoice {
    Synthetic,
    Precomputed,
}

impl BackendChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Precomputed => "precomputed",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct QualityArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
