//! CLI enum types for the resize command.

use clap::ValueEnum;
use sluice_core::OutputFormat as CoreOutputFormat;

/// Report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportFormat {
    /// Single JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl From<ReportFormat> for CoreOutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Json => CoreOutputFormat::Json,
            ReportFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}
