//! Output format module implementation

mod json;
mod csv;

use crate::report::Report;
use crate::AnalysisError;
use std::fmt;
use std::str::FromStr;
use clap::ValueEnum;

/// Supported output formats for frequency reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `<count> x <instructions>` lines (default)
    #[default]
    Text,
    /// JSON array of entries
    Json,
    /// JSON Lines format (one JSON object per line)
    #[value(name = "jsonl")]
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn ReportFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for frequency reports
pub trait ReportFormatter {
    /// Format a report
    fn format(&self, report: &Report) -> Result<String, AnalysisError>;
}

/// Format reports as plain text
pub struct TextFormatter;

/// Format reports as JSON
pub struct JsonFormatter;

/// Format reports as JSON Lines
pub struct JsonLinesFormatter;

/// Format reports as CSV
pub struct CsvFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &Report) -> Result<String, AnalysisError> {
        let mut output = String::new();
        for entry in &report.entries {
            output.push_str(&entry.to_string());
            output.push('\n');
        }
        Ok(output)
    }
}
