//! JSON and JSON Lines output formatters

use crate::report::{Report, ReportRecord};
use crate::AnalysisError;
use super::ReportFormatter;

impl ReportFormatter for super::JsonFormatter {
    fn format(&self, report: &Report) -> Result<String, AnalysisError> {
        let records: Vec<ReportRecord> = report.entries.iter().map(ReportRecord::from).collect();

        serde_json::to_string_pretty(&records)
            .map_err(|e| AnalysisError::Format(format!("JSON serialization error: {}", e)))
    }
}

impl ReportFormatter for super::JsonLinesFormatter {
    fn format(&self, report: &Report) -> Result<String, AnalysisError> {
        let mut output = String::new();

        for entry in &report.entries {
            let record = ReportRecord::from(entry);
            output.push_str(&serde_json::to_string(&record)
                .map_err(|e| AnalysisError::Format(format!("JSON serialization error: {}", e)))?);
            output.push('\n');
        }

        Ok(output)
    }
}
