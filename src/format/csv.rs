//! CSV output formatter

use crate::report::Report;
use crate::AnalysisError;
use super::ReportFormatter;

impl ReportFormatter for super::CsvFormatter {
    fn format(&self, report: &Report) -> Result<String, AnalysisError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer
            .write_record(["count", "offset", "length", "sequence"])
            .map_err(csv_error)?;
        for entry in &report.entries {
            writer
                .write_record([
                    entry.count.to_string(),
                    entry.offset.to_string(),
                    entry.length.to_string(),
                    entry.sequence(),
                ])
                .map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::Format(format!("CSV write error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AnalysisError::Format(format!("CSV encoding error: {}", e)))
    }
}

fn csv_error(e: csv::Error) -> AnalysisError {
    AnalysisError::Format(format!("CSV write error: {}", e))
}
