//! Output and Reporting
//!
//! Renders validation, import and search reports for stdout in the
//! selected [`OutputFormat`].

use std::time::Duration;

use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::error::Result;
use crate::import::{FileImportResult, ImportResults, ImportStatus};
use crate::model::Record;
use crate::validator::{
    FileValidationResult, PerformanceMetrics, ValidationResults, ValidationStatus,
};

/// Formatter for human-readable, summary and JSON reports
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

#[derive(Serialize)]
struct SearchReport<'a> {
    term: &'a str,
    matches: usize,
    records: &'a [Record],
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn to_json(value: &impl Serialize) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    pub fn format_results(&self, results: &ValidationResults) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Self::to_json(results);
        }

        let mut output = String::new();
        match (self.format, self.verbosity) {
            (_, VerbosityLevel::Quiet) => {
                for file_result in results.file_results.iter().filter(|r| !r.status.is_valid()) {
                    output.push_str(&self.format_file_result(file_result));
                    output.push('\n');
                }
            }
            (OutputFormat::Summary, _) => output.push_str(&self.format_summary(results)),
            _ => {
                for file_result in &results.file_results {
                    if self.verbosity >= VerbosityLevel::Verbose || !file_result.status.is_valid() {
                        output.push_str(&self.format_file_result(file_result));
                        output.push('\n');
                    }
                }
                output.push_str(&self.format_summary(results));
            }
        }

        Ok(output)
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        match &result.status {
            ValidationStatus::Valid => {
                format!(
                    "{}  {} ({})",
                    self.colorize("✓ VALID", "32"),
                    path_display,
                    duration_str
                )
            }
            ValidationStatus::Invalid { error_count } => {
                let mut output = format!(
                    "{}  {} ({}) - {} error{}",
                    self.colorize("✗ INVALID", "31"),
                    path_display,
                    duration_str,
                    error_count,
                    if *error_count == 1 { "" } else { "s" }
                );
                if self.verbosity > VerbosityLevel::Quiet {
                    for error_detail in &result.error_details {
                        output.push_str(&format!("\n    {}", error_detail));
                    }
                }
                output
            }
            ValidationStatus::Error { message } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("⚠ ERROR", "33"),
                    path_display,
                    message
                )
            }
            ValidationStatus::Skipped { reason } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("- SKIPPED", "36"),
                    path_display,
                    reason
                )
            }
        }
    }

    fn format_summary(&self, results: &ValidationResults) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total files: {}\n", results.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            results.valid_files
        ));

        if results.invalid_files > 0 {
            output.push_str(&format!(
                "  {} {} ({} violations)\n",
                self.colorize("Invalid:", "31"),
                results.invalid_files,
                results.total_errors
            ));
        }
        if results.error_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "33"),
                results.error_files
            ));
        }
        if results.skipped_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            ));
        }

        output.push_str(&format!("  Success rate: {:.1}%\n", results.success_rate()));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(results.performance_metrics.total_duration)
        ));

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&self.format_performance_metrics(&results.performance_metrics));
        }

        output
    }

    fn format_performance_metrics(&self, metrics: &PerformanceMetrics) -> String {
        let mut output = String::new();
        output.push_str("\nPerformance Metrics:\n");
        output.push_str(&format!(
            "  Discovery: {}\n",
            format_duration(metrics.discovery_duration)
        ));
        output.push_str(&format!(
            "  Validation: {}\n",
            format_duration(metrics.validation_duration)
        ));
        output.push_str(&format!(
            "  Throughput: {:.1} files/sec\n",
            metrics.throughput_files_per_second
        ));
        output.push_str(&format!(
            "  Concurrent validations: {}\n",
            metrics.concurrent_validations
        ));
        output
    }

    pub fn format_import(&self, results: &ImportResults) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Self::to_json(results);
        }

        let mut output = String::new();
        if self.format == OutputFormat::Human {
            for file_result in &results.file_results {
                let imported = matches!(file_result.status, ImportStatus::Imported { .. });
                if !imported || self.verbosity >= VerbosityLevel::Verbose {
                    output.push_str(&self.format_import_result(file_result));
                    output.push('\n');
                }
            }
        }

        if self.verbosity > VerbosityLevel::Quiet {
            output.push_str(&format!(
                "Import Summary: {} imported, {} rejected, {} skipped, {} failed\n",
                results.imported, results.rejected, results.skipped, results.failed
            ));
        }
        Ok(output)
    }

    fn format_import_result(&self, result: &FileImportResult) -> String {
        let path_display = result.path.display();
        match &result.status {
            ImportStatus::Imported { id } => format!(
                "{}  {} (id {})",
                self.colorize("✓ IMPORTED", "32"),
                path_display,
                id
            ),
            ImportStatus::Rejected { errors } => {
                let mut output = format!("{}  {}", self.colorize("✗ REJECTED", "31"), path_display);
                for error in errors {
                    output.push_str(&format!("\n    {}", error));
                }
                output
            }
            ImportStatus::Skipped => {
                format!("{}  {}", self.colorize("- SKIPPED", "36"), path_display)
            }
            ImportStatus::Failed { message } => format!(
                "{}  {} - {}",
                self.colorize("⚠ ERROR", "33"),
                path_display,
                message
            ),
        }
    }

    pub fn format_search(&self, term: &str, records: &[Record]) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Self::to_json(&SearchReport {
                term,
                matches: records.len(),
                records,
            });
        }

        let mut output = String::new();
        if self.format == OutputFormat::Human {
            for record in records {
                output.push_str(&format!(
                    "{}  {} by {}\n",
                    self.colorize(&format!("#{}", record.id), "36"),
                    record.title,
                    record.author
                ));
                if self.verbosity >= VerbosityLevel::Verbose && !record.url.is_empty() {
                    output.push_str(&format!("    {}\n", record.url));
                }
            }
        }
        if self.verbosity > VerbosityLevel::Quiet {
            output.push_str(&format!(
                "{} match{} for \"{}\"\n",
                records.len(),
                if records.len() == 1 { "" } else { "es" },
                term
            ));
        }
        Ok(output)
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    fn create_test_results() -> ValidationResults {
        ValidationResults::aggregate(vec![
            FileValidationResult::valid("ok.xml".into(), Grammar::Schema, Duration::from_millis(5)),
            FileValidationResult::invalid(
                "bad.xml".into(),
                Grammar::Both,
                Duration::from_millis(5),
                vec!["Error: first".to_string(), "pattern: second".to_string()],
            ),
        ])
    }

    fn plain(verbosity: VerbosityLevel, format: OutputFormat) -> Output {
        Output::new(verbosity, format).with_colors(false)
    }

    #[test]
    fn test_human_output_lists_every_violation() {
        let formatted = plain(VerbosityLevel::Normal, OutputFormat::Human)
            .format_results(&create_test_results())
            .unwrap();

        assert!(formatted.contains("✗ INVALID  bad.xml"));
        assert!(formatted.contains("\n    Error: first"));
        assert!(formatted.contains("\n    pattern: second"));
        assert!(!formatted.contains("ok.xml"));
        assert!(formatted.contains("Validation Summary:"));
        assert!(formatted.contains("(2 violations)"));
    }

    #[test]
    fn test_summary_format_omits_file_lines() {
        let formatted = plain(VerbosityLevel::Normal, OutputFormat::Summary)
            .format_results(&create_test_results())
            .unwrap();
        assert!(formatted.starts_with("Validation Summary:"));
        assert!(!formatted.contains("bad.xml"));
    }

    #[test]
    fn test_json_output() {
        let formatted = plain(VerbosityLevel::Normal, OutputFormat::Json)
            .format_results(&create_test_results())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(value["total_files"], 2);
        assert_eq!(value["file_results"][1]["status"], "invalid");
        assert_eq!(value["file_results"][1]["error_count"], 2);
        assert_eq!(value["file_results"][1]["grammar"], "both");
    }

    #[test]
    fn test_quiet_shows_only_failures() {
        let formatted = plain(VerbosityLevel::Quiet, OutputFormat::Human)
            .format_results(&create_test_results())
            .unwrap();
        assert!(formatted.contains("bad.xml"));
        assert!(!formatted.contains("Validation Summary:"));
    }

    #[test]
    fn test_import_report() {
        let results = ImportResults::aggregate(vec![
            FileImportResult {
                path: "a.xml".into(),
                status: ImportStatus::Imported { id: 1 },
            },
            FileImportResult {
                path: "b.xml".into(),
                status: ImportStatus::Rejected {
                    errors: vec!["Item with ID 1 already exists.".to_string()],
                },
            },
        ]);

        let formatted = plain(VerbosityLevel::Normal, OutputFormat::Human)
            .format_import(&results)
            .unwrap();
        assert!(formatted.contains("✗ REJECTED  b.xml\n    Item with ID 1 already exists."));
        assert!(formatted.contains("1 imported, 1 rejected"));
    }

    #[test]
    fn test_search_report() {
        let records = vec![Record {
            id: 3,
            title: "Paris at night".to_string(),
            author: "Ana".to_string(),
            ..Record::default()
        }];

        let human = plain(VerbosityLevel::Normal, OutputFormat::Human)
            .format_search("paris", &records)
            .unwrap();
        assert!(human.contains("#3  Paris at night by Ana"));
        assert!(human.contains("1 match for \"paris\""));

        let json = plain(VerbosityLevel::Normal, OutputFormat::Json)
            .format_search("paris", &records)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["matches"], 1);
        assert_eq!(value["records"][0]["id"], 3);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30.0s");
    }
}
