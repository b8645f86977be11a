//! Rendering of run results for stdout
//!
//! Diagnostics stream to stderr while files are processed (see
//! `error_reporter`); this module renders the final report once the run is
//! over, in one of the [`OutputFormat`]s.

use serde::Serialize;
use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diagnostics::{RunResult, RunSummary, Verdict, overall_exit_status, summarize};

/// Output formatter for the end-of-run report
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a [RunResult],
    summary: RunSummary,
    exit_code: i32,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            format: OutputFormat::Human,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
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

    pub fn format_results(&self, results: &[RunResult]) -> String {
        let summary = RunSummary::aggregate(results);
        match self.format {
            OutputFormat::Json => self.format_json(results, summary),
            OutputFormat::Summary => self.format_summary(&summary),
            OutputFormat::Human => self.format_human(results, &summary),
        }
    }

    fn format_human(&self, results: &[RunResult], summary: &RunSummary) -> String {
        let mut output = String::new();

        for result in results {
            if self.verbosity == VerbosityLevel::Quiet && result.verdict.is_valid() {
                continue;
            }
            output.push_str(&self.format_file_result(result));
            output.push('\n');
        }

        if self.verbosity == VerbosityLevel::Quiet {
            if summary.invalid_files + summary.skipped_files > 0 {
                output.push_str(&format!(
                    "Invalid: {} Skipped: {}\n",
                    summary.invalid_files, summary.skipped_files
                ));
            }
            return output;
        }

        output.push('\n');
        output.push_str(&self.format_summary(summary));
        output
    }

    /// Verdict line for one file, followed by its violations in verbose mode
    pub fn format_file_result(&self, result: &RunResult) -> String {
        let marker = match &result.verdict {
            Verdict::Valid => self.colorize("✓", "32"),
            Verdict::Invalid(_) => self.colorize("✗", "31"),
            Verdict::SkippedNotFound | Verdict::SkippedIoError(_) => self.colorize("-", "36"),
        };
        let mut output = format!("{} {}", marker, summarize(&result.path, &result.verdict));

        if self.verbosity >= VerbosityLevel::Verbose {
            if !result.verdict.is_skipped() {
                output.push_str(&format!(" ({})", format_duration(result.duration)));
            }
            for violation in &result.violations {
                output.push_str(&format!("\n    {}", violation));
            }
        }
        output
    }

    pub fn format_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total files: {}\n", summary.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            summary.valid_files
        ));

        if summary.invalid_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                summary.invalid_files
            ));
        }
        if summary.skipped_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Skipped:", "36"),
                summary.skipped_files
            ));
        }
        if summary.error_count > 0 || summary.warning_count > 0 {
            output.push_str(&format!(
                "  Errors: {} Warnings: {}\n",
                summary.error_count, summary.warning_count
            ));
        }

        output.push_str(&format!("  Success rate: {:.1}%\n", summary.success_rate()));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(summary.total_duration)
        ));

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!(
                "  Average per file: {}\n",
                format_duration(summary.average_duration)
            ));
            output.push_str(&format!("  Schemas used: {}\n", summary.schemas_used.len()));
            for (i, schema) in summary.schemas_used.iter().enumerate() {
                output.push_str(&format!("    {}: {}\n", i + 1, schema.display()));
            }
        }

        output
    }

    fn format_json(&self, results: &[RunResult], summary: RunSummary) -> String {
        let report = JsonReport {
            results,
            summary,
            exit_code: overall_exit_status(results).code(),
        };
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| format!("{{\"error\": {:?}}}", e.to_string()))
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
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
