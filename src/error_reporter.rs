use crate::cache::CacheStats;
use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::diagnostics::{RunResult, Severity, Verdict, Violation};
use crate::error::ValidationError;
use std::path::Path;

/// Stderr reporter for progress lines and diagnostics, gated by verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    /// Create a new error reporter with specified verbosity
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_options(verbosity: VerbosityLevel, show_timestamps: bool) -> Self {
        Self {
            verbosity,
            show_timestamps,
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    /// "Processing <file>..." before a file is opened
    pub fn report_processing(&self, path: &Path) {
        if self.verbosity >= VerbosityLevel::Normal {
            eprintln!("{}Processing {}...", self.timestamp(), path.display());
        }
    }

    /// Diagnostics for one finished file, in event order
    pub fn report_result(&self, result: &RunResult) {
        match &result.verdict {
            Verdict::SkippedNotFound => {
                eprintln!("{}File {} does not exist", self.timestamp(), result.path.display());
            }
            Verdict::SkippedIoError(message) => {
                eprintln!(
                    "{}{} could not be read: {}",
                    self.timestamp(),
                    result.path.display(),
                    message
                );
            }
            Verdict::Valid | Verdict::Invalid(_) => {
                for violation in &result.violations {
                    self.report_violation(violation);
                }
            }
        }
    }

    /// Quiet mode drops warnings; everything else is always shown
    pub fn report_violation(&self, violation: &Violation) {
        if self.verbosity == VerbosityLevel::Quiet && !violation.is_error() {
            return;
        }
        eprintln!("{}", self.format_violation(violation));
    }

    pub fn format_violation(&self, violation: &Violation) -> String {
        let header = match violation.severity {
            Severity::Warning => "VALIDATION WARNING:",
            Severity::Error | Severity::Fatal => "VALIDATION ERROR:",
        };
        let mut output = format!("{}{}\n{}", self.timestamp(), header, violation);

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!(" ({}, {})", violation.kind, violation.severity));
        }
        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!("\n  at byte offset {}", violation.location.offset));
        }
        output
    }

    /// Non-fatal notices, such as a skipped remote schema hint
    pub fn report_warning(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Normal {
            eprintln!("{}warning: {}", self.timestamp(), message);
        }
    }

    /// Report an error that stops the run
    pub fn report_error(&self, error: &ValidationError) {
        eprintln!("{}", self.format_error(error));
    }

    pub fn format_error(&self, error: &ValidationError) -> String {
        let mut output = format!("{}error: {}", self.timestamp(), error);

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!("\nDebug Info: {:?}", error));
            output.push_str("\nError Chain:");
            let mut current_error: &dyn std::error::Error = error;
            let mut level = 0;
            while let Some(source) = current_error.source() {
                output.push_str(&format!("\n  {}: {}", level + 1, source));
                current_error = source;
                level += 1;
            }
        }

        output
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        let formatted = match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!("Configuration Error: {}\n{}", error, config_help(error))
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    config_help(error)
                )
            }
        };
        eprintln!("{}", formatted);
    }

    /// Schema cache counters, shown in debug mode only
    pub fn report_cache_stats(&self, stats: &CacheStats) {
        if self.verbosity < VerbosityLevel::Debug {
            return;
        }
        eprintln!("Schema cache:");
        eprintln!("  Compilations: {}", stats.compilations);
        eprintln!("  Hits: {}", stats.hits);
        eprintln!("  Misses: {}", stats.misses);
        eprintln!("  Hit rate: {:.1}%", stats.hit_rate());
    }

    fn timestamp(&self) -> String {
        if self.show_timestamps {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Get helpful suggestions for configuration errors
fn config_help(error: &ConfigError) -> String {
    match error {
        ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
        ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
            "Check the configuration file syntax (TOML/JSON format expected)".to_string()
        }
        ConfigError::UnsupportedFormat(ext) => {
            format!("Rename the '.{}' file to .toml or .json", ext)
        }
        ConfigError::Environment(_) => {
            "Fix or unset the XVALID_* environment variable".to_string()
        }
        ConfigError::Validation(_) => {
            "Resolve conflicting configuration values between file, environment, and CLI"
                .to_string()
        }
    }
}
