//! Structured validation records
//!
//! Everything the validator finds is a [`Violation`]; each input file ends
//! with a [`RunResult`] whose [`Verdict`] decides the process [`ExitStatus`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tokenizer::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    WellFormednessError,
    UndeclaredElement,
    UndeclaredAttribute,
    ContentModelMismatch,
    AttributeTypeMismatch,
    MissingRequiredAttribute,
    SchemaCompilationError,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::WellFormednessError => "well-formedness error",
            ViolationKind::UndeclaredElement => "undeclared element",
            ViolationKind::UndeclaredAttribute => "undeclared attribute",
            ViolationKind::ContentModelMismatch => "content model mismatch",
            ViolationKind::AttributeTypeMismatch => "attribute type mismatch",
            ViolationKind::MissingRequiredAttribute => "missing required attribute",
            ViolationKind::SchemaCompilationError => "schema compilation error",
        };
        f.write_str(name)
    }
}

/// A single diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            location,
            message: message.into(),
        }
    }

    /// An `Error`-severity violation
    pub fn error(kind: ViolationKind, location: Location, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, location, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    pub fn is_fatal_well_formedness(&self) -> bool {
        self.kind == ViolationKind::WellFormednessError && self.severity == Severity::Fatal
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.location, self.message)
    }
}

/// Outcome of one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Valid,
    /// The Error and Fatal violations that decided the verdict
    Invalid(Vec<Violation>),
    SkippedNotFound,
    SkippedIoError(String),
}

impl Verdict {
    /// Verdict for a file whose processing produced `violations`
    pub fn from_violations(violations: &[Violation]) -> Self {
        let errors: Vec<Violation> = violations.iter().filter(|v| v.is_error()).cloned().collect();
        if errors.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Verdict::Invalid(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Verdict::SkippedNotFound | Verdict::SkippedIoError(_))
    }
}

/// Result of processing a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub path: PathBuf,
    pub verdict: Verdict,
    /// Every violation in event order, warnings included
    pub violations: Vec<Violation>,
    /// Schema the file was validated against, if any
    pub schema: Option<PathBuf>,
    pub duration: Duration,
}

/// Results compare by content; `duration` is timing, not content.
impl PartialEq for RunResult {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.verdict == other.verdict
            && self.violations == other.violations
            && self.schema == other.schema
    }
}

impl RunResult {
    pub fn checked(
        path: PathBuf,
        violations: Vec<Violation>,
        schema: Option<PathBuf>,
        duration: Duration,
    ) -> Self {
        Self {
            verdict: Verdict::from_violations(&violations),
            path,
            violations,
            schema,
            duration,
        }
    }

    pub fn not_found(path: PathBuf) -> Self {
        Self {
            path,
            verdict: Verdict::SkippedNotFound,
            violations: Vec::new(),
            schema: None,
            duration: Duration::ZERO,
        }
    }

    pub fn io_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            verdict: Verdict::SkippedIoError(message.into()),
            violations: Vec::new(),
            schema: None,
            duration: Duration::ZERO,
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }
}

/// Process exit status; failure codes rank skipped files, then malformed input, then schema violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    CommandError,
    IoError,
    ParseError,
    ValidationError,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::CommandError => 1,
            ExitStatus::IoError => 2,
            ExitStatus::ParseError => 3,
            ExitStatus::ValidationError => 4,
        }
    }
}

/// Success iff every file is valid; otherwise skipped files outrank
/// malformed ones, which outrank schema violations.
pub fn overall_exit_status(results: &[RunResult]) -> ExitStatus {
    if results.iter().all(|r| r.verdict.is_valid()) {
        ExitStatus::Success
    } else if results.iter().any(|r| r.verdict.is_skipped()) {
        ExitStatus::IoError
    } else if results
        .iter()
        .any(|r| r.violations.iter().any(Violation::is_fatal_well_formedness))
    {
        ExitStatus::ParseError
    } else {
        ExitStatus::ValidationError
    }
}

/// One-line verdict for a file
pub fn summarize(file: &Path, verdict: &Verdict) -> String {
    match verdict {
        Verdict::Valid => format!("{} validates", file.display()),
        Verdict::Invalid(errors) => format!(
            "{} fails to validate ({} error{})",
            file.display(),
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ),
        Verdict::SkippedNotFound => format!("File {} does not exist", file.display()),
        Verdict::SkippedIoError(message) => {
            format!("{} could not be read: {}", file.display(), message)
        }
    }
}

/// Aggregated counts over a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub skipped_files: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub schemas_used: Vec<PathBuf>,
}

impl RunSummary {
    pub fn aggregate(results: &[RunResult]) -> Self {
        let mut summary = RunSummary {
            total_files: results.len(),
            ..RunSummary::default()
        };

        for result in results {
            match result.verdict {
                Verdict::Valid => summary.valid_files += 1,
                Verdict::Invalid(_) => summary.invalid_files += 1,
                Verdict::SkippedNotFound | Verdict::SkippedIoError(_) => summary.skipped_files += 1,
            }
            summary.error_count += result.errors().count();
            summary.warning_count += result.warnings().count();
            summary.total_duration += result.duration;
            if let Some(schema) = &result.schema {
                if !summary.schemas_used.contains(schema) {
                    summary.schemas_used.push(schema.clone());
                }
            }
        }

        if summary.total_files > 0 {
            summary.average_duration = summary.total_duration / summary.total_files as u32;
        }
        summary
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        (self.valid_files as f64 / self.total_files as f64) * 100.0
    }
}
