use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::SchemaSource;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Rendering of the final report on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One verdict line per file plus violation lines
    #[default]
    Human,
    /// Machine-readable report
    Json,
    /// Totals only
    Summary,
}

/// Validate XML documents for well-formedness and against DTD or XSD schemas
#[derive(Parser, Debug, Clone)]
#[command(name = "xvalid")]
#[command(about = "Validate XML documents for well-formedness and against DTD or XSD schemas")]
#[command(version)]
pub struct Cli {
    /// Documents or directories to validate
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Validate against an external DTD (requires --root)
    #[arg(long, value_name = "FILE", requires = "root", conflicts_with = "xsd")]
    pub dtd: Option<PathBuf>,

    /// Expected root element name for DTD validation
    #[arg(long, value_name = "NAME", requires = "dtd")]
    pub root: Option<String>,

    /// Validate against an XML Schema
    #[arg(long, value_name = "FILE")]
    pub xsd: Option<PathBuf>,

    /// File extensions to pick up when walking directories (comma-separated)
    #[arg(short = 'e', long = "extensions", help = "File extensions to process (e.g., 'xml,cmdi')")]
    pub extensions: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print every parse event as it happens
    #[arg(long)]
    pub trace: bool,

    /// Output format
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Configuration file (TOML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum element nesting depth
    #[arg(long = "max-depth", value_name = "N")]
    pub max_depth: Option<usize>,

    /// Ignore xsi:schemaLocation and DOCTYPE hints in documents
    #[arg(long = "no-schema-hints")]
    pub no_schema_hints: bool,

    /// Stop after the first file that fails
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Prefix diagnostics with timestamps
    #[arg(long)]
    pub timestamps: bool,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Extensions given with `-e`, if any
    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// The schema named on the command line, if any
    pub fn schema_source(&self) -> Option<SchemaSource> {
        if let Some(path) = &self.xsd {
            return Some(SchemaSource::Xsd { path: path.clone() });
        }
        match (&self.dtd, &self.root) {
            (Some(path), Some(root)) => Some(SchemaSource::Dtd {
                path: path.clone(),
                root: root.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["xvalid", "a.xml", "docs"]).unwrap();
        assert_eq!(cli.paths, vec![PathBuf::from("a.xml"), PathBuf::from("docs")]);
        assert!(cli.schema_source().is_none());
        assert!(cli.get_extensions().is_none());
        assert!(cli.output_format.is_none());
    }

    #[test]
    fn test_paths_are_required() {
        assert!(Cli::try_parse_from(["xvalid"]).is_err());
    }

    #[test]
    fn test_dtd_requires_root() {
        assert!(Cli::try_parse_from(["xvalid", "--dtd", "a.dtd", "a.xml"]).is_err());
        assert!(Cli::try_parse_from(["xvalid", "--root", "a", "a.xml"]).is_err());

        let cli =
            Cli::try_parse_from(["xvalid", "--dtd", "a.dtd", "--root", "note", "a.xml"]).unwrap();
        assert_eq!(
            cli.schema_source(),
            Some(SchemaSource::Dtd {
                path: PathBuf::from("a.dtd"),
                root: "note".to_string(),
            })
        );
    }

    #[test]
    fn test_dtd_conflicts_with_xsd() {
        let result = Cli::try_parse_from([
            "xvalid", "--dtd", "a.dtd", "--root", "a", "--xsd", "a.xsd", "a.xml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_xsd_source() {
        let cli = Cli::try_parse_from(["xvalid", "--xsd", "s.xsd", "a.xml"]).unwrap();
        assert_eq!(
            cli.schema_source(),
            Some(SchemaSource::Xsd {
                path: PathBuf::from("s.xsd")
            })
        );
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["xvalid", "-v", "-q", "a.xml"]).is_err());
    }

    #[test]
    fn test_extensions_and_format() {
        let cli = Cli::try_parse_from([
            "xvalid",
            "-e",
            "xml, .cmdi,",
            "--format",
            "json",
            "a.xml",
        ])
        .unwrap();
        assert_eq!(
            cli.get_extensions(),
            Some(vec!["xml".to_string(), "cmdi".to_string()])
        );
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(VerbosityLevel::Quiet < VerbosityLevel::Normal);
        assert!(VerbosityLevel::Verbose < VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::default(), VerbosityLevel::Normal);
    }
}
