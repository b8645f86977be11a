//! # xvalid
//!
//! An XML validation engine: a streaming tokenizer and SAX-style event
//! parser that check well-formedness, feeding a validator that checks
//! documents against a compiled DTD or XML Schema. Compiled schemas are
//! cached for the length of a run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod content_model;
pub mod datatypes;
pub mod diagnostics;
pub mod dtd;
pub mod engine;
pub mod entities;
pub mod error;
pub mod error_reporter;
pub mod events;
pub mod file_discovery;
pub mod output;
pub mod parser;
pub mod schema;
pub mod schema_loader;
pub mod tokenizer;
pub mod validator;
pub mod xsd;

pub use cache::{CacheConfig, CacheStats, SchemaCache, SchemaSource};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use diagnostics::{
    ExitStatus, RunResult, RunSummary, Severity, Verdict, Violation, ViolationKind,
    overall_exit_status, summarize,
};
pub use dtd::compile_dtd;
pub use engine::{ProgressCallback, ValidationEngine, ValidationPhase, ValidationProgress};
pub use error::{SchemaCompilationError, ValidationError};
pub use error_reporter::ErrorReporter;
pub use events::{DebugTracer, EventRecorder, ParseEvent, ParseObserver};
pub use file_discovery::FileDiscovery;
pub use output::Output;
pub use parser::{ParseOutcome, ParserConfig, parse_document};
pub use schema::{SchemaKind, SchemaModel};
pub use schema_loader::{SchemaExtractor, SchemaReference, SchemaSourceType};
pub use tokenizer::{Location, Token, TokenKind, tokenize};
pub use validator::{ValidationContext, ValidationMode, Validator, validate};
pub use xsd::compile_xsd;
