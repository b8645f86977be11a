use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema compilation failed: {0}")]
    SchemaCompilation(#[from] SchemaCompilationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },
}

/// Failures while turning a DTD or XSD source into a `SchemaModel`.
///
/// The error is `Clone` because the schema cache memoizes failures alongside
/// successful compilations and hands the same value to every affected file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaCompilationError {
    #[error("cannot read schema {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("malformed schema at {line}:{column}: {message}")]
    Malformed {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("element '{name}' is declared more than once")]
    DuplicateElement { name: String },

    #[error("element '{name}' is referenced by '{parent}' but never declared")]
    UndeclaredElement { name: String, parent: String },

    #[error("entity '{name}' is referenced but never declared")]
    UndeclaredEntity { name: String },

    #[error("notation '{name}' is referenced but never declared")]
    UndeclaredNotation { name: String },

    #[error("root element '{root}' is not declared in the DTD")]
    MissingRoot { root: String },

    #[error("type '{name}' is referenced but never defined")]
    UndefinedType { name: String },

    #[error("unsupported schema construct: {construct}")]
    Unsupported { construct: String },

    #[error("invalid value in schema: {details}")]
    InvalidValue { details: String },

    #[error("document is not an XML Schema: {details}")]
    NotASchema { details: String },
}

impl SchemaCompilationError {
    pub(crate) fn malformed(line: u32, column: u32, message: impl Into<String>) -> Self {
        SchemaCompilationError::Malformed {
            line,
            column,
            message: message.into(),
        }
    }
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Schema compilation result type alias
pub type CompileResult<T> = std::result::Result<T, SchemaCompilationError>;
