//! Error types and their conversions
use std::path::PathBuf;

use xvalid::config::ConfigError;
use xvalid::error::{SchemaCompilationError, ValidationError};

#[test]
fn test_schema_errors_are_comparable_and_clonable() {
    let err = SchemaCompilationError::DuplicateElement {
        name: "item".to_string(),
    };
    assert_eq!(err.clone(), err);
    assert_eq!(err.to_string(), "element 'item' is declared more than once");
}

#[test]
fn test_conversions_into_validation_error() {
    let err: ValidationError = SchemaCompilationError::MissingRoot {
        root: "catalog".to_string(),
    }
    .into();
    assert!(err.to_string().starts_with("Schema compilation failed"));

    let err: ValidationError = ConfigError::UnsupportedFormat("ini".to_string()).into();
    assert!(matches!(err, ValidationError::Config(ref message) if message.contains("ini")));

    let err: ValidationError = std::io::Error::other("disk gone").into();
    assert!(matches!(err, ValidationError::Io(_)));
}

#[test]
fn test_traversal_error_names_the_path() {
    let err = ValidationError::FileSystemTraversal {
        path: PathBuf::from("/data/xml"),
        reason: "permission denied".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("/data/xml"));
    assert!(message.contains("permission denied"));
}
