//! File-level validation through the engine
use std::sync::Arc;

use xvalid::cache::SchemaCache;
use xvalid::config::ValidationConfig;
use xvalid::diagnostics::{
    ExitStatus, RunResult, Severity, Verdict, ViolationKind, overall_exit_status,
};
use xvalid::engine::ValidationEngine;

use crate::common::test_helpers::{NOTE_XSD, SEQUENCE_DTD, TestFiles, engine_for};

const ITEM_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="item">
    <xs:complexType>
      <xs:attribute name="id" type="xs:string" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn kinds(result: &RunResult) -> Vec<ViolationKind> {
    result.violations.iter().map(|v| v.kind).collect()
}

#[tokio::test]
async fn test_sequence_content_model() {
    let files = TestFiles::new();
    let engine = engine_for(Some(files.dtd("seq.dtd", SEQUENCE_DTD, "root")));

    let clean = engine
        .validate_file(&files.write("clean.xml", "<root><a/><b/></root>"))
        .await;
    assert_eq!(clean.verdict, Verdict::Valid);
    assert!(clean.violations.is_empty());

    let swapped = engine
        .validate_file(&files.write("swapped.xml", "<root><b/><a/></root>"))
        .await;
    assert_eq!(kinds(&swapped), vec![ViolationKind::ContentModelMismatch]);

    let short = engine
        .validate_file(&files.write("short.xml", "<root><a/></root>"))
        .await;
    assert_eq!(kinds(&short), vec![ViolationKind::ContentModelMismatch]);
    assert_eq!(short.violations[0].location.column, 11);
}

#[tokio::test]
async fn test_required_attribute_on_item() {
    let files = TestFiles::new();
    let engine = engine_for(Some(files.xsd("item.xsd", ITEM_XSD)));

    let bare = engine
        .validate_file(&files.write("bare.xml", "<item/>"))
        .await;
    assert_eq!(kinds(&bare), vec![ViolationKind::MissingRequiredAttribute]);

    let foreign = engine
        .validate_file(&files.write("foreign.xml", r#"<item foo="x"/>"#))
        .await;
    assert_eq!(
        kinds(&foreign),
        vec![
            ViolationKind::UndeclaredAttribute,
            ViolationKind::MissingRequiredAttribute
        ]
    );
}

#[tokio::test]
async fn test_unknown_child_makes_the_file_invalid() {
    let files = TestFiles::new();
    let engine = engine_for(Some(files.dtd(
        "ra.dtd",
        "<!ELEMENT root (a)*>\n<!ELEMENT a EMPTY>\n",
        "root",
    )));

    let result = engine
        .validate_file(&files.write("doc.xml", "<root><a/><b/></root>"))
        .await;

    assert_eq!(kinds(&result), vec![ViolationKind::UndeclaredElement]);
    assert!(result.verdict.is_invalid());
    assert_eq!(
        overall_exit_status(std::slice::from_ref(&result)),
        ExitStatus::ValidationError
    );
}

#[tokio::test]
async fn test_missing_file_does_not_disturb_the_rest() {
    let files = TestFiles::new();
    let engine = engine_for(Some(files.dtd("seq.dtd", SEQUENCE_DTD, "root")));
    let inputs = vec![
        files.write("one.xml", "<root><a/><b/></root>"),
        files.path().join("nowhere.xml"),
        files.write("two.xml", "<root><a/><b/></root>"),
    ];

    let results = engine.validate_files(&inputs).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].verdict, Verdict::Valid);
    assert_eq!(results[1].verdict, Verdict::SkippedNotFound);
    assert_eq!(results[2].verdict, Verdict::Valid);
    assert_eq!(overall_exit_status(&results), ExitStatus::IoError);
}

#[tokio::test]
async fn test_warm_and_cold_cache_agree() {
    let files = TestFiles::new();
    let schema = files.xsd("note.xsd", NOTE_XSD);
    let document = files.write("note.xml", r#"<note><to>Ann</to><priority>x</priority></note>"#);

    let cache = Arc::new(SchemaCache::default());
    let engine = ValidationEngine::new(
        Arc::clone(&cache),
        Some(schema.clone()),
        ValidationConfig::default(),
    );

    let cold = engine.validate_file(&document).await;
    let warm = engine.validate_file(&document).await;
    let fresh = engine_for(Some(schema)).validate_file(&document).await;

    assert_eq!(cache.compilation_count(), 1);
    assert_eq!(cold, warm);
    assert_eq!(cold, fresh);
    assert!(cold.verdict.is_invalid());
}

#[tokio::test]
async fn test_malformed_and_duplicate_attributes() {
    let files = TestFiles::new();
    let engine = engine_for(None);

    let duplicate = engine
        .validate_file(&files.write("dup.xml", r#"<a x="1" x="2"><b/></a>"#))
        .await;
    assert_eq!(kinds(&duplicate), vec![ViolationKind::WellFormednessError]);
    assert_eq!(duplicate.violations[0].severity, Severity::Error);

    let mismatched = engine
        .validate_file(&files.write("bad.xml", "<a><b></a>"))
        .await;
    assert_eq!(mismatched.violations.last().unwrap().severity, Severity::Fatal);
    assert_eq!(
        overall_exit_status(&[duplicate, mismatched]),
        ExitStatus::ParseError
    );
}
