//! Schema hints found in documents, resolved against real files
use xvalid::cache::SchemaSource;
use xvalid::diagnostics::{Verdict, ViolationKind};
use xvalid::schema_loader::{SchemaExtractor, SchemaSourceType};

use crate::common::test_helpers::{ITEM_DTD, NOTE_XSD, TestFiles, engine_for};

#[test]
fn test_relative_hint_resolves_next_to_the_document() {
    let files = TestFiles::new();
    let document = files.path().join("records").join("note.xml");
    let text = r#"<note xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
      xsi:noNamespaceSchemaLocation="../schemas/note.xsd" id="n1"/>"#;

    let reference = SchemaExtractor::new()
        .first_reference(text, &document)
        .unwrap();

    assert_eq!(reference.location, "../schemas/note.xsd");
    assert_eq!(
        reference.source_type,
        SchemaSourceType::Local(SchemaSource::Xsd {
            path: files.path().join("records").join("../schemas/note.xsd"),
        })
    );
}

#[tokio::test]
async fn test_doctype_hint_validates_against_the_dtd() {
    let files = TestFiles::new();
    files.write("dtd/catalog.dtd", ITEM_DTD);
    let valid = files.write(
        "catalog.xml",
        "<!DOCTYPE catalog SYSTEM \"dtd/catalog.dtd\">\n<catalog><item id=\"a\">x</item></catalog>\n",
    );
    let invalid = files.write(
        "broken.xml",
        "<!DOCTYPE catalog SYSTEM \"dtd/catalog.dtd\">\n<catalog><item>x</item></catalog>\n",
    );

    let engine = engine_for(None);

    let result = engine.validate_file(&valid).await;
    assert_eq!(result.verdict, Verdict::Valid);
    assert_eq!(result.schema, Some(files.path().join("dtd/catalog.dtd")));

    let result = engine.validate_file(&invalid).await;
    assert!(
        result
            .errors()
            .any(|v| v.kind == ViolationKind::MissingRequiredAttribute)
    );
}

#[tokio::test]
async fn test_hint_behind_byte_order_mark() {
    let files = TestFiles::new();
    files.write("note.xsd", NOTE_XSD);
    let document = files.write(
        "note.xml",
        "\u{feff}<note xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:noNamespaceSchemaLocation=\"note.xsd\"><to>Ann</to></note>",
    );

    let result = engine_for(None).validate_file(&document).await;

    assert!(result.verdict.is_invalid());
    assert!(
        result
            .errors()
            .any(|v| v.kind == ViolationKind::MissingRequiredAttribute)
    );
}

#[tokio::test]
async fn test_missing_hinted_schema_is_reported() {
    let files = TestFiles::new();
    let document = files.write(
        "doc.xml",
        "<!DOCTYPE doc SYSTEM \"missing.dtd\"><doc/>",
    );

    let result = engine_for(None).validate_file(&document).await;

    assert!(result.verdict.is_invalid());
    assert_eq!(
        result.violations[0].kind,
        ViolationKind::SchemaCompilationError
    );
    assert!(result.violations[0].message.contains("missing.dtd"));
}

#[tokio::test]
async fn test_commented_out_hint_is_not_followed() {
    let files = TestFiles::new();
    files.write("note.xsd", NOTE_XSD);
    let document = files.write(
        "note.xml",
        "<!-- <note xsi:noNamespaceSchemaLocation=\"note.xsd\"> -->\n<note><to>Ann</to></note>",
    );

    let result = engine_for(None).validate_file(&document).await;

    assert_eq!(result.verdict, Verdict::Valid);
    assert!(result.schema.is_none());
}

#[tokio::test]
async fn test_document_violating_its_internal_subset() {
    let files = TestFiles::new();
    let document = files.write(
        "doc.xml",
        "<?xml version=\"1.0\"?>\n<!DOCTYPE root [\n  <!ELEMENT root (a)>\n  <!ELEMENT a EMPTY>\n]>\n<root><b/></root>\n",
    );

    let result = engine_for(None).validate_file(&document).await;

    assert!(result.verdict.is_invalid());
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].kind, ViolationKind::UndeclaredElement);
    assert_eq!(result.violations[0].location.line, 6);
}
