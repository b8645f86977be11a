use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use xvalid::cache::{SchemaCache, SchemaSource};
use xvalid::config::ValidationConfig;
use xvalid::engine::ValidationEngine;

/// DTD for a `(a,b)` sequence under `root`
pub const SEQUENCE_DTD: &str = r#"<!ELEMENT root (a,b)>
<!ELEMENT a EMPTY>
<!ELEMENT b EMPTY>
"#;

/// DTD with a required ID attribute on `item`
pub const ITEM_DTD: &str = r#"<!ELEMENT catalog (item*)>
<!ELEMENT item (#PCDATA)>
<!ATTLIST item id ID #REQUIRED>
"#;

pub const NOTE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="to" type="xs:string"/>
        <xs:element name="priority" type="xs:positiveInteger" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:ID" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

/// A temporary directory holding documents and schemas for one test
pub struct TestFiles {
    dir: TempDir,
}

impl TestFiles {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `content` to `name` (parent directories included)
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture dir");
        }
        std::fs::write(&path, content).expect("failed to write fixture");
        path
    }

    pub fn dtd(&self, name: &str, content: &str, root: &str) -> SchemaSource {
        SchemaSource::Dtd {
            path: self.write(name, content),
            root: root.to_string(),
        }
    }

    pub fn xsd(&self, name: &str, content: &str) -> SchemaSource {
        SchemaSource::Xsd {
            path: self.write(name, content),
        }
    }
}

impl Default for TestFiles {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine with default settings and a fresh cache
pub fn engine_for(schema: Option<SchemaSource>) -> ValidationEngine {
    ValidationEngine::new(
        Arc::new(SchemaCache::default()),
        schema,
        ValidationConfig::default(),
    )
}
