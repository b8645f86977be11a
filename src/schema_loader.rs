//! Schema references embedded in documents
//!
//! When no schema is named on the command line a document may still point at
//! one: `xsi:noNamespaceSchemaLocation`, `xsi:schemaLocation`, or a DOCTYPE
//! with an external identifier. Only the prolog and the root start tag are
//! scanned.

use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::cache::SchemaSource;

static SCHEMA_LOCATION_REGEX: OnceLock<Regex> = OnceLock::new();
static NO_NAMESPACE_REGEX: OnceLock<Regex> = OnceLock::new();
static DOCTYPE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_schema_location_regex() -> &'static Regex {
    SCHEMA_LOCATION_REGEX.get_or_init(|| {
        Regex::new(r#"\s[\w.-]+:schemaLocation\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Failed to compile schemaLocation regex")
    })
}

fn get_no_namespace_regex() -> &'static Regex {
    NO_NAMESPACE_REGEX.get_or_init(|| {
        Regex::new(r#"\s[\w.-]+:noNamespaceSchemaLocation\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Failed to compile noNamespaceSchemaLocation regex")
    })
}

fn get_doctype_regex() -> &'static Regex {
    DOCTYPE_REGEX.get_or_init(|| {
        Regex::new(
            r#"<!DOCTYPE\s+([^\s>\[]+)(?:\s+(?:SYSTEM\s*(?:"([^"]*)"|'([^']*)')|PUBLIC\s*(?:"[^"]*"|'[^']*')\s*(?:"([^"]*)"|'([^']*)')))?"#,
        )
        .expect("Failed to compile DOCTYPE regex")
    })
}

/// A schema location found in a document
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaReference {
    /// The location exactly as written in the document
    pub location: String,
    pub source_type: SchemaSourceType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSourceType {
    Local(SchemaSource),
    /// Not fetched: there is no network access
    Remote(String),
}

/// A document's `<!DOCTYPE>` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentType {
    /// Declared root element name
    pub name: String,
    /// External subset named by a SYSTEM or PUBLIC identifier
    pub external: Option<SchemaReference>,
    /// Text between the declaration's `[` and `]`
    pub internal_subset: Option<String>,
}

impl DocumentType {
    /// Whether the internal subset declares elements or attributes, making
    /// the document carry a schema of its own
    pub fn declares_markup(&self) -> bool {
        self.internal_subset.as_deref().is_some_and(|subset| {
            let subset = without_comments(subset);
            subset.contains("<!ELEMENT") || subset.contains("<!ATTLIST")
        })
    }
}

/// Finds schema references in document prologs
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaExtractor;

impl SchemaExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Every reference in the prolog, XSD hints before the DOCTYPE
    pub fn extract_schema_references(
        &self,
        document: &str,
        document_path: &Path,
    ) -> Vec<SchemaReference> {
        let prolog = prolog(document);
        let mut references = root_tag_references(prolog.root_tag, document_path);
        if let Some(external) = prolog
            .doctype
            .and_then(|declaration| parse_document_type(declaration, document_path))
            .and_then(|doctype| doctype.external)
        {
            references.push(external);
        }
        references
    }

    /// `xsi:noNamespaceSchemaLocation` and `xsi:schemaLocation` hints on the
    /// root element, in that order
    pub fn xsd_references(&self, document: &str, document_path: &Path) -> Vec<SchemaReference> {
        root_tag_references(prolog(document).root_tag, document_path)
    }

    /// The DOCTYPE declaration before the root element, if any
    pub fn document_type(&self, document: &str, document_path: &Path) -> Option<DocumentType> {
        prolog(document)
            .doctype
            .and_then(|declaration| parse_document_type(declaration, document_path))
    }

    /// The highest-precedence external hint
    pub fn first_reference(&self, document: &str, document_path: &Path) -> Option<SchemaReference> {
        self.extract_schema_references(document, document_path)
            .into_iter()
            .next()
    }
}

fn root_tag_references(root_tag: &str, document_path: &Path) -> Vec<SchemaReference> {
    let mut references = Vec::new();

    if let Some(caps) = get_no_namespace_regex().captures(root_tag)
        && let Some(location) = first_group(&caps, &[1, 2])
    {
        references.push(xsd_reference(location.trim(), document_path));
    }

    if let Some(caps) = get_schema_location_regex().captures(root_tag)
        && let Some(pairs) = first_group(&caps, &[1, 2])
    {
        // Namespace/location pairs; the location is the second token
        let tokens: Vec<&str> = pairs.split_whitespace().collect();
        for pair in tokens.chunks(2) {
            if let [_, location] = pair {
                references.push(xsd_reference(location, document_path));
            }
        }
    }

    references
}

fn xsd_reference(location: &str, document_path: &Path) -> SchemaReference {
    let source_type = match resolve_location(location, document_path) {
        Ok(path) => SchemaSourceType::Local(SchemaSource::Xsd { path }),
        Err(url) => SchemaSourceType::Remote(url),
    };
    SchemaReference {
        location: location.to_string(),
        source_type,
    }
}

fn parse_document_type(declaration: &str, document_path: &Path) -> Option<DocumentType> {
    let caps = get_doctype_regex().captures(declaration)?;
    let name = caps[1].to_string();
    let external = first_group(&caps, &[2, 3, 4, 5]).map(|system_id| {
        let source_type = match resolve_location(system_id, document_path) {
            Ok(path) => SchemaSourceType::Local(SchemaSource::Dtd {
                path,
                root: name.clone(),
            }),
            Err(url) => SchemaSourceType::Remote(url),
        };
        SchemaReference {
            location: system_id.to_string(),
            source_type,
        }
    });

    Some(DocumentType {
        name,
        external,
        internal_subset: internal_subset(declaration).map(str::to_string),
    })
}

fn first_group<'h>(caps: &regex::Captures<'h>, groups: &[usize]) -> Option<&'h str> {
    groups
        .iter()
        .find_map(|&i| caps.get(i))
        .map(|m| m.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Local path for `location` relative to the document, or the URL back when
/// it names a remote resource
fn resolve_location(location: &str, document_path: &Path) -> Result<PathBuf, String> {
    if let Some(path) = location.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if location.contains("://") {
        return Err(location.to_string());
    }
    let path = Path::new(location);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(document_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(path))
    }
}

/// Markup that may carry schema hints. Comments and processing
/// instructions before the root element are skipped.
#[derive(Debug, Default, PartialEq)]
struct Prolog<'a> {
    /// The whole `<!DOCTYPE ...>` declaration
    doctype: Option<&'a str>,
    /// The root element's start tag; empty when there is none
    root_tag: &'a str,
}

fn prolog(document: &str) -> Prolog<'_> {
    let mut prolog = Prolog::default();
    let mut i = 0;

    while let Some(offset) = document[i..].find('<') {
        i += offset;
        let rest = &document[i..];
        if rest.starts_with("<?") {
            i += rest.find("?>").map_or(rest.len(), |end| end + 2);
        } else if rest.starts_with("<!--") {
            i += rest.find("-->").map_or(rest.len(), |end| end + 3);
        } else if rest.starts_with("<!") {
            let end = declaration_end(rest);
            if rest.starts_with("<!DOCTYPE") && prolog.doctype.is_none() {
                prolog.doctype = Some(&rest[..end]);
            }
            i += end;
        } else {
            prolog.root_tag = &rest[..tag_end(rest)];
            break;
        }
    }
    prolog
}

/// Length of a `<!DOCTYPE ...>` including any internal subset
fn declaration_end(rest: &str) -> usize {
    let mut depth = 0usize;
    let mut quote = None;
    let mut i = 0;

    while let Some(c) = rest[i..].chars().next() {
        if quote.is_none() && depth > 0 && rest[i..].starts_with("<!--") {
            i += rest[i..].find("-->").map_or(rest.len() - i, |end| end + 3);
            continue;
        }
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '>') if depth == 0 => return i + 1,
            _ => {}
        }
        i += c.len_utf8();
    }
    rest.len()
}

/// Text between a DOCTYPE declaration's `[` and its closing `]`
fn internal_subset(declaration: &str) -> Option<&str> {
    let mut quote = None;
    let open = declaration.char_indices().find_map(|(i, c)| {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => return Some(i),
            _ => {}
        }
        None
    })?;
    let close = declaration.rfind(']')?;
    (close > open).then(|| &declaration[open + 1..close])
}

fn without_comments(text: &str) -> Cow<'_, str> {
    if !text.contains("<!--") {
        return Cow::Borrowed(text);
    }
    let mut kept = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        kept.push_str(&rest[..start]);
        rest = rest[start..]
            .find("-->")
            .map_or("", move |end| &rest[start + end + 3..]);
    }
    kept.push_str(rest);
    Cow::Owned(kept)
}

/// Length of a start tag, skipping `>` inside attribute values
fn tag_end(rest: &str) -> usize {
    let mut quote = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return i + 1,
            _ => {}
        }
    }
    rest.len()
}
