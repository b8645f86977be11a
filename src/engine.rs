//! Run driver: the per-file validation lifecycle
//!
//! Files are processed one at a time, in input order. For each file the
//! engine reads the bytes, picks the schema (the one given up front, or a
//! hint found in the document), fetches the compiled model from the
//! [`SchemaCache`] and runs the synchronous parse/validate pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;

use crate::cache::{SchemaCache, SchemaSource};
use crate::config::ValidationConfig;
use crate::diagnostics::{RunResult, Severity, Violation, ViolationKind};
use crate::events::{DebugTracer, ParseObserver};
use crate::parser::{ParserConfig, parse_document};
use crate::dtd::compile_document_dtd;
use crate::error::SchemaCompilationError;
use crate::schema::{SchemaKind, SchemaModel};
use crate::schema_loader::{DocumentType, SchemaExtractor, SchemaSourceType};
use crate::tokenizer::Location;
use crate::validator::Validator;

/// Progress notification for one file
#[derive(Debug, Clone)]
pub struct ValidationProgress {
    pub current_file: PathBuf,
    /// Number of files completed
    pub completed: usize,
    /// Total number of files to process
    pub total: usize,
    pub phase: ValidationPhase,
}

#[derive(Debug, Clone)]
pub enum ValidationPhase {
    /// About to open the file
    Processing,
    Finished(RunResult),
}

/// Callback type for progress reporting
pub type ProgressCallback = Arc<dyn Fn(ValidationProgress) + Send + Sync>;

pub struct ValidationEngine {
    cache: Arc<SchemaCache>,
    schema: Option<SchemaSource>,
    config: ValidationConfig,
    extractor: SchemaExtractor,
}

/// Schema chosen for one document, plus any violation raised while getting it
#[derive(Default)]
struct SchemaSelection {
    model: Option<Arc<SchemaModel>>,
    path: Option<PathBuf>,
    violations: Vec<Violation>,
}

impl ValidationEngine {
    /// `schema` applies to every file; without it documents are checked for
    /// well-formedness, or against their own schema hints when enabled.
    pub fn new(
        cache: Arc<SchemaCache>,
        schema: Option<SchemaSource>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            cache,
            schema,
            config,
            extractor: SchemaExtractor::new(),
        }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub async fn validate_files(&self, paths: &[PathBuf]) -> Vec<RunResult> {
        self.validate_files_with_progress(paths, None).await
    }

    /// Validates `paths` in order. With `fail_fast`, stops after the first
    /// file that is not valid; results produced so far are returned.
    pub async fn validate_files_with_progress(
        &self,
        paths: &[PathBuf],
        progress_callback: Option<ProgressCallback>,
    ) -> Vec<RunResult> {
        let total = paths.len();
        let mut results = Vec::with_capacity(total);

        for (completed, path) in paths.iter().enumerate() {
            if let Some(callback) = &progress_callback {
                callback(ValidationProgress {
                    current_file: path.clone(),
                    completed,
                    total,
                    phase: ValidationPhase::Processing,
                });
            }

            let result = self.validate_file(path).await;
            let failed = !result.verdict.is_valid();

            if let Some(callback) = &progress_callback {
                callback(ValidationProgress {
                    current_file: path.clone(),
                    completed: completed + 1,
                    total,
                    phase: ValidationPhase::Finished(result.clone()),
                });
            }

            results.push(result);
            if failed && self.config.fail_fast {
                break;
            }
        }

        results
    }

    pub async fn validate_file(&self, path: &Path) -> RunResult {
        self.validate_file_with_observers(path, &mut []).await
    }

    /// Like [`validate_file`](Self::validate_file), with extra observers that
    /// see every parse event after the validator does
    pub async fn validate_file_with_observers(
        &self,
        path: &Path,
        observers: &mut [&mut dyn ParseObserver],
    ) -> RunResult {
        let start = Instant::now();

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return RunResult::not_found(path.to_path_buf());
            }
            Err(e) => return RunResult::io_error(path.to_path_buf(), e.to_string()),
        };

        let selection = self.select_schema(path, &bytes).await;
        let mut violations = selection.violations;
        violations.extend(self.validate_bytes(&bytes, selection.model, observers));

        RunResult::checked(
            path.to_path_buf(),
            violations,
            selection.path,
            start.elapsed(),
        )
    }

    /// Parses and validates an in-memory document. Observer order is the
    /// validator, then the tracer when enabled, then `observers`.
    pub fn validate_bytes(
        &self,
        bytes: &[u8],
        schema: Option<Arc<SchemaModel>>,
        observers: &mut [&mut dyn ParseObserver],
    ) -> Vec<Violation> {
        let mut parser_config = ParserConfig::default().with_max_depth(self.config.max_depth);
        if let Some(model) = &schema {
            parser_config = parser_config.with_entities(model.entities().clone());
        }

        let mut validator = Validator::new(schema);
        let mut tracer = self.config.trace.then(DebugTracer::stderr);
        {
            let mut chain: Vec<&mut dyn ParseObserver> = Vec::with_capacity(observers.len() + 2);
            chain.push(&mut validator);
            if let Some(tracer) = tracer.as_mut() {
                chain.push(tracer);
            }
            for observer in observers.iter_mut() {
                chain.push(&mut **observer);
            }
            parse_document(bytes, parser_config, &mut chain);
        }
        validator.into_violations()
    }

    /// Precedence: the schema given up front, an `xsi` hint on the root,
    /// the document's own DTD when its internal subset declares markup,
    /// then the external DTD its DOCTYPE names.
    async fn select_schema(&self, document_path: &Path, bytes: &[u8]) -> SchemaSelection {
        let mut selection = SchemaSelection::default();

        let source = match &self.schema {
            Some(source) => source.clone(),
            None if self.config.resolve_schema_hints => {
                let text = String::from_utf8_lossy(bytes);
                let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
                let hint = self
                    .extractor
                    .xsd_references(text, document_path)
                    .into_iter()
                    .next();
                let reference = match (hint, self.extractor.document_type(text, document_path)) {
                    (Some(reference), _) => reference,
                    (None, Some(doctype)) if doctype.declares_markup() => {
                        return self.select_document_dtd(document_path, doctype).await;
                    }
                    (None, Some(DocumentType { external: Some(reference), .. })) => reference,
                    _ => return selection,
                };
                match reference.source_type {
                    SchemaSourceType::Local(source) => source,
                    SchemaSourceType::Remote(url) => {
                        selection.violations.push(remote_schema_warning(&url));
                        return selection;
                    }
                }
            }
            None => return selection,
        };

        selection.path = Some(source.path().to_path_buf());
        match self.cache.get_or_compile(&source).await {
            Ok(model) => selection.model = Some(model),
            Err(e) => selection.violations.push(schema_violation(
                Severity::Fatal,
                format!("{} schema {}: {}", source.kind(), source.path().display(), e),
            )),
        }
        selection
    }

    /// Compiles the internal subset together with the external subset it
    /// names. The result belongs to this document alone and is not cached.
    async fn select_document_dtd(
        &self,
        document_path: &Path,
        doctype: DocumentType,
    ) -> SchemaSelection {
        let mut selection = SchemaSelection {
            path: Some(document_path.to_path_buf()),
            ..SchemaSelection::default()
        };

        let external = match doctype.external.map(|reference| reference.source_type) {
            None => None,
            Some(SchemaSourceType::Remote(url)) => {
                selection.path = None;
                selection.violations.push(remote_schema_warning(&url));
                return selection;
            }
            Some(SchemaSourceType::Local(source)) => {
                let path = source.path().to_path_buf();
                selection.path = Some(path.clone());
                match fs::read_to_string(&path).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        let error = SchemaCompilationError::Io {
                            path: path.clone(),
                            message: e.to_string(),
                        };
                        selection.violations.push(schema_violation(
                            Severity::Fatal,
                            format!("{} schema {}: {}", SchemaKind::Dtd, path.display(), error),
                        ));
                        return selection;
                    }
                }
            }
        };

        let internal = doctype.internal_subset.unwrap_or_default();
        match compile_document_dtd(&doctype.name, &internal, external.as_deref()) {
            Ok(model) => selection.model = Some(Arc::new(model)),
            Err(e) => {
                let origin = selection.path.as_deref().unwrap_or(document_path);
                selection.violations.push(schema_violation(
                    Severity::Fatal,
                    format!("{} schema {}: {}", SchemaKind::Dtd, origin.display(), e),
                ));
            }
        }
        selection
    }
}

fn remote_schema_warning(url: &str) -> Violation {
    schema_violation(
        Severity::Warning,
        format!(
            "remote schema '{}' is not fetched; checking well-formedness only",
            url
        ),
    )
}

fn schema_violation(severity: Severity, message: String) -> Violation {
    Violation::new(
        ViolationKind::SchemaCompilationError,
        severity,
        Location::new(0, 1, 1),
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Verdict;
    use crate::events::EventRecorder;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const DTD: &str = "<!ELEMENT root (a,b)>\n<!ELEMENT a EMPTY>\n<!ELEMENT b EMPTY>\n";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn engine(schema: Option<SchemaSource>) -> ValidationEngine {
        ValidationEngine::new(
            Arc::new(SchemaCache::default()),
            schema,
            ValidationConfig::default(),
        )
    }

    fn dtd_source(dir: &TempDir) -> SchemaSource {
        SchemaSource::Dtd {
            path: write(dir, "doc.dtd", DTD),
            root: "root".to_string(),
        }
    }

    #[tokio::test]
    async fn test_valid_and_invalid_files() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.xml", "<root><a/><b/></root>");
        let bad = write(&dir, "bad.xml", "<root><b/><a/></root>");
        let engine = engine(Some(dtd_source(&dir)));

        let results = engine.validate_files(&[good, bad]).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].verdict.is_valid());
        assert!(results[1].verdict.is_invalid());
        assert_eq!(results[0].schema, Some(dir.path().join("doc.dtd")));
        assert!(
            results[1]
                .violations
                .iter()
                .all(|v| v.kind == ViolationKind::ContentModelMismatch)
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let engine = engine(None);
        let result = engine.validate_file(&dir.path().join("absent.xml")).await;
        assert_eq!(result.verdict, Verdict::SkippedNotFound);
    }

    #[tokio::test]
    async fn test_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = engine(None).validate_file(dir.path()).await;
        assert!(matches!(result.verdict, Verdict::SkippedIoError(_)));
    }

    #[tokio::test]
    async fn test_schema_compiles_once_per_run() {
        let dir = TempDir::new().unwrap();
        let engine = engine(Some(dtd_source(&dir)));
        let files: Vec<PathBuf> = (0..3)
            .map(|i| write(&dir, &format!("f{}.xml", i), "<root><a/><b/></root>"))
            .collect();

        let results = engine.validate_files(&files).await;
        assert!(results.iter().all(|r| r.verdict.is_valid()));
        assert_eq!(engine.cache().compilation_count(), 1);
    }

    #[tokio::test]
    async fn test_broken_schema_still_checks_well_formedness() {
        let dir = TempDir::new().unwrap();
        let source = SchemaSource::Dtd {
            path: write(&dir, "broken.dtd", "<!ELEMENT root (missing)>"),
            root: "root".to_string(),
        };
        let doc = write(&dir, "doc.xml", "<root><unclosed></root>");

        let result = engine(Some(source)).validate_file(&doc).await;

        assert_eq!(
            result.violations[0].kind,
            ViolationKind::SchemaCompilationError
        );
        assert_eq!(result.violations[0].severity, Severity::Fatal);
        assert!(result.violations.iter().any(Violation::is_fatal_well_formedness));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_after_first_failure() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(&dir, "a.xml", "<a/>"),
            write(&dir, "b.xml", "<b>"),
            write(&dir, "c.xml", "<c/>"),
        ];
        let config = ValidationConfig {
            fail_fast: true,
            ..ValidationConfig::default()
        };
        let engine = ValidationEngine::new(Arc::new(SchemaCache::default()), None, config);

        let results = engine.validate_files(&files).await;
        assert_eq!(results.len(), 2);
        assert!(results[1].verdict.is_invalid());
    }

    #[tokio::test]
    async fn test_schema_hint_is_followed() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "note.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType><xs:attribute name="id" type="xs:integer" use="required"/></xs:complexType>
  </xs:element>
</xs:schema>"#,
        );
        let doc = write(
            &dir,
            "note.xml",
            r#"<note xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="note.xsd"/>"#,
        );

        let result = engine(None).validate_file(&doc).await;
        assert!(result.verdict.is_invalid());
        assert_eq!(
            result.violations[0].kind,
            ViolationKind::MissingRequiredAttribute
        );

        let no_hints = ValidationEngine::new(
            Arc::new(SchemaCache::default()),
            None,
            ValidationConfig {
                resolve_schema_hints: false,
                ..ValidationConfig::default()
            },
        );
        assert!(no_hints.validate_file(&doc).await.verdict.is_valid());
    }

    #[tokio::test]
    async fn test_remote_hint_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let doc = write(
            &dir,
            "remote.xml",
            r#"<!DOCTYPE html SYSTEM "http://example.com/x.dtd"><html/>"#,
        );

        let result = engine(None).validate_file(&doc).await;
        assert!(result.verdict.is_valid());
        assert_eq!(result.warnings().count(), 1);
        assert!(result.violations[0].message.contains("http://example.com/x.dtd"));
    }

    #[tokio::test]
    async fn test_internal_subset_is_the_schema() {
        let dir = TempDir::new().unwrap();
        let broken = write(
            &dir,
            "broken.xml",
            "<!DOCTYPE root [<!ELEMENT root (a)><!ELEMENT a EMPTY>]><root><b/></root>",
        );
        let result = engine(None).validate_file(&broken).await;
        assert!(result.verdict.is_invalid());
        assert_eq!(result.violations[0].kind, ViolationKind::UndeclaredElement);
        assert_eq!(result.schema.as_deref(), Some(broken.as_path()));

        let fine = write(
            &dir,
            "fine.xml",
            "<!DOCTYPE root [<!ELEMENT root (a)><!ELEMENT a EMPTY>]><root><a/></root>",
        );
        assert!(engine(None).validate_file(&fine).await.verdict.is_valid());

        let entities_only = write(
            &dir,
            "entities.xml",
            "<!DOCTYPE root [<!ENTITY who 'world'>]><root><b>&who;</b></root>",
        );
        let result = engine(None).validate_file(&entities_only).await;
        assert!(result.verdict.is_valid());
        assert!(result.schema.is_none());
    }

    #[tokio::test]
    async fn test_internal_subset_merges_with_system_dtd() {
        let dir = TempDir::new().unwrap();
        let dtd = write(&dir, "items.dtd", "<!ELEMENT item EMPTY>\n");
        let doc = write(
            &dir,
            "list.xml",
            "<!DOCTYPE list SYSTEM \"items.dtd\" [<!ELEMENT list (item+)>]>\n<list><item/><item/></list>",
        );
        let cache = Arc::new(SchemaCache::default());
        let engine = ValidationEngine::new(Arc::clone(&cache), None, ValidationConfig::default());

        let result = engine.validate_file(&doc).await;
        assert!(result.verdict.is_valid());
        assert_eq!(result.schema.as_deref(), Some(dtd.as_path()));
        assert_eq!(cache.compilation_count(), 0);

        let empty = write(
            &dir,
            "empty.xml",
            "<!DOCTYPE list SYSTEM \"items.dtd\" [<!ELEMENT list (item+)>]>\n<list/>",
        );
        let result = engine.validate_file(&empty).await;
        assert_eq!(result.violations[0].kind, ViolationKind::ContentModelMismatch);

        let missing = write(
            &dir,
            "missing.xml",
            "<!DOCTYPE list SYSTEM \"gone.dtd\" [<!ELEMENT list ANY>]><list/>",
        );
        let result = engine.validate_file(&missing).await;
        assert_eq!(result.violations[0].kind, ViolationKind::SchemaCompilationError);
        assert_eq!(result.violations[0].severity, Severity::Fatal);
        assert!(result.violations[0].message.contains("gone.dtd"));
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_file() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, "a.xml", "<a/>"), write(&dir, "b.xml", "<b/>")];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress: ValidationProgress| {
            let label = match progress.phase {
                ValidationPhase::Processing => "start",
                ValidationPhase::Finished(_) => "done",
            };
            sink.lock().unwrap().push((label, progress.completed, progress.total));
        });

        engine(None)
            .validate_files_with_progress(&files, Some(callback))
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("start", 0, 2), ("done", 1, 2), ("start", 1, 2), ("done", 2, 2)]
        );
    }

    #[tokio::test]
    async fn test_extra_observers_receive_events() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "doc.xml", "<root><a/></root>");
        let mut recorder = EventRecorder::new();

        let result = engine(None)
            .validate_file_with_observers(&doc, &mut [&mut recorder])
            .await;

        assert!(result.verdict.is_valid());
        assert_eq!(recorder.events().len(), 6);
    }

    #[test]
    fn test_validate_bytes_uses_dtd_entities() {
        let model = crate::dtd::compile_dtd(
            "root",
            "<!ELEMENT root (#PCDATA)><!ENTITY who 'world'>",
        )
        .unwrap();
        let violations = engine(None).validate_bytes(
            b"<root>hello &who;</root>",
            Some(Arc::new(model)),
            &mut [],
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_max_depth_is_enforced() {
        let config = ValidationConfig {
            max_depth: 2,
            ..ValidationConfig::default()
        };
        let engine = ValidationEngine::new(Arc::new(SchemaCache::default()), None, config);
        let violations = engine.validate_bytes(b"<a><b><c/></b></a>", None, &mut []);
        assert!(violations.iter().any(Violation::is_fatal_well_formedness));
    }
}
