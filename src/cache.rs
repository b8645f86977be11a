use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::dtd::compile_dtd;
use crate::error::{CompileResult, SchemaCompilationError};
use crate::schema::{SchemaKind, SchemaModel};
use crate::xsd::compile_xsd;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of compiled schemas kept in memory
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

/// A schema file together with what is needed to compile it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaSource {
    Dtd { path: PathBuf, root: String },
    Xsd { path: PathBuf },
}

impl SchemaSource {
    pub fn path(&self) -> &Path {
        match self {
            SchemaSource::Dtd { path, .. } | SchemaSource::Xsd { path } => path,
        }
    }

    pub fn kind(&self) -> SchemaKind {
        match self {
            SchemaSource::Dtd { .. } => SchemaKind::Dtd,
            SchemaSource::Xsd { .. } => SchemaKind::Xsd,
        }
    }

    /// Compiles already-loaded schema text
    pub fn compile(&self, text: &str) -> CompileResult<SchemaModel> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        match self {
            SchemaSource::Dtd { root, .. } => compile_dtd(root, text),
            SchemaSource::Xsd { .. } => compile_xsd(text),
        }
    }

    fn with_path(&self, path: PathBuf) -> Self {
        match self {
            SchemaSource::Dtd { root, .. } => SchemaSource::Dtd {
                path,
                root: root.clone(),
            },
            SchemaSource::Xsd { .. } => SchemaSource::Xsd { path },
        }
    }
}

/// Identity of one compilation: canonical path, content hash, and the
/// compile parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SchemaKey {
    source: SchemaSource,
    content_hash: u64,
}

type Compilation = Result<Arc<SchemaModel>, SchemaCompilationError>;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub compilations: usize,
    pub entry_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// In-memory cache of compiled schemas for the lifetime of one run
///
/// Successful and failed compilations are both memoized: a schema that fails
/// to compile is reported on every file that needs it without being
/// recompiled. `moka` guarantees that concurrent requests for the same key
/// wait for a single compilation.
pub struct SchemaCache {
    cache: Cache<SchemaKey, Compilation>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    compilations: Arc<AtomicUsize>,
}

impl SchemaCache {
    pub fn new(config: CacheConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.max_entries).build();

        Self {
            cache,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            compilations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the compiled model for `source`, compiling it on first use.
    ///
    /// Read errors are returned without being cached; the file may appear
    /// later in the run.
    pub async fn get_or_compile(&self, source: &SchemaSource) -> Compilation {
        let bytes = fs::read(source.path())
            .await
            .map_err(|e| SchemaCompilationError::Io {
                path: source.path().to_path_buf(),
                message: e.to_string(),
            })?;
        let canonical = fs::canonicalize(source.path())
            .await
            .unwrap_or_else(|_| source.path().to_path_buf());

        let key = SchemaKey {
            source: source.with_path(canonical),
            content_hash: content_hash(&bytes),
        };

        let compilations = Arc::clone(&self.compilations);
        let compile_source = key.source.clone();
        let entry = self
            .cache
            .entry(key)
            .or_insert_with(async move {
                compilations.fetch_add(1, Ordering::SeqCst);
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    SchemaCompilationError::malformed(1, 1, format!("schema is not valid UTF-8: {}", e))
                })?;
                compile_source.compile(text).map(Arc::new)
            })
            .await;

        if entry.is_fresh() {
            self.misses.fetch_add(1, Ordering::SeqCst);
        } else {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        entry.into_value()
    }

    /// Number of compilations performed so far
    pub fn compilation_count(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> CacheStats {
        // Run pending maintenance so entry_count is current
        self.cache.run_pending_tasks().await;

        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            compilations: self.compilation_count(),
            entry_count: self.cache.entry_count(),
        }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
