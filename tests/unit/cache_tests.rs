//! Schema cache behaviour through the public API
use std::sync::Arc;

use xvalid::cache::{CacheConfig, SchemaCache, SchemaSource};
use xvalid::error::SchemaCompilationError;
use xvalid::schema::SchemaKind;

use crate::common::test_helpers::{NOTE_XSD, SEQUENCE_DTD, TestFiles};

#[tokio::test]
async fn test_one_compilation_per_schema() {
    let files = TestFiles::new();
    let source = files.dtd("seq.dtd", SEQUENCE_DTD, "root");
    let cache = SchemaCache::new(CacheConfig { max_entries: 4 });

    let models: Vec<_> = compile_repeatedly(&cache, &source, 5).await;

    assert_eq!(cache.compilation_count(), 1);
    assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

    let stats = cache.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 4);
    assert!((stats.hit_rate() - 80.0).abs() < 1e-9);
}

async fn compile_repeatedly(
    cache: &SchemaCache,
    source: &SchemaSource,
    times: usize,
) -> Vec<Arc<xvalid::schema::SchemaModel>> {
    let mut models = Vec::with_capacity(times);
    for _ in 0..times {
        models.push(cache.get_or_compile(source).await.unwrap());
    }
    models
}

#[tokio::test]
async fn test_concurrent_requests_share_one_compilation() {
    let files = TestFiles::new();
    let source = files.xsd("note.xsd", NOTE_XSD);
    let cache = Arc::new(SchemaCache::default());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            cache.get_or_compile(&source).await.unwrap()
        }));
    }

    let mut models = Vec::new();
    for handle in handles {
        models.push(handle.await.unwrap());
    }

    assert_eq!(cache.compilation_count(), 1);
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    assert_eq!(models[0].kind(), SchemaKind::Xsd);
}

#[tokio::test]
async fn test_same_file_through_different_paths() {
    let files = TestFiles::new();
    let source = files.dtd("seq.dtd", SEQUENCE_DTD, "root");
    let indirect = SchemaSource::Dtd {
        path: files.path().join(".").join("seq.dtd"),
        root: "root".to_string(),
    };
    let cache = SchemaCache::default();

    let first = cache.get_or_compile(&source).await.unwrap();
    let second = cache.get_or_compile(&indirect).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.compilation_count(), 1);
}

#[tokio::test]
async fn test_compilation_error_is_reported_each_time() {
    let files = TestFiles::new();
    let source = files.xsd("bad.xsd", "<schema/>");
    let cache = SchemaCache::default();

    for _ in 0..3 {
        let err = cache.get_or_compile(&source).await.unwrap_err();
        assert!(matches!(err, SchemaCompilationError::NotASchema { .. }));
    }
    assert_eq!(cache.compilation_count(), 1);
}

#[tokio::test]
async fn test_clear_forces_recompilation() {
    let files = TestFiles::new();
    let source = files.dtd("seq.dtd", SEQUENCE_DTD, "root");
    let cache = SchemaCache::default();

    cache.get_or_compile(&source).await.unwrap();
    cache.clear();
    cache.get_or_compile(&source).await.unwrap();

    assert_eq!(cache.compilation_count(), 2);
}

#[test]
fn test_cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.max_entries, 100);

    let parsed: CacheConfig = toml::from_str("").unwrap();
    assert_eq!(parsed, config);
}
