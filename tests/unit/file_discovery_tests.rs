//! Expanding command line paths into documents
use std::path::PathBuf;

use xvalid::error::ValidationError;
use xvalid::file_discovery::FileDiscovery;

use crate::common::test_helpers::TestFiles;

fn corpus() -> TestFiles {
    let files = TestFiles::new();
    for name in [
        "a.xml",
        "b.cmdi",
        "notes.txt",
        "drafts/c.xml",
        "drafts/old/d.xml",
        "build/e.xml",
    ] {
        files.write(name, "<x/>");
    }
    files
}

fn relative(files: &TestFiles, found: &[PathBuf]) -> Vec<String> {
    found
        .iter()
        .map(|p| {
            p.strip_prefix(files.path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[tokio::test]
async fn test_walk_order_is_deterministic() {
    let files = corpus();
    let found = FileDiscovery::new()
        .expand_paths(&[files.path().to_path_buf()])
        .await
        .unwrap();

    assert_eq!(
        relative(&files, &found),
        vec!["a.xml", "build/e.xml", "drafts/c.xml", "drafts/old/d.xml"]
    );
}

#[tokio::test]
async fn test_inputs_keep_their_order() {
    let files = corpus();
    let inputs = vec![
        files.path().join("drafts"),
        files.path().join("a.xml"),
        files.path().join("b.cmdi"),
    ];

    let found = FileDiscovery::new().expand_paths(&inputs).await.unwrap();

    assert_eq!(
        relative(&files, &found),
        vec!["drafts/c.xml", "drafts/old/d.xml", "a.xml", "b.cmdi"]
    );
}

#[tokio::test]
async fn test_include_and_exclude_together() {
    let files = corpus();
    let found = FileDiscovery::new()
        .with_extensions(vec!["xml".to_string(), "CMDI".to_string()])
        .with_include_patterns(vec!["*.xml".to_string(), "*.cmdi".to_string()])
        .unwrap()
        .with_exclude_patterns(vec!["build/**".to_string(), "**/old/**".to_string()])
        .unwrap()
        .discover_files(files.path())
        .await
        .unwrap();

    assert_eq!(
        relative(&files, &found),
        vec!["a.xml", "b.cmdi", "drafts/c.xml"]
    );
}

#[tokio::test]
async fn test_depth_zero_stays_in_the_root() {
    let files = corpus();
    let found = FileDiscovery::new()
        .with_max_depth(Some(0))
        .discover_files(files.path())
        .await
        .unwrap();

    assert_eq!(relative(&files, &found), vec!["a.xml"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_followed_only_on_request() {
    let files = corpus();
    let outside = TestFiles::new();
    outside.write("linked.xml", "<x/>");
    std::os::unix::fs::symlink(outside.path(), files.path().join("link")).unwrap();

    let default = FileDiscovery::new()
        .discover_files(files.path())
        .await
        .unwrap();
    assert!(!default.iter().any(|p| p.ends_with("linked.xml")));

    let following = FileDiscovery::new()
        .with_follow_symlinks(true)
        .discover_files(files.path())
        .await
        .unwrap();
    assert!(following.iter().any(|p| p.ends_with("linked.xml")));
}

#[test]
fn test_bad_exclude_pattern() {
    let result = FileDiscovery::new().with_exclude_patterns(vec!["[".to_string()]);
    assert!(matches!(result, Err(ValidationError::Config(_))));
}
