use crate::error::{Result, ValidationError};
use ignore::Match;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Expands command line paths into the list of documents to validate
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include when walking directories (e.g., ["xml"])
    extensions: Vec<String>,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Only files matching at least one pattern are kept (gitignore glob syntax)
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_patterns = patterns;
        self.overrides(Path::new(""))?;
        Ok(self)
    }

    /// Files matching any pattern are dropped
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_patterns = patterns;
        self.overrides(Path::new(""))?;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    fn overrides(&self, root: &Path) -> Result<Override> {
        let mut builder = OverrideBuilder::new(root);
        let patterns = self
            .include_patterns
            .iter()
            .cloned()
            .chain(self.exclude_patterns.iter().map(|p| format!("!{}", p)));
        for pattern in patterns {
            builder.add(&pattern).map_err(|e| {
                ValidationError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
        }
        builder
            .build()
            .map_err(|e| ValidationError::Config(format!("Failed to build glob set: {}", e)))
    }

    /// Expands each input: directories are walked (entries in name order),
    /// anything else is passed through unchanged so that missing files are
    /// reported by the validation run.
    pub async fn expand_paths(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            match fs::metadata(input).await {
                Ok(metadata) if metadata.is_dir() => {
                    files.extend(self.discover_files(input).await?);
                }
                _ => files.push(input.clone()),
            }
        }
        Ok(files)
    }

    /// Discover matching files under `path` (file or directory)
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(path).await.map_err(ValidationError::from)?;
        let overrides = self.overrides(path)?;

        if metadata.is_file() {
            if self.should_process(path, &overrides) {
                return Ok(vec![path.to_path_buf()]);
            }
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        self.discover_files_recursive(path, 0, &overrides, &mut files)
            .await?;
        Ok(files)
    }

    fn discover_files_recursive<'a>(
        &'a self,
        dir: &'a Path,
        depth: usize,
        overrides: &'a Override,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let mut read_dir = fs::read_dir(dir)
                .await
                .map_err(|e| ValidationError::FileSystemTraversal {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?;

            let mut entries = Vec::new();
            while let Some(entry) = read_dir.next_entry().await.map_err(ValidationError::from)? {
                entries.push(entry.path());
            }
            entries.sort();

            for entry_path in entries {
                if !self.follow_symlinks && entry_path.is_symlink() {
                    continue;
                }
                let Ok(metadata) = fs::metadata(&entry_path).await else {
                    continue;
                };

                if metadata.is_file() {
                    if self.should_process(&entry_path, overrides) {
                        files.push(entry_path);
                    }
                } else if metadata.is_dir() {
                    // Files directly under the root are at depth 0
                    if self.max_depth.is_some_and(|max| depth >= max) {
                        continue;
                    }
                    self.discover_files_recursive(&entry_path, depth + 1, overrides, files)
                        .await?;
                }
            }
            Ok(())
        })
    }

    /// Extension and glob filter applied to files found while walking
    fn should_process(&self, path: &Path, overrides: &Override) -> bool {
        if !self.has_extension(path) {
            return false;
        }
        !matches!(overrides.matched(path, false), Match::Ignore(_))
    }

    pub fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn create_test_directory() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("subdir1")).await.unwrap();
        fs::create_dir_all(root.join("subdir2/nested")).await.unwrap();

        for (name, content) in [
            ("file1.xml", "<a/>"),
            ("file2.XML", "<a/>"),
            ("file3.txt", "text file"),
            ("subdir1/nested.xml", "<a/>"),
            ("subdir2/nested/deep.xml", "<a/>"),
            ("subdir2/nested/other.xsd", "schema"),
        ] {
            fs::write(root.join(name), content).await.unwrap();
        }

        temp_dir
    }

    fn names(files: &[PathBuf]) -> HashSet<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_discover_xml_files() {
        let temp_dir = create_test_directory().await;
        let files = FileDiscovery::new()
            .discover_files(temp_dir.path())
            .await
            .unwrap();

        assert_eq!(files.len(), 4);
        let found = names(&files);
        assert!(found.contains("file1.xml"));
        assert!(found.contains("file2.XML"));
        assert!(found.contains("nested.xml"));
        assert!(found.contains("deep.xml"));
    }

    #[tokio::test]
    async fn test_discovery_order_is_sorted() {
        let temp_dir = create_test_directory().await;
        let files = FileDiscovery::new()
            .discover_files(temp_dir.path())
            .await
            .unwrap();
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[tokio::test]
    async fn test_multiple_extensions() {
        let temp_dir = create_test_directory().await;
        let files = FileDiscovery::new()
            .with_extensions(vec!["xml".to_string(), "xsd".to_string()])
            .discover_files(temp_dir.path())
            .await
            .unwrap();
        assert_eq!(files.len(), 5);
    }

    #[tokio::test]
    async fn test_max_depth_limit() {
        let temp_dir = create_test_directory().await;
        let files = FileDiscovery::new()
            .with_max_depth(Some(1))
            .discover_files(temp_dir.path())
            .await
            .unwrap();

        let found = names(&files);
        assert_eq!(files.len(), 3);
        assert!(found.contains("nested.xml"));
        assert!(!found.contains("deep.xml"));
    }

    #[tokio::test]
    async fn test_include_and_exclude_patterns() {
        let temp_dir = create_test_directory().await;
        let included = FileDiscovery::new()
            .with_include_patterns(vec!["**/nested*".to_string()])
            .unwrap()
            .discover_files(temp_dir.path())
            .await
            .unwrap();
        assert_eq!(names(&included), HashSet::from(["nested.xml".to_string()]));

        let excluded = FileDiscovery::new()
            .with_exclude_patterns(vec!["subdir2/**".to_string()])
            .unwrap()
            .discover_files(temp_dir.path())
            .await
            .unwrap();
        assert_eq!(excluded.len(), 3);
        assert!(!names(&excluded).contains("deep.xml"));
    }

    #[tokio::test]
    async fn test_expand_paths_passes_files_through() {
        let temp_dir = create_test_directory().await;
        let missing = temp_dir.path().join("missing.xml");
        let text = temp_dir.path().join("file3.txt");
        let inputs = vec![
            missing.clone(),
            text.clone(),
            temp_dir.path().join("subdir1"),
        ];

        let files = FileDiscovery::new().expand_paths(&inputs).await.unwrap();
        assert_eq!(
            files,
            vec![missing, text, temp_dir.path().join("subdir1/nested.xml")]
        );
    }

    #[test]
    fn test_has_extension() {
        let discovery = FileDiscovery::new();
        assert!(discovery.has_extension(Path::new("test.xml")));
        assert!(discovery.has_extension(Path::new("TEST.XML")));
        assert!(!discovery.has_extension(Path::new("test.txt")));
        assert!(!discovery.has_extension(Path::new("test")));
    }

    #[test]
    fn test_invalid_glob() {
        let result = FileDiscovery::new().with_include_patterns(vec!["a[".to_string()]);
        assert!(matches!(result, Err(ValidationError::Config(_))));
    }

    #[tokio::test]
    async fn test_nonexistent_directory() {
        let result = FileDiscovery::new()
            .discover_files(Path::new("/nonexistent/path"))
            .await;
        assert!(matches!(result, Err(ValidationError::Io(_))));
    }
}
