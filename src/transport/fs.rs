use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::MlmError;

/// Filesystem listing of corpus files under a root.
#[derive(Clone, Debug)]
pub struct FileStream {
    root: PathBuf,
    follow_links: bool,
    text_files_only: bool,
}

impl FileStream {
    /// Create a stream rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
            text_files_only: true,
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Restrict the listing to `.txt` files (on by default).
    pub fn with_text_files_only(mut self, text_files_only: bool) -> Self {
        self.text_files_only = text_files_only;
        self
    }

    /// Root directory being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All matching files, sorted by path so paragraph indices are stable
    /// across runs.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, MlmError> {
        if !self.root.exists() {
            return Err(MlmError::Configuration(format!(
                "corpus root does not exist: {}",
                self.root.display()
            )));
        }
        let mut walker = WalkDir::new(&self.root);
        if self.follow_links {
            walker = walker.follow_links(true);
        }
        let mut files: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !self.text_files_only || is_text_file(path))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// True if the path has a `.txt` extension (case-insensitive).
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}
