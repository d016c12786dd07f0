//! Filesystem collaborator.
//!
//! The engine never touches module source files directly; a `FileResolver`
//! sits at the seam so tests can swap in fixture filesystems.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Abstract read access to module source files.
pub trait FileResolver: Send + Sync {
    /// Whether a file exists at the given path.
    fn exists(&self, path: &Path) -> bool;

    /// Read the file's bytes.
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Resolve a path to the file backing it, if one exists.
    fn resolve(&self, path: &Path) -> Option<PathBuf>;
}

/// Resolver backed by the real filesystem.
#[derive(Default)]
pub struct OsFileResolver;

impl FileResolver for OsFileResolver {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        path.is_file().then(|| path.to_path_buf())
    }
}

/// Resolver over a fixed map of paths, for tests.
#[derive(Default)]
pub struct InMemoryFileResolver {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemoryFileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }
}

impl FileResolver for InMemoryFileResolver {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        self.files
            .lock()
            .unwrap()
            .contains_key(path)
            .then(|| path.to_path_buf())
    }
}
