//! Content-addressed module cache.
//!
//! Pulled artifacts land under
//! `<cache_root>/<registry>/<repo segment>…/<tag>/<file>`, one file per
//! layer. The layout is a pure function of the reference, so entries carry
//! no back-pointers and a reference can be answered from the path alone.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::reference::OciModuleReference;

/// The local artifact cache.
#[derive(Debug, Clone)]
pub struct ModuleCache {
    root: PathBuf,
}

impl ModuleCache {
    /// Create a cache rooted at the given directory. Nothing is created on
    /// disk until the first pull.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for a reference.
    ///
    /// Known collision: `a/b:c` and `a:b` can share a directory after
    /// path-joining. The layout is kept as the plain tuple join.
    pub fn entry_dir(&self, reference: &OciModuleReference) -> PathBuf {
        let mut dir = self.root.join(&reference.registry);
        for segment in reference.repository.split('/') {
            dir.push(segment);
        }
        dir.push(&reference.tag);
        dir
    }

    /// Whether the entry for a reference has been materialized.
    pub fn is_populated(&self, reference: &OciModuleReference) -> bool {
        let dir = self.entry_dir(reference);
        match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// Create the entry directory for a reference. Idempotent.
    pub fn ensure_entry_dir(&self, reference: &OciModuleReference) -> Result<PathBuf> {
        let dir = self.entry_dir(reference);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write one layer file into an entry directory.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place,
    /// so concurrent writers of the same digest-addressed content converge
    /// on identical bytes and a reader never observes a torn file.
    pub fn write_layer(&self, entry_dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        let target = entry_dir.join(file_name);
        let temp = entry_dir.join(format!("{file_name}.tmp"));

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;

        debug!(path = %target.display(), size = data.len(), "Cached layer");
        Ok(target)
    }

    /// Paths of the files currently in an entry, sorted by name.
    pub fn entry_files(&self, reference: &OciModuleReference) -> Result<Vec<PathBuf>> {
        let dir = self.entry_dir(reference);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> OciModuleReference {
        OciModuleReference {
            registry: "example.com".to_string(),
            repository: "test/module".to_string(),
            tag: "v1".to_string(),
        }
    }

    #[test]
    fn entry_dir_layout() {
        let cache = ModuleCache::new("/cache");
        assert_eq!(
            cache.entry_dir(&reference()),
            PathBuf::from("/cache/example.com/test/module/v1")
        );
    }

    #[test]
    fn empty_entry_is_not_populated() {
        let root = tempfile::tempdir().unwrap();
        let cache = ModuleCache::new(root.path());

        assert!(!cache.is_populated(&reference()));

        // A bare directory with no layers still counts as missing.
        cache.ensure_entry_dir(&reference()).unwrap();
        assert!(!cache.is_populated(&reference()));
    }

    #[test]
    fn write_layer_populates_entry() {
        let root = tempfile::tempdir().unwrap();
        let cache = ModuleCache::new(root.path());

        let dir = cache.ensure_entry_dir(&reference()).unwrap();
        let path = cache.write_layer(&dir, "main.json", b"{}").unwrap();

        assert!(cache.is_populated(&reference()));
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert_eq!(cache.entry_files(&reference()).unwrap(), vec![path]);
    }

    #[test]
    fn write_layer_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let cache = ModuleCache::new(root.path());

        let dir = cache.ensure_entry_dir(&reference()).unwrap();
        cache.write_layer(&dir, "main.json", b"old").unwrap();
        let path = cache.write_layer(&dir, "main.json", b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(cache.entry_files(&reference()).unwrap().len(), 1);
    }
}
