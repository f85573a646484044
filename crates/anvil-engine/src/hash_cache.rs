//! Content-hash cache over source files.
//!
//! Hashing every input on every rule-key computation would dominate
//! no-op build time, so hashes are computed once per invocation and
//! memoized. The cache is per-invocation: file changes between builds
//! are picked up because each build starts with an empty cache.

use std::fs::File;
use std::path::{Path, PathBuf};

use anvil_core::ContentHash;
use dashmap::DashMap;

use crate::error::EngineError;

/// Memoizing file hasher, keyed by project-relative path.
#[derive(Debug)]
pub struct FileHashCache {
    project_root: PathBuf,
    hashes: DashMap<PathBuf, ContentHash>,
}

impl FileHashCache {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        FileHashCache {
            project_root: project_root.into(),
            hashes: DashMap::new(),
        }
    }

    /// The content hash of `path`, computed on first request and served
    /// from memory afterwards. A missing or unreadable file is
    /// [`EngineError::MissingInput`].
    pub fn get(&self, path: &Path) -> Result<ContentHash, EngineError> {
        if let Some(cached) = self.hashes.get(path) {
            return Ok(*cached);
        }

        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        let mut file = File::open(&resolved).map_err(|_| EngineError::MissingInput {
            path: path.to_path_buf(),
        })?;
        let hash = ContentHash::of_reader(&mut file)?;
        self.hashes.insert(path.to_path_buf(), hash);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn hashes_match_direct_computation() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("input.txt"), b"payload").unwrap();

        let cache = FileHashCache::new(root.path());
        let hash = cache.get(Path::new("input.txt")).unwrap();
        assert_eq!(hash, ContentHash::of_bytes(b"payload"));
    }

    #[test]
    fn memoizes_for_the_whole_invocation() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("input.txt");
        fs::write(&file, b"before").unwrap();

        let cache = FileHashCache::new(root.path());
        let first = cache.get(Path::new("input.txt")).unwrap();

        fs::write(&file, b"after").unwrap();
        // Memoized: the same invocation keeps seeing the first hash.
        assert_eq!(cache.get(Path::new("input.txt")).unwrap(), first);

        // A fresh cache, as the next invocation constructs, re-hashes.
        let next = FileHashCache::new(root.path());
        let second = next.get(Path::new("input.txt")).unwrap();
        assert_eq!(second, ContentHash::of_bytes(b"after"));
        assert_ne!(first, second);
    }

    #[test]
    fn missing_file_is_a_missing_input() {
        let root = TempDir::new().unwrap();
        let cache = FileHashCache::new(root.path());
        let err = cache.get(Path::new("absent.txt")).unwrap_err();
        assert!(matches!(err, EngineError::MissingInput { .. }));
    }
}
