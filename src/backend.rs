use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};

/// byte storage the object store delegates to
///
/// paths are repo-relative, slash-separated (e.g. `objects/ab/cdef…`).
/// implementations must be safe for concurrent callers; `write` must be
/// atomic and idempotent for identical bytes at the same path.
pub trait Backend: Send + Sync {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    fn has(&self, path: &str) -> Result<bool>;
    fn delete(&self, path: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// local filesystem backend rooted at the repository directory
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn tmp_path(&self) -> PathBuf {
        self.root.join("tmp")
    }
}

impl Backend for FsBackend {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path);
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io {
                path: full,
                source: e,
            }),
        }
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);

        // content-addressed dedup: an existing file already holds these bytes
        if full.exists() {
            return Ok(());
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        // atomic write: temp -> fsync -> rename
        let tmp = self.tmp_path().join(uuid::Uuid::new_v4().to_string());
        {
            let mut tmp_file = File::create(&tmp).with_path(&tmp)?;
            tmp_file.write_all(bytes).with_path(&tmp)?;
            tmp_file.sync_all().with_path(&tmp)?;
        }
        fs::rename(&tmp, &full).with_path(&full)?;

        // fsync parent directory
        if let Some(parent) = full.parent() {
            let dir = File::open(parent).with_path(parent)?;
            dir.sync_all().with_path(parent)?;
        }

        Ok(())
    }

    fn has(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io {
                path: full,
                source: e,
            }),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.resolve(prefix);
        if !base.exists() {
            return Ok(vec![]);
        }

        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&base).into_iter() {
            let entry = entry.map_err(|e| Error::Io {
                path: base.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                paths.push(path_to_slash(rel));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn path_to_slash(path: &Path) -> String {
    path.iter()
        .map(|c| c.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_backend() -> (tempfile::TempDir, FsBackend) {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        let backend = FsBackend::new(dir.path());
        (dir, backend)
    }

    #[test]
    fn test_write_and_read() {
        let (_dir, backend) = test_backend();

        backend.write("objects/ab/cdef", b"payload").unwrap();
        let read = backend.read("objects/ab/cdef").unwrap();
        assert_eq!(read, Some(b"payload".to_vec()));
    }

    #[test]
    fn test_read_absent() {
        let (_dir, backend) = test_backend();
        assert_eq!(backend.read("objects/ab/missing").unwrap(), None);
    }

    #[test]
    fn test_write_idempotent() {
        let (_dir, backend) = test_backend();

        backend.write("objects/ab/cdef", b"payload").unwrap();
        backend.write("objects/ab/cdef", b"payload").unwrap();
        assert_eq!(
            backend.read("objects/ab/cdef").unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn test_has_and_delete() {
        let (_dir, backend) = test_backend();

        backend.write("objects/00/aa", b"x").unwrap();
        assert!(backend.has("objects/00/aa").unwrap());

        backend.delete("objects/00/aa").unwrap();
        assert!(!backend.has("objects/00/aa").unwrap());

        // delete of a missing path is a no-op
        backend.delete("objects/00/aa").unwrap();
    }

    #[test]
    fn test_list_prefix() {
        let (_dir, backend) = test_backend();

        backend.write("objects/00/aa", b"1").unwrap();
        backend.write("objects/00/bb", b"2").unwrap();
        backend.write("objects/ff/cc", b"3").unwrap();

        let all = backend.list("objects").unwrap();
        assert_eq!(all, vec!["objects/00/aa", "objects/00/bb", "objects/ff/cc"]);

        let zero = backend.list("objects/00").unwrap();
        assert_eq!(zero, vec!["objects/00/aa", "objects/00/bb"]);
    }

    #[test]
    fn test_list_absent_prefix() {
        let (_dir, backend) = test_backend();
        assert!(backend.list("objects/77").unwrap().is_empty());
    }
}
