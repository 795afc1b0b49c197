use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::repo::Repo;

/// lock file suffix; lock files never appear in listings
const LOCK_SUFFIX: &str = ".lock";

/// read a ref
pub fn get(repo: &Repo, ref_name: &str) -> Result<Hash> {
    let path = ref_path(repo, ref_name);

    let content = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: path.clone(),
                source: e,
            }
        }
    })?;

    Hash::from_hex(content.trim())
}

/// read a ref, mapping absence to None
pub fn get_opt(repo: &Repo, ref_name: &str) -> Result<Option<Hash>> {
    match get(repo, ref_name) {
        Ok(hash) => Ok(Some(hash)),
        Err(Error::RefNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// write a ref unconditionally
pub fn set(repo: &Repo, ref_name: &str, hash: &Hash) -> Result<()> {
    update(repo, ref_name, None, Some(hash))
}

/// delete a ref; absent refs delete idempotently
pub fn delete(repo: &Repo, ref_name: &str) -> Result<()> {
    update(repo, ref_name, None, None)
}

/// atomically update a ref, optionally compare-and-swap
///
/// the sibling lock file is taken with exclusive create; contention surfaces
/// verbatim as `LockContended` and is never retried here. `expected_old` is
/// the hex of the value the caller last observed, empty string for "expect
/// absent". `new` of None deletes. the rename of the lock file over the ref
/// file supplies atomicity, so no reader ever observes a partial address.
pub fn update(
    repo: &Repo,
    ref_name: &str,
    expected_old: Option<&str>,
    new: Option<&Hash>,
) -> Result<()> {
    validate_ref_name(ref_name)?;

    let path = ref_path(repo, ref_name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }

    let lock_path = path.with_extension(lock_extension(&path));
    let mut lock_file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(Error::LockContended(ref_name.to_string()));
        }
        Err(e) => {
            return Err(Error::Io {
                path: lock_path,
                source: e,
            });
        }
    };

    let result = locked_update(repo, ref_name, &path, &mut lock_file, expected_old, new);
    match &result {
        // the write path renamed the lock file away; nothing to clean up
        Ok(true) => {}
        _ => {
            let _ = fs::remove_file(&lock_path);
        }
    }
    result.map(|_| ())
}

/// body of `update` run while the lock is held; returns whether the lock
/// file was consumed by the rename
fn locked_update(
    repo: &Repo,
    ref_name: &str,
    path: &Path,
    lock_file: &mut File,
    expected_old: Option<&str>,
    new: Option<&Hash>,
) -> Result<bool> {
    let current = get_opt(repo, ref_name)?;
    let current_hex = current.map(|h| h.to_hex()).unwrap_or_default();

    if let Some(expected) = expected_old {
        if expected != current_hex {
            return Err(Error::CasMismatch {
                name: ref_name.to_string(),
                expected: expected.to_string(),
                actual: current_hex,
            });
        }
    }

    match new {
        None => {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Io {
                        path: path.to_path_buf(),
                        source: e,
                    });
                }
            }
            Ok(false)
        }
        Some(hash) => {
            writeln!(lock_file, "{}", hash.to_hex()).with_path(path)?;
            lock_file.sync_all().with_path(path)?;
            fs::rename(path.with_extension(lock_extension(path)), path).with_path(path)?;

            if let Some(parent) = path.parent() {
                let dir = File::open(parent).with_path(parent)?;
                dir.sync_all().with_path(parent)?;
            }
            Ok(true)
        }
    }
}

/// list refs under a prefix, returning `{name → hash}`
///
/// names are slash-joined relative to the refs root; directories and stale
/// lock files are skipped.
pub fn list(repo: &Repo, prefix: &str) -> Result<BTreeMap<String, Hash>> {
    let refs_root = repo.refs_path();
    let base = if prefix.is_empty() {
        refs_root.clone()
    } else {
        refs_root.join(prefix)
    };

    let mut refs = BTreeMap::new();
    if base.exists() {
        collect_refs(repo, &refs_root, &base, &mut refs)?;
    }
    Ok(refs)
}

/// check if a ref exists
pub fn exists(repo: &Repo, ref_name: &str) -> bool {
    ref_path(repo, ref_name).exists()
}

/// get filesystem path for a ref
fn ref_path(repo: &Repo, ref_name: &str) -> PathBuf {
    repo.refs_path().join(ref_name)
}

/// `.lock` sibling, preserving any extension in the last path component
fn lock_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}{}", ext.to_string_lossy(), LOCK_SUFFIX),
        None => LOCK_SUFFIX.trim_start_matches('.').to_string(),
    }
}

/// recursively collect refs from directory
fn collect_refs(
    repo: &Repo,
    base: &Path,
    dir: &Path,
    refs: &mut BTreeMap<String, Hash>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();

        if path.is_dir() {
            collect_refs(repo, base, &path, refs)?;
        } else if path.is_file() {
            if path.to_string_lossy().ends_with(LOCK_SUFFIX) {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(base) {
                let name = rel
                    .iter()
                    .map(|c| c.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                refs.insert(name.clone(), get(repo, &name)?);
            }
        }
    }
    Ok(())
}

/// validate ref name
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRef("empty ref name".to_string()));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::InvalidRef(format!(
            "ref name cannot start or end with '/': {}",
            name
        )));
    }

    if name.contains("//") {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain '//': {}",
            name
        )));
    }

    if name.contains('\0') {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain null byte: {}",
            name
        )));
    }

    if name.ends_with(LOCK_SUFFIX) {
        return Err(Error::InvalidRef(format!(
            "ref name cannot end with '{}': {}",
            LOCK_SUFFIX, name
        )));
    }

    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(Error::InvalidRef(format!(
                "ref name cannot contain '.' or '..': {}",
                name
            )));
        }
    }

    Ok(())
}
