use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{GitHash, Hash};
use crate::repo::Repo;
use crate::types::Kind;

/// one git ↔ native address pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapEntry {
    pub git: GitHash,
    pub native: Hash,
    pub kind: Kind,
}

impl MapEntry {
    pub fn new(git: GitHash, native: Hash, kind: Kind) -> Self {
        Self { git, native, kind }
    }
}

/// serialized form of the per-repo mapping table
///
/// both directions are stored so lookups stay symmetric even after
/// rewrite-time overrides replace a forward entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct TableFile {
    /// git hex → (native hex, kind name)
    git_to_native: BTreeMap<String, (String, String)>,
    /// native hex → (git hex, kind name)
    native_to_git: BTreeMap<String, (String, String)>,
}

/// in-memory view of the table, loaded once per request
#[derive(Clone, Debug, Default)]
pub struct MappingTable {
    file: TableFile,
}

impl MappingTable {
    pub fn get_native(&self, git: &GitHash) -> Result<Option<(Hash, Kind)>> {
        match self.file.git_to_native.get(&git.to_hex()) {
            Some((native, kind)) => Ok(Some((Hash::from_hex(native)?, Kind::from_name(kind)?))),
            None => Ok(None),
        }
    }

    pub fn get_git(&self, native: &Hash) -> Result<Option<(GitHash, Kind)>> {
        match self.file.native_to_git.get(&native.to_hex()) {
            Some((git, kind)) => Ok(Some((GitHash::from_hex(git)?, Kind::from_name(kind)?))),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.file.git_to_native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.git_to_native.is_empty()
    }
}

/// load the mapping table for read-heavy paths
pub fn load(repo: &Repo) -> Result<MappingTable> {
    Ok(MappingTable {
        file: read_table(&table_path(repo))?,
    })
}

/// point lookup git → native
pub fn get_native(repo: &Repo, git: &GitHash) -> Result<Option<(Hash, Kind)>> {
    load(repo)?.get_native(git)
}

/// point lookup native → git
pub fn get_git(repo: &Repo, native: &Hash) -> Result<Option<(GitHash, Kind)>> {
    load(repo)?.get_git(native)
}

/// record a single mapping
pub fn set(repo: &Repo, entry: &MapEntry) -> Result<()> {
    set_many(repo, std::slice::from_ref(entry))
}

/// record a batch of mappings transactionally
///
/// either every mapping becomes queryable or none does: the merged table is
/// written to a temp file and renamed into place under the table lock. a
/// conflicting pair (same git with a different native, or vice versa) fails
/// the whole batch; identical re-writes are accepted.
pub fn set_many(repo: &Repo, batch: &[MapEntry]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    with_table_lock(repo, |table| {
        for entry in batch {
            insert_checked(table, entry)?;
        }
        Ok(())
    })
}

/// replace mappings after a tree rewrite
///
/// the git address the client pushed must resolve to the rewritten native
/// object from now on. the forward entry is replaced and the stale reverse
/// entry for the superseded native address is dropped so the bijection holds.
pub fn set_overrides(repo: &Repo, overrides: &[MapEntry]) -> Result<()> {
    if overrides.is_empty() {
        return Ok(());
    }
    with_table_lock(repo, |table| {
        for entry in overrides {
            let git_hex = entry.git.to_hex();
            if let Some((old_native, _)) = table.git_to_native.get(&git_hex) {
                table.native_to_git.remove(old_native);
            }
            table.git_to_native.insert(
                git_hex.clone(),
                (entry.native.to_hex(), entry.kind.name().to_string()),
            );
            table
                .native_to_git
                .insert(entry.native.to_hex(), (git_hex, entry.kind.name().to_string()));
        }
        Ok(())
    })
}

/// per-entry git modes for a native tree
pub fn tree_modes(repo: &Repo, tree: &Hash) -> Result<Option<BTreeMap<String, String>>> {
    let all: BTreeMap<String, BTreeMap<String, String>> = read_cbor(&modes_path(repo))?;
    Ok(all.get(&tree.to_hex()).cloned())
}

/// record git modes for a batch of native trees
pub fn set_tree_modes_many(
    repo: &Repo,
    batch: &BTreeMap<Hash, BTreeMap<String, String>>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let path = modes_path(repo);
    let _lock = TableLock::acquire(repo)?;

    let mut all: BTreeMap<String, BTreeMap<String, String>> = read_cbor(&path)?;
    for (tree, modes) in batch {
        all.insert(tree.to_hex(), modes.clone());
    }
    write_atomic(repo, &path, &all)
}

/// record git modes for one native tree
pub fn set_tree_modes(repo: &Repo, tree: &Hash, modes: &BTreeMap<String, String>) -> Result<()> {
    let mut batch = BTreeMap::new();
    batch.insert(*tree, modes.clone());
    set_tree_modes_many(repo, &batch)
}

fn insert_checked(table: &mut TableFile, entry: &MapEntry) -> Result<()> {
    let git_hex = entry.git.to_hex();
    let native_hex = entry.native.to_hex();
    let kind_name = entry.kind.name().to_string();

    if let Some((existing_native, _)) = table.git_to_native.get(&git_hex) {
        if *existing_native != native_hex {
            return Err(Error::ConflictingMapping {
                key: git_hex,
                existing: existing_native.clone(),
                incoming: native_hex,
            });
        }
        return Ok(());
    }
    if let Some((existing_git, _)) = table.native_to_git.get(&native_hex) {
        if *existing_git != git_hex {
            return Err(Error::ConflictingMapping {
                key: native_hex,
                existing: existing_git.clone(),
                incoming: git_hex,
            });
        }
        return Ok(());
    }

    table
        .git_to_native
        .insert(git_hex.clone(), (native_hex.clone(), kind_name.clone()));
    table.native_to_git.insert(native_hex, (git_hex, kind_name));
    Ok(())
}

fn with_table_lock<F>(repo: &Repo, apply: F) -> Result<()>
where
    F: FnOnce(&mut TableFile) -> Result<()>,
{
    let path = table_path(repo);
    let _lock = TableLock::acquire(repo)?;

    let mut table = read_table(&path)?;
    apply(&mut table)?;
    write_atomic(repo, &path, &table)
}

fn table_path(repo: &Repo) -> PathBuf {
    repo.maps_path().join("table")
}

fn modes_path(repo: &Repo) -> PathBuf {
    repo.maps_path().join("modes")
}

fn read_table(path: &Path) -> Result<TableFile> {
    read_cbor(path)
}

fn read_cbor<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) => Ok(ciborium::from_reader(&bytes[..])?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn write_atomic<T: Serialize>(repo: &Repo, path: &Path, value: &T) -> Result<()> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)?;

    let tmp = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp).with_path(&tmp)?;
        tmp_file.write_all(&bytes).with_path(&tmp)?;
        tmp_file.sync_all().with_path(&tmp)?;
    }
    fs::rename(&tmp, path).with_path(path)?;
    Ok(())
}

/// exclusive-create lock serializing mapping writes, with a short bounded
/// wait so concurrent pushes queue instead of failing spuriously
struct TableLock {
    path: PathBuf,
}

impl TableLock {
    fn acquire(repo: &Repo) -> Result<Self> {
        let path = repo.maps_path().join("table.lock");
        for _ in 0..100 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => {
                    return Err(Error::Io {
                        path,
                        source: e,
                    });
                }
            }
        }
        Err(Error::LockContended("mapping table".to_string()))
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
