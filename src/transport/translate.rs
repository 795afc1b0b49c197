//! the address-translation core shared by both git endpoints
//!
//! ingest reifies a parsed packfile into native objects under a fixed-point
//! loop (packs are topologically unordered), recording the git ↔ native
//! mapping batch transactionally once everything resolved. emission walks
//! the other direction, substituting git addresses back into canonical bytes
//! so every object round-trips to the address the client knows.

use std::collections::{BTreeMap, HashMap};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::git::{GitCommit, GitTag, GitTree, GitTreeEntry};
use crate::hash::{compute_git_hash, GitHash, Hash};
use crate::mapping::{self, MapEntry, MappingTable};
use crate::object;
use crate::pack::{PackKind, PackObject};
use crate::repo::Repo;
use crate::types::{Commit, EntryKind, Kind, Tag, Tree, TreeEntry};

/// git → native view of one ingested push
pub type ResolvedMap = HashMap<GitHash, (Hash, Kind)>;

/// convert a parsed pack into native objects, recording mappings
///
/// blobs land immediately; trees, commits and tags wait in a deferred queue
/// until their references resolve. a full pass with no progress is fatal.
/// the mapping batch and tree-mode metadata persist only after every object
/// converted, so a failed push leaves the git view unchanged.
pub fn ingest_pack(
    repo: &Repo,
    objects: &[PackObject],
    cancel: &CancelToken,
) -> Result<ResolvedMap> {
    let table = mapping::load(repo)?;
    let mut resolved: ResolvedMap = HashMap::new();
    let mut batch: Vec<MapEntry> = Vec::new();
    let mut modes_batch: BTreeMap<Hash, BTreeMap<String, String>> = BTreeMap::new();

    // blobs first: they depend on nothing
    let mut deferred: Vec<&PackObject> = Vec::new();
    for obj in objects {
        cancel.check()?;
        if let Some((native, kind)) = lookup(&table, &resolved, &obj.hash)? {
            resolved.insert(obj.hash, (native, kind));
            continue;
        }
        match obj.kind {
            PackKind::Blob => {
                let native = object::write_blob(repo, &obj.data)?;
                resolved.insert(obj.hash, (native, Kind::Blob));
                batch.push(MapEntry::new(obj.hash, native, Kind::Blob));
            }
            _ => deferred.push(obj),
        }
    }

    // fixed point over the deferred queue
    while !deferred.is_empty() {
        let mut next = Vec::new();
        let mut progress = false;

        for obj in deferred {
            cancel.check()?;
            let converted = match obj.kind {
                PackKind::Tree => convert_tree(repo, obj, &table, &mut resolved, &mut batch)?
                    .map(|(tree, modes)| (Kind::Tree, object::encode_tree(&tree), modes)),
                PackKind::Commit => convert_commit(&obj.data, &table, &resolved)?
                    .map(|commit| (Kind::Commit, object::encode_commit(&commit), BTreeMap::new())),
                PackKind::Tag => convert_tag(&obj.data, &table, &resolved)?
                    .map(|tag| (Kind::Tag, object::encode_tag(&tag), BTreeMap::new())),
                PackKind::Blob => unreachable!("blobs never defer"),
            };

            match converted {
                Some((kind, payload, modes)) => {
                    let native = object::write(repo, kind, &payload?)?;
                    resolved.insert(obj.hash, (native, kind));
                    batch.push(MapEntry::new(obj.hash, native, kind));
                    if !modes.is_empty() {
                        modes_batch.insert(native, modes);
                    }
                    progress = true;
                }
                None => next.push(obj),
            }
        }

        if !next.is_empty() && !progress {
            return Err(Error::UnresolvedDependencies(next.len()));
        }
        deferred = next;
    }

    mapping::set_many(repo, &batch)?;
    mapping::set_tree_modes_many(repo, &modes_batch)?;

    Ok(resolved)
}

/// two-level resolver: this push's pending map first, then the table
fn lookup(
    table: &MappingTable,
    resolved: &ResolvedMap,
    git: &GitHash,
) -> Result<Option<(Hash, Kind)>> {
    if let Some(pair) = resolved.get(git) {
        return Ok(Some(*pair));
    }
    table.get_native(git)
}

/// convert one git tree; None defers until its entry hashes resolve
///
/// submodule entries whose target has no mapping become synthetic blobs of
/// `"submodule <git-hex>\n"` with a recorded blob mapping, keeping the
/// address bijection total without a dedicated tree-entry variant.
fn convert_tree(
    repo: &Repo,
    obj: &PackObject,
    table: &MappingTable,
    resolved: &mut ResolvedMap,
    batch: &mut Vec<MapEntry>,
) -> Result<Option<(Tree, BTreeMap<String, String>)>> {
    let git_tree = GitTree::parse(&obj.data)?;

    let mut entries = Vec::with_capacity(git_tree.entries.len());
    let mut modes = BTreeMap::new();

    for entry in &git_tree.entries {
        if is_dir_mode(&entry.mode) {
            let Some((subtree, _)) = lookup(table, resolved, &entry.hash)? else {
                return Ok(None);
            };
            if entry.mode != crate::git::MODE_DIR {
                modes.insert(entry.name.clone(), entry.mode.clone());
            }
            entries.push(TreeEntry::new(entry.name.clone(), EntryKind::dir(subtree)));
        } else if entry.mode == crate::git::MODE_GITLINK {
            modes.insert(entry.name.clone(), entry.mode.clone());
            let native = match lookup(table, resolved, &entry.hash)? {
                Some((native, _)) => native,
                None => {
                    let stand_in = format!("submodule {}\n", entry.hash.to_hex());
                    let native = object::write_blob(repo, stand_in.as_bytes())?;
                    resolved.insert(entry.hash, (native, Kind::Blob));
                    batch.push(MapEntry::new(entry.hash, native, Kind::Blob));
                    native
                }
            };
            entries.push(TreeEntry::new(entry.name.clone(), EntryKind::file(native)));
        } else {
            let Some((blob, _)) = lookup(table, resolved, &entry.hash)? else {
                return Ok(None);
            };
            modes.insert(entry.name.clone(), entry.mode.clone());
            entries.push(TreeEntry::new(entry.name.clone(), EntryKind::file(blob)));
        }
    }

    Ok(Some((Tree::new(entries)?, modes)))
}

fn convert_commit(
    data: &[u8],
    table: &MappingTable,
    resolved: &ResolvedMap,
) -> Result<Option<Commit>> {
    let git_commit = GitCommit::parse(data)?;

    let Some((tree, _)) = lookup(table, resolved, &git_commit.tree)? else {
        return Ok(None);
    };
    let mut parents = Vec::with_capacity(git_commit.parents.len());
    for parent in &git_commit.parents {
        let Some((native, _)) = lookup(table, resolved, parent)? else {
            return Ok(None);
        };
        parents.push(native);
    }

    Ok(Some(Commit {
        tree,
        parents,
        author: git_commit.author,
        author_time: git_commit.author_time,
        author_tz: git_commit.author_tz,
        committer: git_commit.committer,
        committer_time: git_commit.committer_time,
        committer_tz: git_commit.committer_tz,
        message: git_commit.message,
    }))
}

fn convert_tag(data: &[u8], table: &MappingTable, resolved: &ResolvedMap) -> Result<Option<Tag>> {
    let git_tag = GitTag::parse(data)?;

    let Some((target, target_kind)) = lookup(table, resolved, &git_tag.object)? else {
        return Ok(None);
    };

    // the stored payload carries the object header in native hex
    let retargeted = replace_object_header(data, &git_tag.object.to_hex(), &target.to_hex());

    Ok(Some(Tag {
        target,
        target_kind: target_kind.name().to_string(),
        name: git_tag.name,
        tagger: git_tag.tagger,
        data: retargeted,
    }))
}

/// swap the hex after `object ` in a canonical tag payload
fn replace_object_header(data: &[u8], old_hex: &str, new_hex: &str) -> Vec<u8> {
    let needle = format!("object {}", old_hex);
    let replacement = format!("object {}", new_hex);
    let text = String::from_utf8_lossy(data);
    match text.find(&needle) {
        Some(pos) => {
            let mut out = Vec::with_capacity(data.len());
            out.extend_from_slice(&data[..pos]);
            out.extend_from_slice(replacement.as_bytes());
            out.extend_from_slice(&data[pos + needle.len()..]);
            out
        }
        None => data.to_vec(),
    }
}

fn is_dir_mode(mode: &str) -> bool {
    mode.trim_start_matches('0') == "40000"
}

/// emit one native object as git bytes under its mapped address
///
/// returns None for synthetic submodule stand-ins, which never travel in a
/// pack (the tree references the gitlink hash directly). any other mismatch
/// between emitted bytes and the mapped address is a broken graph.
pub fn native_to_git(
    repo: &Repo,
    table: &MappingTable,
    native: &Hash,
) -> Result<Option<(PackKind, Vec<u8>, GitHash)>> {
    let Some((git_hash, _)) = table.get_git(native)? else {
        return Err(Error::UnmappedNative(*native));
    };

    let (kind, payload) = object::read(repo, native)?;
    let (pack_kind, bytes) = match kind {
        Kind::Blob => (PackKind::Blob, payload),
        Kind::Tree => {
            let tree = object::decode_tree(&payload)?;
            (PackKind::Tree, emit_tree_bytes(repo, table, native, &tree)?)
        }
        Kind::Commit => {
            let commit = object::decode_commit(&payload)?;
            (PackKind::Commit, emit_commit_bytes(table, &commit)?)
        }
        Kind::Tag => {
            let tag = object::decode_tag(&payload)?;
            (PackKind::Tag, emit_tag_bytes(table, &tag)?)
        }
        Kind::Entity | Kind::EntityList => {
            return Err(Error::CorruptObjectGraph(format!(
                "{} kind {} has a git mapping but no git form",
                native, kind
            )));
        }
    };

    let computed = compute_git_hash(pack_kind.name(), &bytes);
    if computed == git_hash {
        return Ok(Some((pack_kind, bytes, git_hash)));
    }

    let stand_in = format!("submodule {}\n", git_hash.to_hex());
    if pack_kind == PackKind::Blob && bytes == stand_in.as_bytes() {
        return Ok(None);
    }

    Err(Error::CorruptObjectGraph(format!(
        "object {} maps to {} but its bytes hash to {}",
        native, git_hash, computed
    )))
}

/// git tree bytes for a native tree, modes restored from metadata
///
/// entity lists have no git representation and are dropped from the entry;
/// files default to `100644` and directories to `40000` when no recorded
/// mode overrides them.
pub fn emit_tree_bytes(
    repo: &Repo,
    table: &MappingTable,
    native: &Hash,
    tree: &Tree,
) -> Result<Vec<u8>> {
    let modes = mapping::tree_modes(repo, native)?.unwrap_or_default();

    let mut entries = Vec::with_capacity(tree.len());
    for entry in tree.entries() {
        let target = entry.target();
        let Some((git_hash, _)) = table.get_git(&target)? else {
            return Err(Error::UnmappedNative(target));
        };
        let mode = match modes.get(&entry.name) {
            Some(mode) => mode.clone(),
            None if entry.is_dir() => crate::git::MODE_DIR.to_string(),
            None => crate::git::MODE_FILE.to_string(),
        };
        entries.push(GitTreeEntry::new(mode, entry.name.clone(), git_hash));
    }

    Ok(GitTree { entries }.to_bytes())
}

/// git commit bytes for a native commit, committer defaulting applied
///
/// commits that crossed the git boundary carry every field, so this
/// reproduces their original bytes; native-born commits with blank fields
/// get a valid committer synthesised from the author.
pub fn emit_commit_bytes(table: &MappingTable, commit: &Commit) -> Result<Vec<u8>> {
    let Some((tree, _)) = table.get_git(&commit.tree)? else {
        return Err(Error::UnmappedNative(commit.tree));
    };
    let mut parents = Vec::with_capacity(commit.parents.len());
    for parent in &commit.parents {
        let Some((git_hash, _)) = table.get_git(parent)? else {
            return Err(Error::UnmappedNative(*parent));
        };
        parents.push(git_hash);
    }

    let author_tz = if commit.author_tz.is_empty() {
        "+0000"
    } else {
        &commit.author_tz
    };

    let (committer, committer_time, committer_tz) = if commit.committer.is_empty() {
        let time = if commit.committer_time == 0 {
            commit.author_time
        } else {
            commit.committer_time
        };
        let tz = if commit.committer_tz.is_empty() {
            author_tz
        } else {
            &commit.committer_tz
        };
        (commit.author.as_str(), time, tz)
    } else {
        let tz = if commit.committer_tz.is_empty() {
            "+0000"
        } else {
            &commit.committer_tz
        };
        (commit.committer.as_str(), commit.committer_time, tz)
    };

    let git_commit = GitCommit {
        tree,
        parents,
        author: commit.author.clone(),
        author_time: commit.author_time,
        author_tz: author_tz.to_string(),
        committer: committer.to_string(),
        committer_time,
        committer_tz: committer_tz.to_string(),
        message: commit.message.clone(),
    };
    Ok(git_commit.to_bytes())
}

/// git tag bytes: the stored payload with the object header swapped back
pub fn emit_tag_bytes(table: &MappingTable, tag: &Tag) -> Result<Vec<u8>> {
    let Some((git_hash, _)) = table.get_git(&tag.target)? else {
        return Err(Error::UnmappedNative(tag.target));
    };
    Ok(replace_object_header(
        &tag.data,
        &tag.target.to_hex(),
        &git_hash.to_hex(),
    ))
}
