use std::collections::BTreeMap;

use crate::entities::EntityExtractor;
use crate::error::Result;
use crate::hash::Hash;
use crate::mapping;
use crate::object;
use crate::repo::Repo;
use crate::types::{Entity, EntityList, EntryKind, Tree, TreeEntry};

/// result of rewriting one branch-head commit
#[derive(Clone, Debug)]
pub struct RewriteOutcome {
    /// commit the ref should point at; equals the input when nothing changed
    pub commit: Hash,
    /// (superseded, rewritten) native address pairs, commit and trees alike,
    /// for registering git-side override mappings
    pub remapped: Vec<(Hash, Hash)>,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.remapped.is_empty()
    }
}

/// run entity extraction over a commit's tree and re-emit what changed
///
/// file entries with no entity list and a regular git mode get extracted;
/// symlinks and submodules pass through verbatim. subtrees rewrite
/// depth-first and a parent is re-emitted iff a child changed. tree-mode
/// metadata follows each rewritten tree to its new address.
pub fn rewrite_commit(
    repo: &Repo,
    commit_hash: &Hash,
    extractor: &dyn EntityExtractor,
) -> Result<RewriteOutcome> {
    let commit = object::read_commit(repo, commit_hash)?;
    let mut remapped = Vec::new();

    let new_tree = rewrite_tree(repo, &commit.tree, "", extractor, &mut remapped)?;

    let Some(new_tree) = new_tree else {
        return Ok(RewriteOutcome {
            commit: *commit_hash,
            remapped,
        });
    };

    let mut rewritten = commit;
    rewritten.tree = new_tree;
    let new_commit = object::write_commit(repo, &rewritten)?;
    remapped.push((*commit_hash, new_commit));

    Ok(RewriteOutcome {
        commit: new_commit,
        remapped,
    })
}

/// rewrite one tree; returns the new address when anything below it changed
fn rewrite_tree(
    repo: &Repo,
    tree_hash: &Hash,
    prefix: &str,
    extractor: &dyn EntityExtractor,
    remapped: &mut Vec<(Hash, Hash)>,
) -> Result<Option<Hash>> {
    let tree = object::read_tree(repo, tree_hash)?;
    let modes = mapping::tree_modes(repo, tree_hash)?;

    let mut changed = false;
    let mut entries = Vec::with_capacity(tree.len());

    for entry in tree.into_entries() {
        let path = join_path(prefix, &entry.name);
        match entry.kind {
            EntryKind::Dir { tree: subtree } => {
                match rewrite_tree(repo, &subtree, &path, extractor, remapped)? {
                    Some(new_subtree) => {
                        changed = true;
                        entries.push(TreeEntry::new(entry.name, EntryKind::dir(new_subtree)));
                    }
                    None => entries.push(TreeEntry::new(entry.name, EntryKind::dir(subtree))),
                }
            }
            EntryKind::File {
                blob,
                entity_list: Some(list),
            } => {
                // already extracted
                entries.push(TreeEntry::new(
                    entry.name,
                    EntryKind::File {
                        blob,
                        entity_list: Some(list),
                    },
                ));
            }
            EntryKind::File {
                blob,
                entity_list: None,
            } => {
                if !mode_eligible(&modes, &entry.name) {
                    entries.push(TreeEntry::new(entry.name, EntryKind::file(blob)));
                    continue;
                }

                let bytes = object::read_blob(repo, &blob)?;
                let (language, records) = extractor.extract(&path, &bytes);
                if records.is_empty() {
                    entries.push(TreeEntry::new(entry.name, EntryKind::file(blob)));
                    continue;
                }

                let mut entity_hashes = Vec::with_capacity(records.len());
                for record in records {
                    let entity = Entity {
                        kind: record.kind,
                        name: record.name,
                        decl_kind: record.decl_kind,
                        receiver: record.receiver,
                        body: record.body,
                        body_hash: record.body_hash,
                    };
                    entity_hashes.push(object::write_entity(repo, &entity)?);
                }
                let list = EntityList::new(language, path.clone(), entity_hashes);
                let list_hash = object::write_entity_list(repo, &list)?;

                changed = true;
                entries.push(TreeEntry::new(
                    entry.name,
                    EntryKind::File {
                        blob,
                        entity_list: Some(list_hash),
                    },
                ));
            }
        }
    }

    if !changed {
        return Ok(None);
    }

    let new_hash = object::write_tree(repo, &Tree::new(entries)?)?;
    if let Some(modes) = modes {
        mapping::set_tree_modes(repo, &new_hash, &modes)?;
    }
    remapped.push((*tree_hash, new_hash));
    Ok(Some(new_hash))
}

/// regular files get extracted; symlinks and submodules pass through.
/// trees that never crossed the git boundary carry no mode metadata and
/// count as regular.
fn mode_eligible(modes: &Option<BTreeMap<String, String>>, name: &str) -> bool {
    match modes {
        None => true,
        Some(map) => match map.get(name) {
            None => true,
            Some(mode) => mode == crate::git::MODE_FILE || mode == crate::git::MODE_EXECUTABLE,
        },
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
