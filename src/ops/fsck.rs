use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::mapping;
use crate::object;
use crate::refs;
use crate::repo::Repo;
use crate::types::{EntryKind, Kind};

/// fsck report
#[derive(Debug, Default)]
pub struct FsckReport {
    /// refs resolved
    pub refs_checked: usize,
    /// objects read and verified
    pub objects_checked: usize,
    /// corrupt objects (stored bytes do not hash to their address)
    pub corrupt_objects: Vec<String>,
    /// addresses referenced but absent, with the referrer
    pub missing_objects: Vec<String>,
    /// objects on disk unreachable from any ref
    pub dangling_objects: Vec<Hash>,
    /// address-mapping entries that fail the round-trip check
    pub broken_mappings: Vec<String>,
}

impl FsckReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt_objects.is_empty()
            && self.missing_objects.is_empty()
            && self.broken_mappings.is_empty()
    }
}

/// verify repository integrity: every ref resolves, every reachable object
/// decodes under its address, closure holds, and the mapping table is a
/// bijection consistent with the stored kinds
pub fn fsck(repo: &Repo) -> Result<FsckReport> {
    let mut report = FsckReport::default();
    let mut reachable: HashSet<Hash> = HashSet::new();

    for (name, root) in refs::list(repo, "")? {
        report.refs_checked += 1;
        check_object(repo, &root, &format!("ref {}", name), &mut reachable, &mut report);
    }

    // everything on disk that no ref reaches
    for path in repo.backend().list("objects")? {
        let hex: String = path
            .trim_start_matches("objects/")
            .split('/')
            .collect::<Vec<_>>()
            .join("");
        if let Ok(hash) = Hash::from_hex(&hex) {
            if !reachable.contains(&hash) {
                report.dangling_objects.push(hash);
            }
        }
    }

    // mapping coherence for every reachable object with a git view
    let table = mapping::load(repo)?;
    for hash in &reachable {
        if let Some((git_hash, _)) = table.get_git(hash)? {
            match table.get_native(&git_hash)? {
                Some((native, _)) if native == *hash => {}
                other => {
                    report.broken_mappings.push(format!(
                        "{} -> {} -> {:?}",
                        hash, git_hash, other
                    ));
                }
            }
        }
    }

    Ok(report)
}

/// read and verify one object, then queue what it references
fn check_object(
    repo: &Repo,
    root: &Hash,
    root_referrer: &str,
    reachable: &mut HashSet<Hash>,
    report: &mut FsckReport,
) {
    let mut stack: Vec<(Hash, String)> = vec![(*root, root_referrer.to_string())];

    while let Some((hash, referrer)) = stack.pop() {
        if !reachable.insert(hash) {
            continue;
        }

        let (kind, payload) = match object::read(repo, &hash) {
            Ok(pair) => pair,
            Err(Error::ObjectNotFound(hex)) => {
                report
                    .missing_objects
                    .push(format!("{} referenced by {}", hex, referrer));
                continue;
            }
            Err(e) => {
                report.corrupt_objects.push(format!("{}: {}", hash, e));
                continue;
            }
        };
        report.objects_checked += 1;

        let decoded: Result<()> = (|| {
            match kind {
                Kind::Blob | Kind::Entity => {}
                Kind::Commit => {
                    let commit = object::decode_commit(&payload)?;
                    stack.push((commit.tree, format!("commit {}", hash)));
                    for parent in commit.parents {
                        stack.push((parent, format!("commit {}", hash)));
                    }
                }
                Kind::Tree => {
                    let tree = object::decode_tree(&payload)?;
                    for entry in tree.entries() {
                        let referrer = format!("tree {}", hash);
                        match &entry.kind {
                            EntryKind::Dir { tree } => stack.push((*tree, referrer)),
                            EntryKind::File { blob, entity_list } => {
                                stack.push((*blob, referrer.clone()));
                                if let Some(list) = entity_list {
                                    stack.push((*list, referrer));
                                }
                            }
                        }
                    }
                }
                Kind::Tag => {
                    let tag = object::decode_tag(&payload)?;
                    stack.push((tag.target, format!("tag {}", hash)));
                }
                Kind::EntityList => {
                    let list = object::decode_entity_list(&payload)?;
                    for entity in list.entities {
                        stack.push((entity, format!("entity list {}", hash)));
                    }
                }
            }
            Ok(())
        })();

        if let Err(e) = decoded {
            report.corrupt_objects.push(format!("{}: {}", hash, e));
        }
    }
}
