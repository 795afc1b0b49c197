use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object;
use crate::repo::Repo;
use crate::types::Kind;

/// traversal options
#[derive(Clone, Copy, Debug, Default)]
pub struct WalkOptions {
    /// fan out into entity lists and entities; the git transport leaves this
    /// off because those kinds have no git representation
    pub entities: bool,
}

/// enumerate objects reachable from `root`, skipping the `has` set
///
/// depth-first; each address appears at most once and never one the caller
/// already has. a missing object fails the whole walk naming the address.
pub fn walk(
    repo: &Repo,
    root: &Hash,
    has: &dyn Fn(&Hash) -> bool,
    opts: WalkOptions,
) -> Result<Vec<Hash>> {
    let mut stack = vec![*root];
    let mut visited: HashSet<Hash> = HashSet::new();
    let mut out = Vec::new();

    while let Some(hash) = stack.pop() {
        if visited.contains(&hash) || has(&hash) {
            continue;
        }
        visited.insert(hash);

        let (kind, payload) = match object::read(repo, &hash) {
            Ok(pair) => pair,
            Err(Error::ObjectNotFound(hex)) => {
                return Err(Error::CorruptObjectGraph(format!("missing object {}", hex)));
            }
            Err(e) => return Err(e),
        };
        out.push(hash);

        match kind {
            Kind::Blob | Kind::Entity => {}
            Kind::Commit => {
                let commit = object::decode_commit(&payload)?;
                stack.push(commit.tree);
                stack.extend(commit.parents);
            }
            Kind::Tree => {
                let tree = object::decode_tree(&payload)?;
                for entry in tree.entries() {
                    match &entry.kind {
                        crate::types::EntryKind::Dir { tree } => stack.push(*tree),
                        crate::types::EntryKind::File { blob, entity_list } => {
                            stack.push(*blob);
                            if opts.entities {
                                if let Some(list) = entity_list {
                                    stack.push(*list);
                                }
                            }
                        }
                    }
                }
            }
            Kind::Tag => {
                let tag = object::decode_tag(&payload)?;
                stack.push(tag.target);
            }
            Kind::EntityList => {
                let list = object::decode_entity_list(&payload)?;
                stack.extend(list.entities);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Commit, EntityList, EntryKind, Tree, TreeEntry};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path).unwrap();
        (dir, repo)
    }

    fn none(_: &Hash) -> bool {
        false
    }

    /// blob in a subtree in a tree under a commit
    fn seed_commit(repo: &Repo) -> (Hash, Hash, Hash, Hash) {
        let blob = object::write_blob(repo, b"content").unwrap();
        let subtree = object::write_tree(
            repo,
            &Tree::new(vec![TreeEntry::new("file.txt", EntryKind::file(blob))]).unwrap(),
        )
        .unwrap();
        let root = object::write_tree(
            repo,
            &Tree::new(vec![TreeEntry::new("dir", EntryKind::dir(subtree))]).unwrap(),
        )
        .unwrap();
        let commit = object::write_commit(
            repo,
            &Commit::new(root, vec![], "a <a@x>", 1, "+0000", "m"),
        )
        .unwrap();
        (commit, root, subtree, blob)
    }

    #[test]
    fn test_walk_reaches_closure() {
        let (_dir, repo) = test_repo();
        let (commit, root, subtree, blob) = seed_commit(&repo);

        let walked = walk(&repo, &commit, &none, WalkOptions::default()).unwrap();
        let set: HashSet<Hash> = walked.iter().copied().collect();

        assert_eq!(walked.len(), set.len(), "no duplicates");
        for expected in [commit, root, subtree, blob] {
            assert!(set.contains(&expected));
        }
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_walk_minimality_against_has() {
        let (_dir, repo) = test_repo();
        let (commit, root, subtree, blob) = seed_commit(&repo);

        let has = move |h: &Hash| *h == subtree || *h == blob;
        let walked = walk(&repo, &commit, &has, WalkOptions::default()).unwrap();
        let set: HashSet<Hash> = walked.iter().copied().collect();

        assert!(set.contains(&commit));
        assert!(set.contains(&root));
        assert!(!set.contains(&subtree));
        assert!(!set.contains(&blob));
    }

    #[test]
    fn test_walk_follows_parents() {
        let (_dir, repo) = test_repo();
        let (first, ..) = seed_commit(&repo);

        let root = object::write_tree(&repo, &Tree::empty()).unwrap();
        let second = object::write_commit(
            &repo,
            &Commit::new(root, vec![first], "a <a@x>", 2, "+0000", "child"),
        )
        .unwrap();

        let walked = walk(&repo, &second, &none, WalkOptions::default()).unwrap();
        let set: HashSet<Hash> = walked.iter().copied().collect();
        assert!(set.contains(&first));
        assert!(set.contains(&second));
    }

    #[test]
    fn test_walk_missing_object_names_address() {
        let (_dir, repo) = test_repo();

        let dangling = Hash::from_bytes([0x77; 32]);
        let commit = object::write_commit(
            &repo,
            &Commit::new(dangling, vec![], "a <a@x>", 1, "+0000", "broken"),
        )
        .unwrap();

        let result = walk(&repo, &commit, &none, WalkOptions::default());
        match result {
            Err(Error::CorruptObjectGraph(detail)) => {
                assert!(detail.contains(&dangling.to_hex()));
            }
            other => panic!("expected CorruptObjectGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_walk_entity_fanout_is_opt_in() {
        let (_dir, repo) = test_repo();

        let entity = object::write_entity(
            &repo,
            &crate::types::Entity {
                kind: crate::types::EntityKind::Declaration,
                name: "F".to_string(),
                decl_kind: "func".to_string(),
                receiver: String::new(),
                body: b"func F() {}".to_vec(),
                body_hash: crate::hash::compute_stored_hash(b"func F() {}"),
            },
        )
        .unwrap();
        let list =
            object::write_entity_list(&repo, &EntityList::new("go", "main.go", vec![entity]))
                .unwrap();
        let blob = object::write_blob(&repo, b"package main").unwrap();
        let tree = object::write_tree(
            &repo,
            &Tree::new(vec![TreeEntry::new(
                "main.go",
                EntryKind::File {
                    blob,
                    entity_list: Some(list),
                },
            )])
            .unwrap(),
        )
        .unwrap();
        let commit = object::write_commit(
            &repo,
            &Commit::new(tree, vec![], "a <a@x>", 1, "+0000", "m"),
        )
        .unwrap();

        let without = walk(&repo, &commit, &none, WalkOptions::default()).unwrap();
        let set: HashSet<Hash> = without.iter().copied().collect();
        assert!(!set.contains(&list));
        assert!(!set.contains(&entity));

        let with = walk(&repo, &commit, &none, WalkOptions { entities: true }).unwrap();
        let set: HashSet<Hash> = with.iter().copied().collect();
        assert!(set.contains(&list));
        assert!(set.contains(&entity));
    }

    #[test]
    fn test_walk_follows_tag_target(){
        let (_dir, repo) = test_repo();
        let (commit, ..) = seed_commit(&repo);

        let tag = object::write_tag(
            &repo,
            &crate::types::Tag::new(commit, Kind::Commit, "v1", "", b"payload".to_vec()),
        )
        .unwrap();

        let walked = walk(&repo, &tag, &none, WalkOptions::default()).unwrap();
        let set: HashSet<Hash> = walked.iter().copied().collect();
        assert!(set.contains(&tag));
        assert!(set.contains(&commit));
    }
}
