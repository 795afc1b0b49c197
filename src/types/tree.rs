use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::Hash;

/// a directory tree
///
/// entry order is preserved verbatim; trees that crossed the git boundary
/// keep git's name ordering so the original bytes reproduce on fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating entries without reordering them
    pub fn new(entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }

        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        for window in names.windows(2) {
            if window[0] == window[1] {
                return Err(Error::DuplicateEntryName(window[0].to_string()));
            }
        }

        Ok(Self { entries })
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// consume and return entries
    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// validate an entry name
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!(
            "name contains '/': {}",
            name
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {}", name)));
    }
    Ok(())
}

/// a single entry in a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Dir { .. })
    }

    /// the hash this entry points at (subtree or blob)
    pub fn target(&self) -> Hash {
        match &self.kind {
            EntryKind::Dir { tree } => *tree,
            EntryKind::File { blob, .. } => *blob,
        }
    }
}

/// kind of tree entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    /// subdirectory
    Dir { tree: Hash },
    /// file leaf, optionally carrying its extracted entity list
    File {
        blob: Hash,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        entity_list: Option<Hash>,
    },
}

impl EntryKind {
    pub fn file(blob: Hash) -> Self {
        EntryKind::File {
            blob,
            entity_list: None,
        }
    }

    pub fn dir(tree: Hash) -> Self {
        EntryKind::Dir { tree }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    #[test]
    fn test_tree_preserves_order() {
        let tree = Tree::new(vec![
            TreeEntry::new("zebra", EntryKind::file(h(1))),
            TreeEntry::new("apple", EntryKind::file(h(2))),
        ])
        .unwrap();

        let names: Vec<&str> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zebra", "apple"]);
    }

    #[test]
    fn test_tree_duplicate_name() {
        let result = Tree::new(vec![
            TreeEntry::new("same", EntryKind::file(h(1))),
            TreeEntry::new("same", EntryKind::dir(h(2))),
        ]);
        assert!(matches!(result, Err(Error::DuplicateEntryName(_))));
    }

    #[test]
    fn test_tree_invalid_names() {
        for name in ["", "a/b", "nul\0byte", ".", ".."] {
            let result = Tree::new(vec![TreeEntry::new(name, EntryKind::file(h(1)))]);
            assert!(result.is_err(), "name {:?} should be rejected", name);
        }
    }

    #[test]
    fn test_tree_get() {
        let tree = Tree::new(vec![
            TreeEntry::new("b", EntryKind::file(h(1))),
            TreeEntry::new("a", EntryKind::dir(h(2))),
        ])
        .unwrap();

        assert_eq!(tree.get("a").unwrap().target(), h(2));
        assert!(tree.get("a").unwrap().is_dir());
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn test_entry_entity_list_cbor_roundtrip() {
        let entry = TreeEntry::new(
            "main.go",
            EntryKind::File {
                blob: h(3),
                entity_list: Some(h(4)),
            },
        );

        let mut bytes = Vec::new();
        ciborium::into_writer(&entry, &mut bytes).unwrap();
        let parsed: TreeEntry = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(entry, parsed);
    }

    #[test]
    fn test_entry_without_entity_list_stable_encoding() {
        // absent entity_list and decoded-default entity_list must encode the same
        let entry = TreeEntry::new("f", EntryKind::file(h(5)));

        let mut first = Vec::new();
        ciborium::into_writer(&entry, &mut first).unwrap();
        let reparsed: TreeEntry = ciborium::from_reader(&first[..]).unwrap();
        let mut second = Vec::new();
        ciborium::into_writer(&reparsed, &mut second).unwrap();

        assert_eq!(first, second);
    }
}
