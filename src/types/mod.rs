mod commit;
mod entity;
mod tag;
mod tree;

pub use commit::Commit;
pub use entity::{Entity, EntityKind, EntityList};
pub use tag::Tag;
pub use tree::{EntryKind, Tree, TreeEntry};

use crate::error::{Error, Result};

/// native object kinds
///
/// the tag byte is the first byte of the stored form and is covered by the
/// address hash; it also discriminates encoding versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Blob,
    Tree,
    Commit,
    Tag,
    Entity,
    EntityList,
}

impl Kind {
    /// tag byte prefixed to the canonical payload
    pub fn tag(self) -> u8 {
        match self {
            Kind::Blob => 1,
            Kind::Tree => 2,
            Kind::Commit => 3,
            Kind::Tag => 4,
            Kind::Entity => 5,
            Kind::EntityList => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Kind::Blob),
            2 => Ok(Kind::Tree),
            3 => Ok(Kind::Commit),
            4 => Ok(Kind::Tag),
            5 => Ok(Kind::Entity),
            6 => Ok(Kind::EntityList),
            other => Err(Error::InvalidObjectType(format!("tag byte {}", other))),
        }
    }

    /// wire name used by the native protocol and the `X-Object-Type` header
    pub fn name(self) -> &'static str {
        match self {
            Kind::Blob => "blob",
            Kind::Tree => "tree",
            Kind::Commit => "commit",
            Kind::Tag => "tag",
            Kind::Entity => "entity",
            Kind::EntityList => "entity_list",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "blob" => Ok(Kind::Blob),
            "tree" => Ok(Kind::Tree),
            "commit" => Ok(Kind::Commit),
            "tag" => Ok(Kind::Tag),
            "entity" => Ok(Kind::Entity),
            "entity_list" => Ok(Kind::EntityList),
            other => Err(Error::InvalidObjectType(other.to_string())),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_roundtrip() {
        for kind in [
            Kind::Blob,
            Kind::Tree,
            Kind::Commit,
            Kind::Tag,
            Kind::Entity,
            Kind::EntityList,
        ] {
            assert_eq!(Kind::from_tag(kind.tag()).unwrap(), kind);
            assert_eq!(Kind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_unknown() {
        assert!(Kind::from_tag(0).is_err());
        assert!(Kind::from_tag(7).is_err());
        assert!(Kind::from_name("gitlink").is_err());
    }
}
