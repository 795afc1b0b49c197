use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::types::Kind;

/// an annotated tag
///
/// `data` holds the canonical git-style tag payload with its `object` header
/// expressed in native hex, so the exact wire bytes reproduce on fetch once
/// the address is substituted back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// tagged object
    pub target: Hash,
    /// kind of the tagged object
    pub target_kind: String,
    /// tag name
    pub name: String,
    /// tagger identity line, empty when the source had none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tagger: String,
    /// canonical tag payload
    pub data: Vec<u8>,
}

impl Tag {
    pub fn new(
        target: Hash,
        target_kind: Kind,
        name: impl Into<String>,
        tagger: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            target,
            target_kind: target_kind.name().to_string(),
            name: name.into(),
            tagger: tagger.into(),
            data,
        }
    }

    pub fn target_kind(&self) -> crate::Result<Kind> {
        Kind::from_name(&self.target_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_cbor_roundtrip() {
        let tag = Tag::new(
            Hash::from_bytes([7; 32]),
            Kind::Commit,
            "v1.0.0",
            "Alice <a@x> 1700000000 +0000",
            b"object aa\ntype commit\ntag v1.0.0\n\nrelease\n".to_vec(),
        );

        let mut bytes = Vec::new();
        ciborium::into_writer(&tag, &mut bytes).unwrap();
        let parsed: Tag = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(tag, parsed);
        assert_eq!(parsed.target_kind().unwrap(), Kind::Commit);
    }
}
