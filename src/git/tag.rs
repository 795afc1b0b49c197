use crate::error::{Error, Result};
use crate::hash::GitHash;

/// an annotated git tag as it appears on the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitTag {
    pub object: GitHash,
    pub target_kind: String,
    pub name: String,
    /// full tagger line body, empty when absent
    pub tagger: String,
    pub message: String,
}

impl GitTag {
    /// parse canonical tag bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::CorruptObjectMessage("tag is not utf-8".to_string()))?;

        let (headers, message) = match text.find("\n\n") {
            Some(pos) => (&text[..pos], &text[pos + 2..]),
            None => {
                return Err(Error::CorruptObjectMessage(
                    "tag missing blank line before message".to_string(),
                ))
            }
        };

        let mut object = None;
        let mut target_kind = None;
        let mut name = None;
        let mut tagger = String::new();

        for line in headers.lines() {
            if let Some(rest) = line.strip_prefix("object ") {
                object = Some(GitHash::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("type ") {
                target_kind = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("tag ") {
                name = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("tagger ") {
                tagger = rest.to_string();
            }
        }

        Ok(Self {
            object: object
                .ok_or_else(|| Error::CorruptObjectMessage("tag missing object".to_string()))?,
            target_kind: target_kind
                .ok_or_else(|| Error::CorruptObjectMessage("tag missing type".to_string()))?,
            name: name.ok_or_else(|| Error::CorruptObjectMessage("tag missing name".to_string()))?,
            tagger,
            message: message.to_string(),
        })
    }

    /// emit canonical tag bytes; an absent tagger stays absent
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.object.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_kind.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(self.name.as_bytes());
        out.push(b'\n');
        if !self.tagger.is_empty() {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(self.tagger.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
        out
    }
}
