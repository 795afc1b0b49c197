use crate::error::{Error, Result};
use crate::hash::GitHash;

/// one entry of a git tree: `"<octal_mode> <name>\0<20 raw hash bytes>"`
///
/// the mode is kept verbatim, unknown modes included, so emission is
/// byte-exact for whatever a packer produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitTreeEntry {
    pub mode: String,
    pub name: String,
    pub hash: GitHash,
}

impl GitTreeEntry {
    pub fn new(mode: impl Into<String>, name: impl Into<String>, hash: GitHash) -> Self {
        Self {
            mode: mode.into(),
            name: name.into(),
            hash,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode == super::MODE_DIR
    }

    pub fn is_gitlink(&self) -> bool {
        self.mode == super::MODE_GITLINK
    }
}

/// a git tree in wire order
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct GitTree {
    pub entries: Vec<GitTreeEntry>,
}

impl GitTree {
    /// parse canonical tree bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| malformed("missing space after mode"))?;
            let mode = std::str::from_utf8(&rest[..space])
                .map_err(|_| malformed("mode is not utf-8"))?
                .to_string();
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| malformed("missing NUL after name"))?;
            let name = std::str::from_utf8(&rest[..nul])
                .map_err(|_| malformed("name is not utf-8"))?
                .to_string();
            rest = &rest[nul + 1..];

            if rest.len() < 20 {
                return Err(malformed("truncated entry hash"));
            }
            let hash = GitHash::from_raw(&rest[..20])?;
            rest = &rest[20..];

            entries.push(GitTreeEntry { mode, name, hash });
        }

        Ok(Self { entries })
    }

    /// emit canonical tree bytes in entry order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.hash.as_bytes());
        }
        out
    }
}

fn malformed(detail: &str) -> Error {
    Error::CorruptObjectMessage(format!("tree: {}", detail))
}
