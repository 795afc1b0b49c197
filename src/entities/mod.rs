//! entity extraction interface and the tree rewriter that applies it

pub mod rewrite;

pub use rewrite::{rewrite_commit, RewriteOutcome};

use crate::hash::Hash;
use crate::types::EntityKind;

/// one extracted source-code unit, as reported by the parser
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub name: String,
    pub decl_kind: String,
    pub receiver: String,
    pub body: Vec<u8>,
    pub body_hash: Hash,
}

/// external collaborator that parses a source file into entities
///
/// extraction is best-effort: a file the parser cannot handle yields an
/// empty list, never an error. a no-op implementation must work end-to-end.
pub trait EntityExtractor {
    /// returns the detected language and the ordered entity records
    fn extract(&self, path: &str, bytes: &[u8]) -> (String, Vec<EntityRecord>);
}

/// extractor that never yields entities; every file stays a plain leaf
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExtractor;

impl EntityExtractor for NoopExtractor {
    fn extract(&self, _path: &str, _bytes: &[u8]) -> (String, Vec<EntityRecord>) {
        (String::new(), Vec::new())
    }
}
