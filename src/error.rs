use std::path::PathBuf;

use crate::hash::{GitHash, Hash};

/// error type for got-store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("ref lock contended: {0}")]
    LockContended(String),

    #[error("ref {name}: expected {expected}, got {actual}")]
    CasMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("authentication required")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(Hash),

    #[error("corrupt object: {0}")]
    CorruptObjectMessage(String),

    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },

    #[error("missing referenced object {referenced} (kind {kind}) from {referrer}")]
    MissingReference {
        referrer: String,
        referenced: String,
        kind: &'static str,
    },

    #[error("conflicting mapping for {key}: {existing} vs {incoming}")]
    ConflictingMapping {
        key: String,
        existing: String,
        incoming: String,
    },

    #[error("no git mapping for native object {0}")]
    UnmappedNative(Hash),

    #[error("no native mapping for git object {0}")]
    UnmappedGit(GitHash),

    #[error("unresolved object dependencies after fixed point: {0} objects remain")]
    UnresolvedDependencies(usize),

    #[error("unresolved delta base {0}")]
    UnresolvedDelta(String),

    #[error("delta copy out of bounds: offset {offset} size {size} base {base_len}")]
    DeltaOutOfBounds {
        offset: usize,
        size: usize,
        base_len: usize,
    },

    #[error("delta result size mismatch: expected {expected}, got {actual}")]
    DeltaSizeMismatch { expected: usize, actual: usize },

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("malformed pack: {0}")]
    MalformedPack(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request too large: {actual} bytes exceeds cap of {limit}")]
    RequestTooLarge { limit: usize, actual: usize },

    #[error("invalid object graph: {0}")]
    CorruptObjectGraph(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("lineage indexing failed: {0}")]
    IndexerFailure(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status the native transport maps this error to
    pub fn http_status(&self) -> u16 {
        match self {
            Error::RequestTooLarge { .. } => 413,
            Error::MalformedRequest(_)
            | Error::MalformedPack(_)
            | Error::InvalidHashHex(_)
            | Error::InvalidRef(_)
            | Error::InvalidObjectType(_)
            | Error::InvalidEntryName(_)
            | Error::DuplicateEntryName(_)
            | Error::HashMismatch { .. }
            | Error::MissingReference { .. } => 400,
            Error::Unauthorized => 401,
            Error::Forbidden => 403,
            Error::NoRepo(_) | Error::RefNotFound(_) | Error::ObjectNotFound(_) => 404,
            Error::CasMismatch { .. } => 409,
            Error::CorruptObjectGraph(_) => 422,
            _ => 500,
        }
    }

    /// stable machine-readable code for native JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::RequestTooLarge { .. } => "request_too_large",
            Error::MalformedRequest(_) | Error::MalformedPack(_) => "malformed_request",
            Error::Unauthorized => "unauthorized",
            Error::Forbidden => "forbidden",
            Error::NoRepo(_) => "repo_not_found",
            Error::RefNotFound(_) => "ref_not_found",
            Error::ObjectNotFound(_) => "object_not_found",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::MissingReference { .. } => "missing_reference",
            Error::CasMismatch { .. } => "ref_conflict",
            Error::CorruptObjectGraph(_) => "invalid_object_graph",
            Error::InvalidRef(_) => "invalid_ref",
            Error::InvalidObjectType(_) => "invalid_object_type",
            Error::InvalidHashHex(_) => "invalid_hash",
            Error::Cancelled => "cancelled",
            _ => "internal",
        }
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
