//! protocol handlers for both transports
//!
//! the host HTTP layer routes requests here after authentication and repo
//! resolution; handlers take the repository, the request body, and the
//! collaborators, and return a ready-to-send [`Response`]. no handler touches
//! routing, TLS, or user metadata.

pub mod git;
pub mod gotpack;
pub mod native;
pub mod translate;

use crate::cancel::CancelToken;
use crate::entities::EntityExtractor;
use crate::error::Error;
use crate::hash::Hash;
use crate::repo::Repo;

/// protocol version advertised in `Got-Protocol`
pub const GOT_PROTOCOL_VERSION: &str = "1";
/// capabilities advertised in `Got-Capabilities`
pub const GOT_CAPABILITIES: &str = "pack,zstd,sideband";

/// content types
pub const CT_JSON: &str = "application/json";
pub const CT_OCTET: &str = "application/octet-stream";
pub const CT_GOT_PACK: &str = "application/x-got-pack";
pub const CT_UPLOAD_PACK_RESULT: &str = "application/x-git-upload-pack-result";
pub const CT_RECEIVE_PACK_RESULT: &str = "application/x-git-receive-pack-result";

/// a transport-agnostic HTTP response
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// commit lineage indexer invoked synchronously on ref updates
///
/// background indexing of history is the collaborator's concern; the
/// handlers only guarantee the synchronous call and that its failure fails
/// the ref update.
pub trait LineageIndexer {
    fn index_commit(&self, repo: &Repo, commit: &Hash) -> std::result::Result<(), String>;
}

/// collaborators shared by both protocol handlers
pub struct HandlerContext<'a> {
    pub extractor: &'a dyn EntityExtractor,
    pub indexer: Option<&'a dyn LineageIndexer>,
    pub cancel: &'a CancelToken,
}

impl<'a> HandlerContext<'a> {
    pub fn new(extractor: &'a dyn EntityExtractor, cancel: &'a CancelToken) -> Self {
        Self {
            extractor,
            indexer: None,
            cancel,
        }
    }

    pub fn with_indexer(mut self, indexer: &'a dyn LineageIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

/// fail with `RequestTooLarge` before any further work
pub fn check_cap(actual: usize, limit: usize) -> crate::Result<()> {
    if actual > limit {
        Err(Error::RequestTooLarge { limit, actual })
    } else {
        Ok(())
    }
}

/// native-protocol headers attached to every response
pub fn got_headers(repo: &Repo, response: Response) -> Response {
    let limits = repo.limits();
    response
        .with_header("Got-Protocol", GOT_PROTOCOL_VERSION)
        .with_header("Got-Capabilities", GOT_CAPABILITIES)
        .with_header(
            "Got-Limits",
            format!(
                "max_batch={},max_payload={},max_object={}",
                limits.native_batch_max, limits.native_push_bytes, limits.native_object_bytes
            ),
        )
}

/// structured JSON error for the native transport
pub fn json_error(repo: &Repo, err: &Error) -> Response {
    let mut body = serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    if let Error::CasMismatch {
        expected, actual, ..
    } = err
    {
        body["detail"] = serde_json::json!(format!("expected {}, got {}", expected, actual));
    }
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    got_headers(repo, Response::new(err.http_status(), CT_JSON, bytes))
}

/// JSON success body for the native transport
pub fn json_ok(repo: &Repo, value: &serde_json::Value) -> Response {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    got_headers(repo, Response::new(200, CT_JSON, bytes))
}
