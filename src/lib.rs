//! got-store - bare-repository hosting core
//!
//! a content-addressed object store shared by many repositories, served over
//! two wire protocols: git smart-HTTP for standard clients and a native
//! transport that exposes the richer object model, including code-entity
//! objects extracted from source files.
//!
//! # Core concepts
//!
//! - **Blob / Tree / Commit / Tag**: the familiar graph, addressed by
//!   SHA-256 over a type-tagged canonical encoding (CBOR for structured
//!   kinds)
//! - **Entity / EntityList**: parsed source-code units attached to file
//!   entries by the tree rewriter
//! - **Address mapping**: a per-repository bijection between 20-byte git
//!   addresses and 32-byte native addresses, kept coherent across pushes,
//!   fetches, and entity rewrites
//! - **Ref**: a named pointer to a commit, updated atomically via lock files
//!   with optional compare-and-swap
//!
//! # Example usage
//!
//! ```no_run
//! use got::{ops, refs, Repo};
//! use std::path::Path;
//!
//! // initialize a repository
//! let repo = Repo::init(Path::new("/srv/repos/alice/project")).unwrap();
//!
//! // list refs and check integrity
//! let heads = refs::list(&repo, "heads").unwrap();
//! let report = ops::fsck(&repo).unwrap();
//! assert!(report.is_ok());
//! ```

mod backend;
mod cancel;
mod config;
mod error;
mod hash;
mod repo;

pub mod entities;
pub mod git;
pub mod mapping;
pub mod object;
pub mod ops;
pub mod pack;
pub mod pktline;
pub mod refs;
pub mod transport;
pub mod types;
pub mod walk;

pub use backend::{Backend, FsBackend};
pub use cancel::CancelToken;
pub use config::{Config, Limits};
pub use error::{Error, IoResultExt, Result};
pub use hash::{compute_git_hash, compute_object_hash, GitHash, Hash};
pub use repo::Repo;
pub use types::Kind;
