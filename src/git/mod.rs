//! byte-exact codec for git's four object kinds
//!
//! parsed values keep exactly what the bytes carried: absent timezones and
//! committers stay blank so re-emission reproduces the input. the fetch-side
//! committer defaulting lives in the transport translation, not here.

pub mod commit;
pub mod tag;
pub mod tree;

pub use commit::GitCommit;
pub use tag::GitTag;
pub use tree::{GitTree, GitTreeEntry};

/// file modes eligible for entity extraction
pub const MODE_FILE: &str = "100644";
pub const MODE_EXECUTABLE: &str = "100755";
/// passthrough modes
pub const MODE_SYMLINK: &str = "120000";
pub const MODE_GITLINK: &str = "160000";
pub const MODE_DIR: &str = "40000";
