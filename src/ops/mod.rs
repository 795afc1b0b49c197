//! repository maintenance operations

pub mod fsck;

pub use fsck::{fsck, FsckReport};
