//! Common types used throughout `gitfleet`.
//!
//! This crate provides the core value types for the gitfleet gitserver
//! client: repository names, commit identifiers, commit objects, git
//! object ids, and tree entries.

mod commit;
mod fs;
mod object;
mod repo;

pub use commit::{Commit, CommitId, Signature};
pub use fs::{FileInfo, FileMode, Submodule};
pub use object::{GitObject, ObjectId, ObjectType};
pub use repo::{RepoCommit, RepoName};

use thiserror::Error;

/// Errors produced when parsing or validating core types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A commit id was not a 40-character hex string.
    #[error("invalid commit id: {0:?}")]
    InvalidCommitId(String),

    /// An object id was not a 40-character hex string.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    /// An unknown git object type.
    #[error("unknown object type: {0:?}")]
    UnknownObjectType(String),
}

/// A specialized Result type for type parsing.
pub type Result<T> = std::result::Result<T, TypeError>;
