//! Sub-repository permission checking for `gitfleet`.
//!
//! Sub-repo permissions are path-level read restrictions within an
//! otherwise accessible repository. The client never decides permissions
//! itself: it delegates to a [`SubRepoPermissionChecker`] supplied by the
//! embedding application and post-processes fetched results, suppressing
//! entries the actor may not read.
//!
//! Denial is always expressed as omission or `None`, never as an error,
//! so callers cannot distinguish "filtered" from "absent".

mod actor;
mod filter;

pub use actor::Actor;
pub use filter::{
    check_path, filter_commits, filter_file_infos, filter_paths, has_access_to_commit,
    CommitWithFiles,
};

use async_trait::async_trait;
use gitfleet_types::RepoName;
use thiserror::Error;

/// Errors that can occur while consulting a permission checker.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The checker itself failed (backing store down, etc.).
    #[error("permission check failed for {repo}:{path}: {reason}")]
    CheckFailed {
        /// Repository the check was for.
        repo: RepoName,
        /// Path the check was for.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// A specialized Result type for permission operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Permission level for a path within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Perms {
    /// No access.
    None,
    /// Read access.
    Read,
}

impl Perms {
    /// Returns true if the permission includes read access.
    #[must_use]
    pub fn include_read(&self) -> bool {
        matches!(self, Perms::Read)
    }
}

/// A path within a repository, the unit of a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoContent {
    /// The repository the path belongs to.
    pub repo: RepoName,
    /// Repo-relative path.
    pub path: String,
}

/// Decides whether an actor may read a path within a repository.
///
/// Implemented by the embedding application; gitfleet only consumes it.
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait SubRepoPermissionChecker: Send + Sync {
    /// Returns true if sub-repo permissions are in use at all.
    ///
    /// When this returns false every filter in this crate is an identity
    /// transform and no per-path checks are issued.
    fn enabled(&self) -> bool;

    /// Returns the actor's permission for the given content.
    async fn permissions(&self, actor: &Actor, content: &RepoContent) -> Result<Perms>;
}

/// A checker for instances without sub-repo permissions; always disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChecker;

#[async_trait]
impl SubRepoPermissionChecker for NoopChecker {
    fn enabled(&self) -> bool {
        false
    }

    async fn permissions(&self, _actor: &Actor, _content: &RepoContent) -> Result<Perms> {
        Ok(Perms::Read)
    }
}

/// Returns true if filtering can be skipped entirely for this actor.
///
/// Internal actors (background jobs acting on behalf of the system) bypass
/// sub-repo permissions, as does a disabled checker.
pub fn can_skip_checks(checker: &dyn SubRepoPermissionChecker, actor: &Actor) -> bool {
    !checker.enabled() || actor.is_internal()
}
