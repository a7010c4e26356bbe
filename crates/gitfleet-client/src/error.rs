//! Client error taxonomy.
//!
//! Errors are classified once, at the transport layer, and never
//! reclassified above it. The retry policy consults
//! [`ClientError::is_transient`]; everything else is terminal.

use gitfleet_authz::AuthzError;
use gitfleet_proto::ProtoError;
use gitfleet_types::RepoName;
use thiserror::Error;

/// Errors that can occur during gitserver client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A not-found reported by a replica before the client could tell
    /// which entity was missing. The facade re-wraps this into one of the
    /// precise not-found variants below.
    #[error("not found: {0}")]
    NotFound(String),

    /// The repository does not exist (or is not cloned and not cloneable).
    #[error("repository not found: {repo}{}", fmt_reason(.reason))]
    RepoNotFound {
        /// The repository that was requested.
        repo: RepoName,
        /// Optional server-supplied detail.
        reason: String,
    },

    /// A revision spec did not resolve to a commit.
    ///
    /// Ambiguous and unknown revisions both land here; the client never
    /// treats them as transport failures.
    #[error("revision not found: {repo}@{spec}")]
    RevisionNotFound {
        /// The repository the revision was resolved against.
        repo: RepoName,
        /// The revision spec as supplied by the caller.
        spec: String,
    },

    /// A path does not exist at the given commit.
    ///
    /// Paths the actor may not read are reported identically, so absence
    /// never confirms existence.
    #[error("path not found: {repo}:{path}")]
    PathNotFound {
        /// The repository the path was looked up in.
        repo: RepoName,
        /// The repo-relative path.
        path: String,
    },

    /// The caller is not allowed to perform the operation. Never retried,
    /// never converted to not-found.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A transient transport-level failure: connection refused or reset,
    /// dial timeout, server unavailable. Eligible for bounded retry.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// A malformed response or wire-format violation. Fatal, never
    /// retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A caller-supplied revision spec that could be parsed as a flag.
    #[error("invalid revision spec: {0:?}")]
    InvalidSpec(String),

    /// The whole-call deadline elapsed.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),

    /// The permission checker itself failed.
    #[error("permission check failed: {0}")]
    Authz(#[from] AuthzError),

    /// The fleet address list was empty at construction.
    #[error("gitserver fleet address list is empty")]
    EmptyFleet,

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn fmt_reason(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(" ({reason})")
    }
}

impl ClientError {
    /// Returns true if the error is a transient transport failure worth
    /// retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true for any of the not-found classifications.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::RepoNotFound { .. }
                | Self::RevisionNotFound { .. }
                | Self::PathNotFound { .. }
        )
    }

    /// Classifies a reqwest error. Connection and timeout failures are
    /// transient; request construction and malformed payloads are not,
    /// since repeating them produces the same failure.
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::Transient(e.to_string())
        } else if e.is_builder() || e.is_request() || e.is_decode() || e.is_body() {
            Self::Protocol(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }

    /// Classifies an I/O error from the binary transport. Socket-level
    /// failures are connection problems, hence transient.
    pub(crate) fn from_io(e: std::io::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<ProtoError> for ClientError {
    fn from(e: ProtoError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        assert!(ClientError::Transient("refused".into()).is_transient());
        assert!(!ClientError::Unauthorized("no".into()).is_transient());
        assert!(!ClientError::Protocol("bad frame".into()).is_transient());
        assert!(!ClientError::RepoNotFound {
            repo: RepoName::new("r"),
            reason: String::new(),
        }
        .is_transient());
    }

    #[test]
    fn not_found_family() {
        assert!(ClientError::RevisionNotFound {
            repo: RepoName::new("r"),
            spec: "HEAD".into(),
        }
        .is_not_found());
        assert!(!ClientError::Unauthorized("no".into()).is_not_found());
    }

    #[test]
    fn request_construction_errors_are_not_retried() {
        // An unparsable URL fails at build time; retrying cannot fix it.
        let err = reqwest::Client::new().post("not a url").build().unwrap_err();
        let classified = ClientError::from_reqwest(err);
        assert!(matches!(classified, ClientError::Protocol(_)));
        assert!(!classified.is_transient());
    }

    #[test]
    fn repo_not_found_display_includes_reason() {
        let err = ClientError::RepoNotFound {
            repo: RepoName::new("github.com/x/y"),
            reason: "does not exist on origin".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("github.com/x/y"));
        assert!(msg.contains("does not exist on origin"));
    }
}
