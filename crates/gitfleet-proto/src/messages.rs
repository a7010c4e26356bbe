//! RPC request/response messages.
//!
//! Field tags are part of the binary wire format; never renumber them.
//! Optional string fields use the empty string as absence so the structs
//! stay derivable for both dialects.

use prost::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ProtoError;

/// The RPC methods a gitserver replica serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RpcMethod {
    /// Run a git command in a repository, streaming its output.
    Exec = 1,
    /// Resolve a batch of repo/commit pairs to log output.
    BatchLog = 2,
    /// Proxy a Perforce command, streaming its output.
    P4Exec = 3,
    /// Schedule a fetch/clone of a repository.
    RepoUpdate = 4,
    /// Check whether a repository can be cloned.
    IsRepoCloneable = 5,
    /// Report clone progress for a set of repositories.
    RepoCloneProgress = 6,
}

impl RpcMethod {
    /// Parses a method id from its wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::UnknownMethod`] for unassigned ids.
    pub fn from_byte(b: u8) -> crate::Result<Self> {
        match b {
            1 => Ok(Self::Exec),
            2 => Ok(Self::BatchLog),
            3 => Ok(Self::P4Exec),
            4 => Ok(Self::RepoUpdate),
            5 => Ok(Self::IsRepoCloneable),
            6 => Ok(Self::RepoCloneProgress),
            _ => Err(ProtoError::UnknownMethod(b)),
        }
    }

    /// Returns the HTTP endpoint path for this method.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::BatchLog => "batch-log",
            Self::P4Exec => "p4-exec",
            Self::RepoUpdate => "repo-update",
            Self::IsRepoCloneable => "is-repo-cloneable",
            Self::RepoCloneProgress => "repo-clone-progress",
        }
    }
}

/// Error classification carried in error responses.
///
/// The transport maps these onto the client error taxonomy; the numeric
/// values are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Repository or revision does not exist.
    NotFound = 1,
    /// The caller is not allowed to perform the operation.
    Unauthorized = 2,
    /// Transient server-side condition; safe to retry.
    Unavailable = 3,
    /// Malformed request or internal failure; not retryable.
    Internal = 4,
}

impl ErrorCode {
    /// Parses a code from its wire value, defaulting unknown codes to
    /// [`ErrorCode::Internal`] so new server codes fail closed.
    #[must_use]
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => Self::NotFound,
            2 => Self::Unauthorized,
            3 => Self::Unavailable,
            _ => Self::Internal,
        }
    }
}

/// An application-level error returned by a replica.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RpcError {
    /// Classification, one of [`ErrorCode`].
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Human-readable detail.
    #[prost(string, tag = "2")]
    pub message: String,
}

impl RpcError {
    /// Creates an error with the given classification.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
        }
    }

    /// Returns the decoded classification.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_i32(self.code)
    }
}

/// Request to run a git command in a repository.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Repository to run in.
    #[prost(string, tag = "1")]
    pub repo: String,
    /// Git arguments, without the leading `git`.
    #[prost(string, repeated, tag = "2")]
    pub args: Vec<String>,
    /// Data fed to the command's stdin.
    #[prost(bytes = "vec", tag = "3")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stdin: Vec<u8>,
}

/// Terminal status of a streamed command, carried in the final sideband
/// frame.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct ExecStatus {
    /// Process exit code.
    #[prost(int32, tag = "1")]
    pub exit_code: i32,
    /// Captured stderr, truncated server-side.
    #[prost(string, tag = "2")]
    pub stderr: String,
}

/// One repo/commit pair of a batched log request.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct BatchLogCommit {
    /// Repository name.
    #[prost(string, tag = "1")]
    pub repo: String,
    /// Revision spec.
    #[prost(string, tag = "2")]
    pub commit: String,
}

/// A batched `git log` request.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct BatchLogRequest {
    /// The pairs to resolve, in order.
    #[prost(message, repeated, tag = "1")]
    pub repo_commits: Vec<BatchLogCommit>,
    /// The `--format` argument applied to every log invocation.
    #[prost(string, tag = "2")]
    pub format: String,
}

/// Result for a single pair of a batched log request.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct BatchLogResult {
    /// Repository name, echoing the request.
    #[prost(string, tag = "1")]
    pub repo: String,
    /// Revision spec, echoing the request.
    #[prost(string, tag = "2")]
    pub commit: String,
    /// Raw log output; empty when the pair failed.
    #[prost(string, tag = "3")]
    pub output: String,
    /// Per-pair failure; empty when the pair succeeded.
    #[prost(string, tag = "4")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Response to a batched log request; results preserve request order.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct BatchLogResponse {
    /// One result per requested pair, in request order.
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<BatchLogResult>,
}

/// Request to proxy a Perforce command.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct P4ExecRequest {
    /// Perforce host.
    #[prost(string, tag = "1")]
    pub host: String,
    /// Perforce user.
    #[prost(string, tag = "2")]
    pub user: String,
    /// Perforce password/ticket.
    #[prost(string, tag = "3")]
    pub password: String,
    /// p4 arguments.
    #[prost(string, repeated, tag = "4")]
    pub args: Vec<String>,
}

/// Request to fetch/clone a repository.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RepoUpdateRequest {
    /// Repository to update.
    #[prost(string, tag = "1")]
    pub repo: String,
    /// Debounce interval: skip the fetch if one ran within this window.
    #[prost(int64, tag = "2")]
    pub since_millis: i64,
}

/// Response to a repo update request.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RepoUpdateResponse {
    /// When the repository was last fetched, unix millis; 0 when unknown.
    #[prost(int64, tag = "1")]
    pub last_fetched_millis: i64,
    /// When the repository content last changed, unix millis; 0 when unknown.
    #[prost(int64, tag = "2")]
    pub last_changed_millis: i64,
    /// Failure detail; empty on success.
    #[prost(string, tag = "3")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Request to check whether a repository can be cloned from its origin.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct IsRepoCloneableRequest {
    /// Repository to check.
    #[prost(string, tag = "1")]
    pub repo: String,
}

/// Response to a cloneability check.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct IsRepoCloneableResponse {
    /// Whether the origin will serve a clone.
    #[prost(bool, tag = "1")]
    pub cloneable: bool,
    /// Whether the replica already holds a clone.
    #[prost(bool, tag = "2")]
    pub cloned: bool,
    /// Why the repository is not cloneable; empty when it is.
    #[prost(string, tag = "3")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// Request for clone progress of a set of repositories.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RepoCloneProgressRequest {
    /// Repositories to report on.
    #[prost(string, repeated, tag = "1")]
    pub repos: Vec<String>,
}

/// Clone state of a single repository.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RepoCloneProgress {
    /// Whether a clone is currently running.
    #[prost(bool, tag = "1")]
    pub clone_in_progress: bool,
    /// Human-readable progress line from the running clone.
    #[prost(string, tag = "2")]
    pub clone_progress: String,
    /// Whether the replica holds a complete clone.
    #[prost(bool, tag = "3")]
    pub cloned: bool,
}

/// Response mapping repository names to their clone state.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RepoCloneProgressResponse {
    /// Per-repository clone state.
    #[prost(map = "string, message", tag = "1")]
    pub results: HashMap<String, RepoCloneProgress>,
}
