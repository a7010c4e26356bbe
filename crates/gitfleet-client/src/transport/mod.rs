//! Transports: the wire-level dialects spoken to a replica.
//!
//! A transport turns one RPC into one network exchange with a single,
//! already-resolved replica address. It owns error classification; the
//! facade above never reinterprets transport errors, and the resolver
//! below never sees them.

mod http;
mod rpc;
mod stream;

pub use http::HttpTransport;
pub use rpc::RpcTransport;
pub use stream::ExecStream;

use async_trait::async_trait;
use gitfleet_proto::{
    BatchLogRequest, BatchLogResponse, ExecRequest, IsRepoCloneableRequest,
    IsRepoCloneableResponse, P4ExecRequest, RepoCloneProgressRequest, RepoCloneProgressResponse,
    RepoUpdateRequest, RepoUpdateResponse,
};

use crate::{GitserverAddress, Result};

/// The RPC surface of a gitserver replica.
///
/// Implementations must be safe for concurrent use; all per-request state
/// is request-scoped. Streaming methods return an [`ExecStream`] that is
/// lazy, finite, and non-restartable; dropping it releases the underlying
/// connection, which aborts the server-side command.
#[async_trait]
pub trait GitserverTransport: Send + Sync {
    /// Runs a git command in a repository, streaming its output.
    async fn exec(&self, addr: &GitserverAddress, req: ExecRequest) -> Result<ExecStream>;

    /// Proxies a Perforce command, streaming its output.
    async fn p4_exec(&self, addr: &GitserverAddress, req: P4ExecRequest) -> Result<ExecStream>;

    /// Resolves a batch of repo/commit pairs to raw log output.
    async fn batch_log(
        &self,
        addr: &GitserverAddress,
        req: BatchLogRequest,
    ) -> Result<BatchLogResponse>;

    /// Schedules a fetch/clone of a repository.
    async fn repo_update(
        &self,
        addr: &GitserverAddress,
        req: RepoUpdateRequest,
    ) -> Result<RepoUpdateResponse>;

    /// Checks whether a repository can be cloned from its origin.
    async fn is_repo_cloneable(
        &self,
        addr: &GitserverAddress,
        req: IsRepoCloneableRequest,
    ) -> Result<IsRepoCloneableResponse>;

    /// Reports clone progress for a set of repositories.
    async fn repo_clone_progress(
        &self,
        addr: &GitserverAddress,
        req: RepoCloneProgressRequest,
    ) -> Result<RepoCloneProgressResponse>;
}
