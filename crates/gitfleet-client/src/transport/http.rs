//! JSON-over-HTTP dialect.
//!
//! Each RPC is a JSON POST to `http://{addr}/{endpoint}`. Unary calls
//! answer with a JSON body; streaming calls answer with a sideband-framed
//! body (see `gitfleet-proto::frame`) decoded incrementally. Application
//! errors arrive as a JSON [`RpcError`] with a matching HTTP status.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use gitfleet_proto::{
    BatchLogRequest, BatchLogResponse, ErrorCode, ExecRequest, Frame, FrameDecoder,
    IsRepoCloneableRequest, IsRepoCloneableResponse, P4ExecRequest, RepoCloneProgressRequest,
    RepoCloneProgressResponse, RepoUpdateRequest, RepoUpdateResponse, RpcError, RpcMethod,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::{ExecStream, GitserverTransport};
use crate::{ClientError, GitserverAddress, Result};

/// The HTTP transport.
///
/// Wraps one shared `reqwest` client; its connection pool is safe for
/// concurrent reuse across calls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates an HTTP transport with the given connect timeout.
    ///
    /// No whole-request timeout is set here: streaming responses are
    /// open-ended and the facade owns call deadlines.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the underlying client
    /// cannot be constructed.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    fn url(addr: &GitserverAddress, method: RpcMethod) -> String {
        format!("http://{}/{}", addr, method.endpoint())
    }

    async fn post<Req, Resp>(
        &self,
        addr: &GitserverAddress,
        method: RpcMethod,
        req: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(Self::url(addr, method))
            .json(req)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let response = check_status(addr, method, response).await?;
        response.json().await.map_err(|e| {
            let err = ClientError::Protocol(format!("decoding {} response: {e}", method.endpoint()));
            tracing::error!(addr = %addr, op = method.endpoint(), error = %err, "protocol error");
            err
        })
    }

    async fn post_streaming<Req>(
        &self,
        addr: &GitserverAddress,
        method: RpcMethod,
        req: &Req,
    ) -> Result<ExecStream>
    where
        Req: Serialize + Sync,
    {
        let response = self
            .http
            .post(Self::url(addr, method))
            .json(req)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let response = check_status(addr, method, response).await?;
        let body = response
            .bytes_stream()
            .map_err(ClientError::from_reqwest)
            .boxed();
        Ok(ExecStream::new(frame_stream(body).boxed()))
    }
}

/// Maps an HTTP error status onto the client taxonomy, preferring the
/// structured [`RpcError`] body when the server sent one.
async fn check_status(
    addr: &GitserverAddress,
    method: RpcMethod,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    if let Ok(rpc_err) = serde_json::from_slice::<RpcError>(&body) {
        return Err(rpc_error_to_client(addr, method, rpc_err));
    }

    let message = format!(
        "{} from {addr}/{}: {}",
        status.as_u16(),
        method.endpoint(),
        String::from_utf8_lossy(&body)
    );
    Err(match status.as_u16() {
        401 | 403 => ClientError::Unauthorized(message),
        404 => ClientError::NotFound(message),
        429 | 500..=599 => ClientError::Transient(message),
        _ => ClientError::Protocol(message),
    })
}

/// Converts a structured server error into the client taxonomy.
pub(crate) fn rpc_error_to_client(
    addr: &GitserverAddress,
    method: RpcMethod,
    err: RpcError,
) -> ClientError {
    match err.error_code() {
        // The transport does not know which repo/revision the caller
        // meant; the facade re-wraps not-found into the precise variant.
        ErrorCode::NotFound => ClientError::NotFound(err.message),
        ErrorCode::Unauthorized => ClientError::Unauthorized(err.message),
        ErrorCode::Unavailable => ClientError::Transient(err.message),
        ErrorCode::Internal => {
            let e = ClientError::Protocol(err.message);
            tracing::error!(addr = %addr, op = method.endpoint(), error = %e, "protocol error");
            e
        }
    }
}

/// Decodes a raw byte stream into sideband frames.
pub(crate) fn frame_stream<S>(body: S) -> impl Stream<Item = Result<Frame>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    futures::stream::try_unfold(
        (body, FrameDecoder::new()),
        |(mut body, mut decoder)| async move {
            loop {
                if let Some(frame) = decoder.next_frame()? {
                    return Ok(Some((frame, (body, decoder))));
                }
                match body.next().await {
                    Some(Ok(chunk)) => decoder.extend(&chunk),
                    Some(Err(e)) => return Err(e),
                    None => {
                        decoder.finish()?;
                        return Ok(None);
                    }
                }
            }
        },
    )
}

#[async_trait]
impl GitserverTransport for HttpTransport {
    async fn exec(&self, addr: &GitserverAddress, req: ExecRequest) -> Result<ExecStream> {
        self.post_streaming(addr, RpcMethod::Exec, &req).await
    }

    async fn p4_exec(&self, addr: &GitserverAddress, req: P4ExecRequest) -> Result<ExecStream> {
        self.post_streaming(addr, RpcMethod::P4Exec, &req).await
    }

    async fn batch_log(
        &self,
        addr: &GitserverAddress,
        req: BatchLogRequest,
    ) -> Result<BatchLogResponse> {
        self.post(addr, RpcMethod::BatchLog, &req).await
    }

    async fn repo_update(
        &self,
        addr: &GitserverAddress,
        req: RepoUpdateRequest,
    ) -> Result<RepoUpdateResponse> {
        self.post(addr, RpcMethod::RepoUpdate, &req).await
    }

    async fn is_repo_cloneable(
        &self,
        addr: &GitserverAddress,
        req: IsRepoCloneableRequest,
    ) -> Result<IsRepoCloneableResponse> {
        self.post(addr, RpcMethod::IsRepoCloneable, &req).await
    }

    async fn repo_clone_progress(
        &self,
        addr: &GitserverAddress,
        req: RepoCloneProgressRequest,
    ) -> Result<RepoCloneProgressResponse> {
        self.post(addr, RpcMethod::RepoCloneProgress, &req).await
    }
}
