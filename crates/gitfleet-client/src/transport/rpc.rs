//! Binary protobuf dialect over TCP.
//!
//! One connection per call. The client writes an envelope of
//! `method (1 byte)` + `length (u32 BE)` + prost-encoded request; the
//! replica answers with a result marker byte (`0` ok, `1` error). An
//! error is a length-prefixed [`RpcError`]; a unary success is a
//! length-prefixed response message; a streaming success is a sideband
//! frame sequence ending with the status frame. Dropping a stream closes
//! the socket, which aborts the server-side command.
//!
//! All framing is written against `AsyncRead`/`AsyncWrite` so tests can
//! drive it over an in-memory duplex pipe.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gitfleet_proto::{
    BatchLogRequest, BatchLogResponse, ExecRequest, Frame, FrameDecoder, IsRepoCloneableRequest,
    IsRepoCloneableResponse, P4ExecRequest, RepoCloneProgressRequest, RepoCloneProgressResponse,
    RepoUpdateRequest, RepoUpdateResponse, RpcError, RpcMethod, MAX_FRAME_LEN,
};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::http::rpc_error_to_client;
use super::{ExecStream, GitserverTransport};
use crate::{ClientError, GitserverAddress, Result};

/// Result marker for a successful response.
const MARKER_OK: u8 = 0;
/// Result marker preceding an [`RpcError`].
const MARKER_ERR: u8 = 1;

/// The binary transport.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    connect_timeout: Duration,
}

impl RpcTransport {
    /// Creates a binary transport with the given dial timeout.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Dials the replica. Dial failures and timeouts are transient.
    async fn connect(&self, addr: &GitserverAddress) -> Result<TcpStream> {
        let dial = TcpStream::connect(addr.as_str());
        match tokio::time::timeout(self.connect_timeout, dial).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ClientError::from_io(e)),
            Err(_) => Err(ClientError::Transient(format!(
                "dial {addr} timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    async fn call_unary<Req, Resp>(
        &self,
        addr: &GitserverAddress,
        method: RpcMethod,
        req: &Req,
    ) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let mut conn = self.connect(addr).await?;
        write_request(&mut conn, method, req)
            .await
            .map_err(ClientError::from_io)?;
        let resp = read_unary::<_, Resp>(&mut conn, addr, method).await;
        if let Err(e @ ClientError::Protocol(_)) = &resp {
            tracing::error!(addr = %addr, op = method.endpoint(), error = %e, "protocol error");
        }
        resp
    }

    async fn call_streaming<Req>(
        &self,
        addr: &GitserverAddress,
        method: RpcMethod,
        req: &Req,
    ) -> Result<ExecStream>
    where
        Req: Message,
    {
        let mut conn = self.connect(addr).await?;
        write_request(&mut conn, method, req)
            .await
            .map_err(ClientError::from_io)?;

        match read_marker(&mut conn).await? {
            MARKER_OK => Ok(ExecStream::new(frame_stream(conn).boxed())),
            MARKER_ERR => {
                let err = read_length_prefixed::<_, RpcError>(&mut conn).await?;
                Err(rpc_error_to_client(addr, method, err))
            }
            other => Err(ClientError::Protocol(format!(
                "unknown result marker {other} from {addr}/{}",
                method.endpoint()
            ))),
        }
    }
}

/// Writes the request envelope.
pub(crate) async fn write_request<W, Req>(
    w: &mut W,
    method: RpcMethod,
    req: &Req,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    Req: Message,
{
    let payload = req.encode_to_vec();
    w.write_u8(method as u8).await?;
    w.write_u32(payload.len() as u32).await?;
    w.write_all(&payload).await?;
    w.flush().await
}

/// Reads the single result marker byte.
async fn read_marker<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8> {
    r.read_u8().await.map_err(ClientError::from_io)
}

/// Reads one length-prefixed prost message.
async fn read_length_prefixed<R, M>(r: &mut R) -> Result<M>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let len = r.read_u32().await.map_err(ClientError::from_io)? as usize;
    if len > MAX_FRAME_LEN {
        return Err(ClientError::Protocol(format!(
            "response of {len} bytes exceeds maximum"
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await.map_err(ClientError::from_io)?;
    M::decode(buf.as_slice()).map_err(|e| ClientError::Protocol(format!("decode failed: {e}")))
}

/// Reads a unary response: marker, then payload or error.
pub(crate) async fn read_unary<R, Resp>(
    r: &mut R,
    addr: &GitserverAddress,
    method: RpcMethod,
) -> Result<Resp>
where
    R: AsyncRead + Unpin,
    Resp: Message + Default,
{
    match read_marker(r).await? {
        MARKER_OK => read_length_prefixed(r).await,
        MARKER_ERR => {
            let err = read_length_prefixed::<_, RpcError>(r).await?;
            Err(rpc_error_to_client(addr, method, err))
        }
        other => Err(ClientError::Protocol(format!(
            "unknown result marker {other} from {addr}/{}",
            method.endpoint()
        ))),
    }
}

/// Decodes sideband frames from a raw connection until the status frame.
pub(crate) fn frame_stream<R>(conn: R) -> impl futures::Stream<Item = Result<Frame>> + Send
where
    R: AsyncRead + Send + Unpin + 'static,
{
    futures::stream::try_unfold(
        (conn, FrameDecoder::new(), [0u8; 8 * 1024]),
        |(mut conn, mut decoder, mut buf)| async move {
            loop {
                if let Some(frame) = decoder.next_frame()? {
                    return Ok(Some((frame, (conn, decoder, buf))));
                }
                let n = conn.read(&mut buf).await.map_err(ClientError::from_io)?;
                if n == 0 {
                    decoder.finish()?;
                    return Ok(None);
                }
                decoder.extend(&buf[..n]);
            }
        },
    )
}

#[async_trait]
impl GitserverTransport for RpcTransport {
    async fn exec(&self, addr: &GitserverAddress, req: ExecRequest) -> Result<ExecStream> {
        self.call_streaming(addr, RpcMethod::Exec, &req).await
    }

    async fn p4_exec(&self, addr: &GitserverAddress, req: P4ExecRequest) -> Result<ExecStream> {
        self.call_streaming(addr, RpcMethod::P4Exec, &req).await
    }

    async fn batch_log(
        &self,
        addr: &GitserverAddress,
        req: BatchLogRequest,
    ) -> Result<BatchLogResponse> {
        self.call_unary(addr, RpcMethod::BatchLog, &req).await
    }

    async fn repo_update(
        &self,
        addr: &GitserverAddress,
        req: RepoUpdateRequest,
    ) -> Result<RepoUpdateResponse> {
        self.call_unary(addr, RpcMethod::RepoUpdate, &req).await
    }

    async fn is_repo_cloneable(
        &self,
        addr: &GitserverAddress,
        req: IsRepoCloneableRequest,
    ) -> Result<IsRepoCloneableResponse> {
        self.call_unary(addr, RpcMethod::IsRepoCloneable, &req).await
    }

    async fn repo_clone_progress(
        &self,
        addr: &GitserverAddress,
        req: RepoCloneProgressRequest,
    ) -> Result<RepoCloneProgressResponse> {
        self.call_unary(addr, RpcMethod::RepoCloneProgress, &req)
            .await
    }
}
