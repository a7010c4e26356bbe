//! Streaming command output.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use gitfleet_proto::{Band, ExecStatus, Frame};
use prost::Message;

use crate::{ClientError, Result};

/// The output of a streamed command (`exec`, `p4_exec`, file reads).
///
/// Yields stdout in chunks as they arrive from the wire; stderr is
/// accumulated on the side and the final [`ExecStatus`] becomes available
/// once the stream ends. The stream is finite and non-restartable; drop
/// it to abandon the command and release the connection.
pub struct ExecStream {
    frames: BoxStream<'static, Result<Frame>>,
    stderr: BytesMut,
    status: Option<ExecStatus>,
}

impl ExecStream {
    /// Wraps a decoded sideband frame stream.
    ///
    /// Public so out-of-crate [`GitserverTransport`] implementations can
    /// produce streams.
    ///
    /// [`GitserverTransport`]: crate::GitserverTransport
    pub fn new(frames: BoxStream<'static, Result<Frame>>) -> Self {
        Self {
            frames,
            stderr: BytesMut::new(),
            status: None,
        }
    }

    /// Returns the next stdout chunk, or `None` once the command
    /// finished. Stderr and status frames are consumed internally.
    ///
    /// # Errors
    ///
    /// Propagates transport and protocol errors; a stream that ends
    /// without a status frame is a protocol error.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.status.is_some() {
            return Ok(None);
        }
        while let Some(frame) = self.frames.next().await {
            let frame = frame?;
            match frame.band {
                Band::Stdout => return Ok(Some(frame.payload)),
                Band::Stderr => self.stderr.extend_from_slice(&frame.payload),
                Band::Status => {
                    let status = ExecStatus::decode(&frame.payload[..])
                        .map_err(|e| ClientError::Protocol(format!("bad status frame: {e}")))?;
                    self.status = Some(status);
                    return Ok(None);
                }
            }
        }
        Err(ClientError::Protocol(
            "stream ended without a status frame".into(),
        ))
    }

    /// Returns the exit status, available after the stream has ended.
    #[must_use]
    pub fn status(&self) -> Option<&ExecStatus> {
        self.status.as_ref()
    }

    /// Returns the stderr accumulated so far.
    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Drains the stream, returning the full stdout and the exit status.
    pub async fn collect(mut self) -> Result<(Bytes, ExecStatus)> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        // next_chunk returns None only after decoding a status frame.
        let status = self.status.take().ok_or_else(|| {
            ClientError::Protocol("stream ended without a status frame".into())
        })?;
        Ok((out.freeze(), status))
    }
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream")
            .field("stderr_len", &self.stderr.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
