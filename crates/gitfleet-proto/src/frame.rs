//! Sideband frame codec for streaming responses.
//!
//! A streamed response is a sequence of frames, each `band (1 byte)` +
//! `length (u32, big endian)` + `payload`. Band 1 carries stdout data,
//! band 2 carries stderr data, and band 3 carries the prost-encoded
//! [`ExecStatus`](crate::ExecStatus) that terminates the stream. Both the
//! HTTP and the binary dialect emit exactly this format, so stream
//! decoding is shared.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtoError;

/// Upper bound on a single frame payload.
///
/// Large command output is split into many frames; a length above this is
/// a corrupt or hostile stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Sideband channel of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Band {
    /// Command stdout data.
    Stdout = 1,
    /// Command stderr data.
    Stderr = 2,
    /// Final status frame; ends the stream.
    Status = 3,
}

impl Band {
    /// Parses a band from its wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::UnknownBand`] for unassigned bytes.
    pub fn from_byte(b: u8) -> crate::Result<Self> {
        match b {
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            3 => Ok(Self::Status),
            _ => Err(ProtoError::UnknownBand(b)),
        }
    }
}

/// One decoded sideband frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel the payload belongs to.
    pub band: Band,
    /// Frame payload.
    pub payload: Bytes,
}

/// Encodes a single frame.
#[must_use]
pub fn encode_frame(band: Band, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(band as u8);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Incremental frame decoder.
///
/// Feed it arbitrary chunks as they arrive from the wire and pop complete
/// frames; it buffers partial frames internally. After the status frame
/// the stream must end; [`FrameDecoder::finish`] checks for trailing
/// garbage and truncation.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    done: bool,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes received from the wire.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtoError`] for unknown bands, oversized frames, or
    /// data following the status frame.
    pub fn next_frame(&mut self) -> crate::Result<Option<Frame>> {
        if self.done {
            if self.buf.is_empty() {
                return Ok(None);
            }
            return Err(ProtoError::Truncated);
        }
        if self.buf.len() < 5 {
            return Ok(None);
        }
        let band = Band::from_byte(self.buf[0])?;
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge(len));
        }
        if self.buf.len() < 5 + len {
            return Ok(None);
        }
        self.buf.advance(5);
        let payload = self.buf.split_to(len).freeze();
        if band == Band::Status {
            self.done = true;
        }
        Ok(Some(Frame { band, payload }))
    }

    /// Returns true once the status frame has been decoded.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Validates end-of-stream: the status frame must have arrived and no
    /// partial frame may remain.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Truncated`] otherwise.
    pub fn finish(&self) -> crate::Result<()> {
        if self.done && self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtoError::Truncated)
        }
    }
}
