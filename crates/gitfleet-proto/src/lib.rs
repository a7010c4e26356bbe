//! Wire-level types for the gitfleet protocol.
//!
//! Every RPC has one request/response message pair defined in
//! [`messages`]. The same structs serve both wire dialects: they derive
//! `serde` for the JSON-over-HTTP dialect and `prost::Message` for the
//! binary dialect, so the two transports cannot drift apart.
//!
//! Streaming responses (command output, file contents) use the sideband
//! frame format defined in [`frame`], identically on both dialects.

mod frame;
mod messages;

pub use frame::{encode_frame, Band, Frame, FrameDecoder, MAX_FRAME_LEN};
pub use messages::{
    BatchLogCommit, BatchLogRequest, BatchLogResponse, BatchLogResult, ErrorCode, ExecRequest,
    ExecStatus, IsRepoCloneableRequest, IsRepoCloneableResponse, P4ExecRequest, RepoCloneProgress,
    RepoCloneProgressRequest, RepoCloneProgressResponse, RepoUpdateRequest, RepoUpdateResponse,
    RpcError, RpcMethod,
};

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A sideband frame carried an unknown band byte.
    #[error("unknown sideband band: {0}")]
    UnknownBand(u8),

    /// A frame length exceeded [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),

    /// The stream ended in the middle of a frame.
    #[error("truncated frame")]
    Truncated,

    /// A protobuf payload failed to decode.
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// An unknown RPC method id.
    #[error("unknown rpc method: {0}")]
    UnknownMethod(u8),
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
