//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame contained no command line.
    #[error("frame has no command")]
    MissingCommand,

    /// Command line is not a STOMP 1.2 command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Header line without a `:` separator.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Header value used an escape sequence STOMP does not define.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    /// A frame required by the exchange lacked a header.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// JSON payload could not be encoded or decoded.
    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),
}
