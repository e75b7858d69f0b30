// Transport-shell error types.

use thiserror::Error;

use dhexcore::DhexCoreError;

/// All errors produced by the dhexwire transport shell.
///
/// A busy server is deliberately not represented here: it is a
/// [`crate::HandshakeOutcome`] variant, so callers can tell "retry later"
/// apart from every failure.
#[derive(Debug, Error)]
pub enum DhexWireError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("frame too large: {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("received frame is not valid UTF-8")]
    FrameNotUtf8,

    #[error(transparent)]
    Handshake(#[from] DhexCoreError),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, DhexWireError>;
