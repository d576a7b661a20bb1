//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR serialization failed
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed
    #[error("decode error: {0}")]
    Decode(String),

    /// Frame length exceeds the maximum allowed size
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Command tag outside the defined protocol
    #[error("unknown command tag: {0}")]
    UnknownCommand(u8),

    /// I/O error during frame operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
