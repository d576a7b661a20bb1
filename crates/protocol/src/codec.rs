//! Message serialization and framing
//!
//! Messages are serialized with CBOR and carried in length-prefixed frames:
//!
//! ```text
//! [Length: u32 (big-endian)][CBOR message bytes]
//! ```
//!
//! The length prefix is bounded by [`MAX_FRAME_SIZE`] so a hostile or broken
//! peer cannot make the receiver allocate an arbitrary buffer.

use crate::error::{ProtocolError, Result};
use crate::messages::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame size (64 KiB).
///
/// Generous for this protocol: the largest message is an enumeration reply,
/// and a device list is a few hundred bytes per entry.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Encode a message to CBOR bytes.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decode a message from CBOR bytes.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encode a message with its length prefix.
pub fn encode_framed(message: &Message) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(4 + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Read one framed message from an async stream.
///
/// Errors on a truncated frame, an oversized length prefix, or malformed
/// CBOR. An EOF before the first prefix byte surfaces as an I/O error.
pub async fn read_framed<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let length = u32::from_be_bytes(len_bytes) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    decode_message(&message_bytes)
}

/// Write one framed message to an async stream.
pub async fn write_framed<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_framed(message)?;
    writer.write_all(&frame).await?;
    Ok(())
}
