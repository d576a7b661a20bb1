//! Wire protocol for the CTAPHID relay.
//!
//! Every client connection starts with exactly one framed request [`Message`]:
//! either an enumeration query (answered with one framed reply, then the
//! connection is closed) or a session start (after which the connection
//! carries raw HID reports with no further framing).
//!
//! Messages are CBOR-encoded maps carried in length-prefixed frames:
//!
//! ```text
//! [Length: u32 (big-endian)][CBOR message bytes]
//! ```
//!
//! # Example
//!
//! ```
//! use protocol::{Message, Command, encode_framed, decode_message};
//!
//! let msg = Message::start_request("/dev/hidraw4").unwrap();
//! let framed = encode_framed(&msg).unwrap();
//!
//! let decoded = decode_message(&framed[4..]).unwrap();
//! assert_eq!(decoded.command(), Some(Command::Start));
//! assert_eq!(decoded.device_path().unwrap(), "/dev/hidraw4");
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{
    MAX_FRAME_SIZE, decode_message, encode_framed, encode_message, read_framed, write_framed,
};
pub use error::{ProtocolError, Result};
pub use messages::{Command, Message};
pub use types::{DeviceInfo, REPORT_SIZE, WIRE_REPORT_SIZE};
