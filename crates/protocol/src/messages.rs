//! Protocol message definitions
//!
//! A connection carries exactly one request message before it either closes
//! (enumeration) or turns into a raw bridged byte stream (session start).

use crate::error::{ProtocolError, Result};
use crate::types::DeviceInfo;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Commands defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List matching devices; replied to with an encoded device list.
    Enumerate,
    /// Begin a bridging session against one device path; no reply message,
    /// the connection becomes the bridged stream.
    Start,
}

impl Command {
    /// Wire tag for this command.
    pub const fn tag(self) -> u8 {
        match self {
            Command::Enumerate => 1,
            Command::Start => 2,
        }
    }

    /// Decode a wire tag; `None` for tags outside the protocol.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Command::Enumerate),
            2 => Some(Command::Start),
            _ => None,
        }
    }
}

/// Message envelope: a command tag plus an opaque CBOR payload.
///
/// The envelope itself is CBOR-encoded as a two-entry map. The payload
/// meaning depends on the command: a device path string for [`Command::Start`]
/// requests, a device list for [`Command::Enumerate`] replies, ignored for
/// enumerate requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Command tag (see [`Command`])
    pub command: u8,
    /// Opaque payload bytes
    pub data: ByteBuf,
}

impl Message {
    /// Build an enumeration request. The payload is empty and ignored by
    /// the receiver.
    pub fn enumerate_request() -> Self {
        Self {
            command: Command::Enumerate.tag(),
            data: ByteBuf::new(),
        }
    }

    /// Build an enumeration reply carrying the discovered device list.
    pub fn enumerate_reply(devices: &[DeviceInfo]) -> Result<Self> {
        let mut data = Vec::new();
        ciborium::into_writer(&devices, &mut data)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self {
            command: Command::Enumerate.tag(),
            data: ByteBuf::from(data),
        })
    }

    /// Build a session-start request for one device path.
    pub fn start_request(path: &str) -> Result<Self> {
        let mut data = Vec::new();
        ciborium::into_writer(&path, &mut data)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self {
            command: Command::Start.tag(),
            data: ByteBuf::from(data),
        })
    }

    /// The command this message carries, or `None` for an unknown tag.
    pub fn command(&self) -> Option<Command> {
        Command::from_tag(self.command)
    }

    /// Decode the payload of a [`Command::Start`] request as a device path.
    pub fn device_path(&self) -> Result<String> {
        ciborium::from_reader(self.data.as_slice())
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Decode the payload of a [`Command::Enumerate`] reply as a device list.
    pub fn device_list(&self) -> Result<Vec<DeviceInfo>> {
        ciborium::from_reader(self.data.as_slice())
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
