use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: packet-type marker (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// First three bytes of every packet-type marker.
pub const MARKER_PREFIX: [u8; 3] = *b"Bin";

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Packet type carried in the frame marker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Client to hub: method call.
    Request = 0x00,
    /// Hub to client: successful result of the oldest outstanding request.
    Response = 0x01,
    /// Hub to client: unsolicited variable-change notification.
    Event = 0x10,
    /// Hub to client: failed result of the oldest outstanding request.
    Fault = 0xFF,
}

impl PacketType {
    /// The 4-byte marker that opens a frame of this type.
    pub const fn marker(self) -> [u8; 4] {
        [
            MARKER_PREFIX[0],
            MARKER_PREFIX[1],
            MARKER_PREFIX[2],
            self as u8,
        ]
    }

    pub fn from_marker(marker: [u8; 4]) -> Option<Self> {
        if marker[..3] != MARKER_PREFIX {
            return None;
        }
        match marker[3] {
            0x00 => Some(PacketType::Request),
            0x01 => Some(PacketType::Response),
            0x10 => Some(PacketType::Event),
            0xFF => Some(PacketType::Fault),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PacketType::Request => "request",
            PacketType::Response => "response",
            PacketType::Event => "event",
            PacketType::Fault => "fault",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One framed packet.
#[derive(Debug, Clone)]
pub struct Frame {
    /// What kind of envelope the payload holds.
    pub packet_type: PacketType,
    /// The encoded envelope payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬───────────┬─────────────────┐
/// │ Marker (4B)      │ Length    │ Payload         │
/// │ "Bin" + type     │ (4B BE)   │ (Length bytes)  │
/// └──────────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(packet_type: PacketType, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&packet_type.marker());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The marker and the
/// length are validated as soon as the header is complete.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let mut marker = [0u8; 4];
    header.copy_to_slice(&mut marker);
    let packet_type =
        PacketType::from_marker(marker).ok_or(FrameError::UnknownPacketType(marker))?;
    let payload_len = header.get_u32() as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        packet_type,
        payload,
    }))
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
