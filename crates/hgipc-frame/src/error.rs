use crate::codec::PacketType;

/// A frame arrived intact but its contents violate the wire format.
///
/// The stream cannot be resynchronized after one of these; the connection
/// that produced it must be dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// A variant type tag is not one of the known values.
    #[error("unknown type tag 0x{0:02x}")]
    UnknownTag(u8),

    /// A declared length or count runs past the end of the payload.
    #[error("truncated frame: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string payload is not valid UTF-8.
    #[error("invalid string encoding: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// A boolean payload byte is neither 0 nor 1.
    #[error("invalid boolean byte 0x{0:02x}")]
    InvalidBoolean(u8),

    /// Arrays and structs are nested deeper than the decoder allows.
    #[error("variant nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    /// Bytes remain after the envelope payload was fully decoded.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// A value is too large for its 32-bit length or count prefix.
    #[error("{what} too large to encode ({len}, max {max})")]
    TooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// The payload decoded but does not have the shape its packet type requires.
    #[error("malformed {packet} payload: {reason}")]
    MalformedEnvelope { packet: PacketType, reason: String },

    /// A packet type that is never sent in this direction.
    #[error("unexpected {0} packet")]
    UnexpectedPacket(PacketType),
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header carries a marker that is not a known packet type.
    #[error("unknown packet type marker {0:02x?}")]
    UnknownPacketType([u8; 4]),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection (end of stream while reading).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The peer closed the connection while a frame was being written.
    #[error("broken pipe")]
    BrokenPipe,

    /// The frame contents violate the wire format.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FrameError {
    /// Whether the error means the byte stream itself is corrupt, as opposed
    /// to the connection having gone away.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownPacketType(_)
                | FrameError::PayloadTooLarge { .. }
                | FrameError::Protocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
