//! Binary RPC framing for the hub IPC socket.
//!
//! Every message on the wire is one frame:
//! - a 4-byte packet-type marker (`"Bin"` + type byte: request, response,
//!   fault or event)
//! - a 4-byte big-endian payload length
//! - the payload: variants in the tag-prefixed binary encoding of [`binary`]
//!
//! [`Envelope`] gives the typed view of a frame; [`FrameReader`] and
//! [`FrameWriter`] move whole frames over any `Read`/`Write` stream, so
//! callers never see partial reads or writes.

pub mod binary;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

pub use binary::{decode_variant, decode_variant_exact, encode_variant, MAX_DEPTH};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, PacketType, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use envelope::{Envelope, Event, EventBatch, RpcFault};
pub use error::{FrameError, ProtocolError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
