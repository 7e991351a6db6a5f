use std::time::Duration;

use hgipc_frame::{FrameError, ProtocolError, RpcFault};
use hgipc_transport::TransportError;
use hgipc_variant::ConversionError;

/// The link to the hub is unusable.
///
/// All of these are transient: the dispatcher reconnects in the background
/// and later calls may succeed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No connection is established right now.
    #[error("not connected to hub")]
    NotConnected,

    /// The hub closed the socket while a request was being written.
    #[error("broken pipe while writing to hub")]
    BrokenPipe,

    /// The hub closed the socket.
    #[error("connection closed by hub")]
    PeerClosed,

    /// Opening the socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading or writing the socket failed, including write timeouts.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A request could not be encoded, or a response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The hub answered with a fault.
    #[error(transparent)]
    Fault(#[from] RpcFault),

    /// No response arrived within the call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// Parameters or a result could not be converted.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),
}

impl Error {
    pub(crate) fn not_connected() -> Self {
        Error::Connection(ConnectionError::NotConnected)
    }

    /// Whether retrying after a reconnect may succeed.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    pub fn fault(&self) -> Option<&RpcFault> {
        match self {
            Error::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Connection(ConnectionError::Transport(err))
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Protocol(err) => Error::Protocol(err),
            FrameError::PayloadTooLarge { size, max } => Error::Protocol(ProtocolError::TooLarge {
                what: "payload",
                len: size,
                max,
            }),
            FrameError::UnknownPacketType(marker) => {
                Error::Protocol(ProtocolError::MalformedEnvelope {
                    packet: hgipc_frame::PacketType::Response,
                    reason: format!("unknown packet marker {marker:02x?}"),
                })
            }
            FrameError::BrokenPipe => Error::Connection(ConnectionError::BrokenPipe),
            FrameError::ConnectionClosed => Error::Connection(ConnectionError::PeerClosed),
            FrameError::Io(io) => Error::Connection(ConnectionError::Io(io)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
