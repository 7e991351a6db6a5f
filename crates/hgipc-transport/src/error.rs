use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The hub socket did not accept a connection before the deadline.
    #[error("timed out after {timeout:?} connecting to {path}")]
    ConnectTimeout {
        path: PathBuf,
        timeout: Duration,
        #[source]
        last_error: Option<std::io::Error>,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// Whether a connect attempt that failed with this error may succeed later.
    ///
    /// A hub that is still starting up has either not created its socket yet
    /// or is not accepting on it.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } => is_retryable_connect_kind(source.kind()),
            TransportError::ConnectTimeout { .. } => true,
            _ => false,
        }
    }
}

pub(crate) fn is_retryable_connect_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::WouldBlock
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
