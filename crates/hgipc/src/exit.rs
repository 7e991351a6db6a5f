use std::fmt;
use std::io;

use hgipc_client::{ConnectionError, Error};
use hgipc_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const TRANSPORT_ERROR: i32 = 3;
/// The hub answered with a fault.
pub const RPC_FAULT: i32 = 20;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::ConnectTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn client_error(context: &str, err: Error) -> CliError {
    match err {
        Error::Connection(ConnectionError::Transport(err)) => transport_error(context, err),
        Error::Connection(ConnectionError::Io(source)) => io_error(context, source),
        Error::Connection(other) => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
        Error::Fault(fault) => CliError::new(RPC_FAULT, format!("{context}: {fault}")),
        Error::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        Error::Protocol(_) | Error::Conversion(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use hgipc_client::RpcFault;

    use super::*;

    #[test]
    fn fault_maps_to_rpc_fault_code() {
        let err = client_error("call failed", Error::Fault(RpcFault::new(-5, "Unknown")));
        assert_eq!(err.code, RPC_FAULT);
        assert!(err.message.contains("Unknown"));
    }

    #[test]
    fn missing_socket_is_transport_error() {
        let err = client_error(
            "connect failed",
            Error::Connection(ConnectionError::Transport(TransportError::Connect {
                path: PathBuf::from("/nope.sock"),
                source: io::Error::from(io::ErrorKind::NotFound),
            })),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn timeouts_share_one_code() {
        let connect = transport_error(
            "connect failed",
            TransportError::ConnectTimeout {
                path: PathBuf::from("/hub.sock"),
                timeout: Duration::from_secs(1),
                last_error: None,
            },
        );
        let call = client_error("call failed", Error::Timeout(Duration::from_secs(1)));
        assert_eq!(connect.code, TIMEOUT);
        assert_eq!(call.code, TIMEOUT);
    }

    #[test]
    fn permission_denied_is_reported() {
        let err = io_error("connect failed", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
