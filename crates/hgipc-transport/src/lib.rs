//! Unix domain socket transport for the hub IPC client.
//!
//! This is the lowest layer of hgipc. It opens the hub's local socket (with a
//! bounded connect timeout), exposes the connected byte stream as [`IpcStream`],
//! and provides the listener side used by hub test doubles and tooling.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
