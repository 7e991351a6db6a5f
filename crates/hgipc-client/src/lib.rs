//! Reconnecting RPC client for the hub IPC socket.
//!
//! [`Client`] sends typed calls over the hub's Unix domain socket and
//! correlates responses in send order. A background supervisor thread owns
//! the read side, reconnects when the link drops, and forwards variable
//! change events to the callback registered in [`ClientConfig`].
//!
//! ```no_run
//! use hgipc_client::{Client, ClientConfig, Variant};
//!
//! let config = ClientConfig::default().on_event(|event| {
//!     println!("{} {} {} = {:?}", event.peer_id, event.channel, event.variable, event.value);
//! });
//! let client = Client::start(config)?;
//! client.set_system_variable("TEST", 6i64)?;
//! assert_eq!(client.get_system_variable("TEST")?, Variant::Integer(6));
//! # Ok::<(), hgipc_client::Error>(())
//! ```

pub mod client;
pub mod config;
mod dispatcher;
pub mod error;
mod events;
mod methods;
mod pending;
pub mod state;
#[cfg(test)]
mod testing;

pub use client::{Client, PeerCredentials};
pub use config::{
    ClientConfig, ConnectCallback, EventCallback, ReconnectPolicy, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_EVENT_QUEUE_DEPTH, DEFAULT_SOCKET_PATH, DEFAULT_WRITE_TIMEOUT,
};
pub use error::{ConnectionError, Error, Result};
pub use hgipc_frame::{Event, RpcFault};
pub use hgipc_variant::Variant;
pub use state::ConnectionState;
