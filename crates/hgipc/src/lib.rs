//! Local IPC/RPC client for home-automation hubs.
//!
//! hgipc talks to a hub daemon over its Unix domain socket: typed variant
//! values, the binary RPC wire codec, and a client that multiplexes
//! concurrent calls and event callbacks over one connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket connect/listen and peer credentials
//! - [`variant`]: the dynamically typed values exchanged with the hub
//! - [`frame`]: packet framing and the binary variant encoding
//! - [`client`]: the RPC client (behind the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use hgipc_transport::*;
}

/// Re-export variant types.
pub mod variant {
    pub use hgipc_variant::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hgipc_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use hgipc_client::*;
}

#[cfg(feature = "client")]
pub use hgipc_client::{Client, ClientConfig, Error, Result};
pub use hgipc_variant::Variant;
