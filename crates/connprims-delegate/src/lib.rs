//! Connection lifecycle for connprims.
//!
//! Sits between an RPC client or server and a raw [`Transport`]:
//! - [`handshake`]: the server identifies itself with [`ConnectionInfo`] and
//!   pushes [`ConnectionSettings`]; the client checks the identity.
//! - [`client`]: delegates over validated transports, with keepalive pings and
//!   transparent reconnects.
//! - [`server`]: runs the handshake for every accepted connection before the
//!   application handler sees it.
//!
//! [`Transport`]: connprims_transport::Transport
//! [`ConnectionInfo`]: connprims_transport::ConnectionInfo
//! [`ConnectionSettings`]: connprims_transport::ConnectionSettings

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    ClientDelegate, Delegate, KeepaliveDelegate, ReconnectClientDelegate, ReconnectDelegate,
};
pub use config::{HandshakeConfig, KeepaliveConfig, DEFAULT_KEEPALIVE_INTVL, DEFAULT_KEEPALIVE_TIME};
pub use error::{DelegateError, Result};
pub use handshake::{handshake_client, handshake_server};
pub use server::{answer_ping, ServerDelegate};
