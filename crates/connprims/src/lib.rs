//! Connection lifecycle primitives for RPC clients and servers.
//!
//! connprims validates every physical connection with a server-first
//! handshake, keeps idle client connections alive with pings, and lets a
//! client swap in a fresh connection without disturbing concurrent callers.
//!
//! # Crate Structure
//!
//! - [`transport`]: transport contract, handshake payloads, sockets (UDS, TCP)
//! - [`frame`]: wire framing and the reference [`frame::FramedTransport`]
//! - [`delegate`]: handshake, client delegates and the server delegate

use std::sync::{Arc, Mutex};

use connprims_delegate::{
    DelegateError, HandshakeConfig, KeepaliveConfig, KeepaliveDelegate, ReconnectDelegate,
};
use connprims_frame::{FrameConfig, FramedConnector};
use connprims_transport::{ConnectionInfo, Endpoint, TransportError};

/// Re-export transport types.
pub mod transport {
    pub use connprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use connprims_frame::*;
}

/// Re-export delegate types.
pub mod delegate {
    pub use connprims_delegate::*;
}

/// The standard client stack: keepalive pings over a reconnecting delegate
/// that dials framed connections.
pub type Client = KeepaliveDelegate<ReconnectDelegate<FramedConnector>>;

/// Settings for [`connect`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub handshake: HandshakeConfig,
    pub keepalive: KeepaliveConfig,
    pub frame: FrameConfig,
}

/// Dial `endpoint`, check that the server presents `info`, and start
/// keepalive pings.
///
/// Callers that set a send deadline before sending must hold `send_lock`
/// across both calls.
pub fn connect(
    endpoint: Endpoint,
    info: ConnectionInfo,
    config: &ClientConfig,
    send_lock: Arc<Mutex<()>>,
) -> Result<Client, DelegateError> {
    let connector = FramedConnector::with_config(endpoint, config.frame.clone());
    let reconnect = ReconnectDelegate::new(info, connector, config.handshake.clone())?;
    let client = KeepaliveDelegate::new(reconnect, config.keepalive.clone());
    client
        .keepalive(send_lock)
        .map_err(|err| DelegateError::Transport(TransportError::Io(err)))?;
    Ok(client)
}
