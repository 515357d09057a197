//! Transport contract and socket plumbing.
//!
//! This is the lowest layer of connprims. It defines the [`Transport`] contract
//! every higher layer is written against, the handshake payload types
//! ([`ConnectionInfo`], [`ConnectionSettings`]), the Ping/Pong vocabulary, and
//! the concrete sockets (Unix domain sockets, TCP) that reference transports
//! are built on.

pub mod control;
pub mod endpoint;
pub mod error;
pub mod info;
pub mod stream;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use control::{PingCommand, PongReply, PING_SEQ};
pub use endpoint::{Endpoint, Listener};
pub use error::{Result, TransportError};
pub use info::{ConnectionInfo, ConnectionSettings};
pub use stream::{Addr, Stream};
pub use tcp::TcpSocket;
pub use traits::{
    deadline_after, remaining, ClientTransport, ClientTransportFactory, Received, Seq,
    ServerTransport, ServerTransportFactory, Transport, TransportHandler,
};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
