use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};
use crate::info::{ConnectionInfo, ConnectionSettings};
use crate::stream::Addr;

/// Sequence number pairing a command with its replies.
pub type Seq = u64;

/// One item read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received<V> {
    /// Sequence number the peer attached to the item.
    pub seq: Seq,
    /// The decoded item.
    pub item: V,
    /// Number of bytes consumed from the wire.
    pub size: usize,
}

/// A duplex, deadline-aware channel with an explicit flush boundary.
///
/// Methods take `&self`: the send path and the receive path are used from
/// different threads at the same time, so implementations keep their halves
/// behind their own synchronization. Deadlines are sticky until changed, and
/// `None` means "no deadline". `close` is not required to be idempotent.
pub trait Transport: Send + Sync {
    /// Items written by this side.
    type Outbound;
    /// Items read by this side.
    type Inbound;

    fn local_addr(&self) -> Addr;
    fn remote_addr(&self) -> Addr;

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()>;

    /// Write one item. May buffer; nothing is guaranteed to reach the peer
    /// until [`Transport::flush`].
    fn send(&self, seq: Seq, item: &Self::Outbound) -> Result<usize>;

    /// Transmit everything buffered by previous sends.
    fn flush(&self) -> Result<()>;

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()>;

    /// Read the next item, blocking per the current receive deadline.
    fn receive(&self) -> Result<Received<Self::Inbound>>;

    fn close(&self) -> Result<()>;
}

/// Client end of a connection: receives the server's handshake data.
pub trait ClientTransport: Transport {
    fn receive_connection_info(&self) -> Result<ConnectionInfo>;

    fn receive_connection_settings(&self) -> Result<ConnectionSettings>;

    /// Apply server-pushed settings to local enforcement state.
    fn apply_connection_settings(&self, settings: ConnectionSettings) -> Result<()>;
}

/// Server end of a connection: sends handshake data as whole units.
pub trait ServerTransport: Transport {
    fn send_connection_info(&self, info: &ConnectionInfo) -> Result<()>;

    fn send_connection_settings(&self, settings: &ConnectionSettings) -> Result<()>;
}

/// Produces fresh client transports, one physical connection each.
pub trait ClientTransportFactory: Send + Sync {
    type Transport: ClientTransport;

    fn new_transport(&self) -> Result<Self::Transport>;
}

impl<T, F> ClientTransportFactory for F
where
    F: Fn() -> Result<T> + Send + Sync,
    T: ClientTransport,
{
    type Transport = T;

    fn new_transport(&self) -> Result<T> {
        self()
    }
}

/// Wraps an accepted connection into a server transport.
pub trait ServerTransportFactory {
    /// The accepted connection type.
    type Conn;
    type Transport: ServerTransport;

    fn new_transport(&self, conn: Self::Conn) -> Result<Self::Transport>;
}

/// Application-level handler that owns a validated server transport for the
/// rest of the connection's lifetime.
pub trait TransportHandler<T> {
    type Error;

    fn handle(&self, transport: T) -> std::result::Result<(), Self::Error>;
}

impl<T, E, F> TransportHandler<T> for F
where
    F: Fn(T) -> std::result::Result<(), E>,
{
    type Error = E;

    fn handle(&self, transport: T) -> std::result::Result<(), E> {
        self(transport)
    }
}

/// Convert a timeout into a deadline. A zero timeout means no deadline.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + timeout)
    }
}

/// Time left until `deadline`, or `None` without a deadline.
///
/// Fails with a `TimedOut` I/O error once the deadline has passed.
pub fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                Err(TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::TimedOut,
                )))
            } else {
                Ok(Some(left))
            }
        }
    }
}
