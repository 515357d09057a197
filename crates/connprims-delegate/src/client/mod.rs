//! Client-side delegates.
//!
//! A [`ClientDelegate`] is the surface an RPC client talks to. The layers
//! stack: [`Delegate`] wraps one validated transport, [`ReconnectDelegate`]
//! owns a factory and swaps in fresh transports, and [`KeepaliveDelegate`]
//! wraps either to keep an idle connection alive with pings.

mod delegate;
mod keepalive;
mod reconnect;

use std::time::Instant;

use connprims_transport::{Addr, Received, Result, Seq};

pub use delegate::Delegate;
pub use keepalive::KeepaliveDelegate;
pub use reconnect::ReconnectDelegate;

/// Send/receive surface over an established connection.
///
/// Every method mirrors the [`Transport`](connprims_transport::Transport)
/// method of the same name and reports its results and errors unchanged.
pub trait ClientDelegate: Send + Sync {
    type Command;
    type Reply;

    fn local_addr(&self) -> Addr;
    fn remote_addr(&self) -> Addr;

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()>;
    fn send(&self, seq: Seq, command: &Self::Command) -> Result<usize>;
    fn flush(&self) -> Result<()>;

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()>;
    fn receive(&self) -> Result<Received<Self::Reply>>;

    fn close(&self) -> Result<()>;
}

/// A client delegate that can replace its connection.
pub trait ReconnectClientDelegate: ClientDelegate {
    /// Establish and install a new connection. See
    /// [`ReconnectDelegate::reconnect`].
    fn reconnect(&self) -> crate::Result<()>;
}
