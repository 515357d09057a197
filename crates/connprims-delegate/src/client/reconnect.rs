use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwap;
use connprims_transport::{
    Addr, ClientTransportFactory, ConnectionInfo, Received, Result, Seq, Transport,
};
use tracing::{debug, info, warn};

use super::{ClientDelegate, ReconnectClientDelegate};
use crate::config::HandshakeConfig;
use crate::error::DelegateError;
use crate::handshake::handshake_client;

type TransportOf<F> = <F as ClientTransportFactory>::Transport;

/// A client delegate that can replace its transport with a fresh one.
///
/// Every call reads the current transport through an atomic handle, so I/O
/// from other threads keeps working (on whichever transport is current) while
/// [`reconnect`](ReconnectDelegate::reconnect) runs. A replaced transport is
/// not closed here; it is released when the last in-flight call using it
/// returns.
pub struct ReconnectDelegate<F: ClientTransportFactory> {
    info: ConnectionInfo,
    factory: F,
    config: HandshakeConfig,
    current: ArcSwap<TransportOf<F>>,
    closed: AtomicBool,
    /// Held by `close` across "close current, set closed" and by `reconnect`
    /// across "check closed, install". Readers never take it.
    install: Mutex<()>,
}

impl<F: ClientTransportFactory> ReconnectDelegate<F> {
    /// Create the first transport and run the handshake on it, once.
    pub fn new(info: ConnectionInfo, factory: F, config: HandshakeConfig) -> crate::Result<Self> {
        let transport = factory.new_transport()?;
        if let Err(err) = handshake_client(&transport, &info, &config) {
            discard(&transport);
            return Err(err);
        }
        Ok(Self {
            info,
            factory,
            config,
            current: ArcSwap::from_pointee(transport),
            closed: AtomicBool::new(false),
            install: Mutex::new(()),
        })
    }

    /// The transport calls currently go to.
    pub fn transport(&self) -> Arc<TransportOf<F>> {
        self.current.load_full()
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Create transports until one passes the handshake, then install it.
    ///
    /// Factory and I/O failures are retried immediately, without back-off.
    /// A [`DelegateError::HandshakeMismatch`] is returned at once. The closed
    /// flag is checked before every attempt and again, under the same lock
    /// `close` holds, before installing. A [`close`](ClientDelegate::close)
    /// that completes first ends the loop with [`DelegateError::Closed`] and
    /// the new transport is closed instead of installed.
    pub fn reconnect(&self) -> crate::Result<()> {
        let mut attempt: u64 = 0;
        loop {
            if self.is_closed() {
                return Err(DelegateError::Closed);
            }
            attempt += 1;

            let transport = match self.factory.new_transport() {
                Ok(transport) => transport,
                Err(err) => {
                    debug!(attempt, error = %err, "reconnect: transport factory failed");
                    continue;
                }
            };

            match handshake_client(&transport, &self.info, &self.config) {
                Ok(_) => {}
                Err(err) if err.is_mismatch() => {
                    discard(&transport);
                    return Err(err);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "reconnect: handshake failed");
                    discard(&transport);
                    continue;
                }
            }

            let remote = transport.remote_addr();
            let _install = self.install.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_closed() {
                discard(&transport);
                return Err(DelegateError::Closed);
            }
            self.current.store(Arc::new(transport));
            info!(attempt, %remote, "reconnected");
            return Ok(());
        }
    }
}

/// Best-effort close of a transport that will never be installed.
fn discard<T: Transport>(transport: &T) {
    if let Err(err) = transport.close() {
        warn!(remote = %transport.remote_addr(), error = %err, "failed to close discarded transport");
    }
}

impl<F: ClientTransportFactory> ClientDelegate for ReconnectDelegate<F> {
    type Command = <TransportOf<F> as Transport>::Outbound;
    type Reply = <TransportOf<F> as Transport>::Inbound;

    fn local_addr(&self) -> Addr {
        self.current.load().local_addr()
    }

    fn remote_addr(&self) -> Addr {
        self.current.load().remote_addr()
    }

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.current.load().set_send_deadline(deadline)
    }

    fn send(&self, seq: Seq, command: &Self::Command) -> Result<usize> {
        self.transport().send(seq, command)
    }

    fn flush(&self) -> Result<()> {
        self.transport().flush()
    }

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.current.load().set_receive_deadline(deadline)
    }

    fn receive(&self) -> Result<Received<Self::Reply>> {
        self.transport().receive()
    }

    /// Close the current transport, then mark the delegate closed.
    ///
    /// If the transport fails to close, the delegate stays open and the call
    /// can be retried.
    ///
    /// # Panics
    ///
    /// Panics if the delegate was already closed by an earlier successful call.
    fn close(&self) -> Result<()> {
        let _install = self.install.lock().unwrap_or_else(PoisonError::into_inner);
        self.transport().close()?;
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("reconnect delegate closed twice");
        }
        debug!("reconnect delegate closed");
        Ok(())
    }
}

impl<F: ClientTransportFactory> ReconnectClientDelegate for ReconnectDelegate<F> {
    fn reconnect(&self) -> crate::Result<()> {
        ReconnectDelegate::reconnect(self)
    }
}
