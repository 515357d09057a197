use std::time::Instant;

use connprims_transport::{
    Addr, ClientTransport, ConnectionInfo, ConnectionSettings, Received, Result, Seq,
};

use super::ClientDelegate;
use crate::config::HandshakeConfig;
use crate::error::DelegateError;
use crate::handshake::handshake_client;

/// A client delegate over a single transport that passed the handshake.
///
/// The only way to build one is [`Delegate::new`], so holding a `Delegate`
/// means the server's identity has been checked.
#[derive(Debug)]
pub struct Delegate<T> {
    transport: T,
    settings: ConnectionSettings,
    config: HandshakeConfig,
}

impl<T: ClientTransport> Delegate<T> {
    /// Run the client handshake on `transport` and wrap it.
    ///
    /// On failure the transport is dropped without being closed. Use
    /// [`try_new`](Delegate::try_new) to keep it.
    pub fn new(transport: T, info: &ConnectionInfo, config: HandshakeConfig) -> crate::Result<Self> {
        Self::try_new(transport, info, config).map_err(|(err, _)| err)
    }

    /// Like [`new`](Delegate::new), but hands the transport back with the
    /// error so the caller decides whether to close or reuse it.
    pub fn try_new(
        transport: T,
        info: &ConnectionInfo,
        config: HandshakeConfig,
    ) -> std::result::Result<Self, (DelegateError, T)> {
        match handshake_client(&transport, info, &config) {
            Ok(settings) => Ok(Self {
                transport,
                settings,
                config,
            }),
            Err(err) => Err((err, transport)),
        }
    }

    /// Settings the server pushed during the handshake.
    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: ClientTransport> ClientDelegate for Delegate<T> {
    type Command = T::Outbound;
    type Reply = T::Inbound;

    fn local_addr(&self) -> Addr {
        self.transport.local_addr()
    }

    fn remote_addr(&self) -> Addr {
        self.transport.remote_addr()
    }

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.transport.set_send_deadline(deadline)
    }

    fn send(&self, seq: Seq, command: &T::Outbound) -> Result<usize> {
        self.transport.send(seq, command)
    }

    fn flush(&self) -> Result<()> {
        self.transport.flush()
    }

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.transport.set_receive_deadline(deadline)
    }

    fn receive(&self) -> Result<Received<T::Inbound>> {
        self.transport.receive()
    }

    fn close(&self) -> Result<()> {
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use connprims_transport::{Transport, TransportError};

    use super::*;
    use crate::testing::{Event, MockTransport, Msg, SETTINGS};

    #[test]
    fn new_requires_handshake() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate = Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default())
            .unwrap();
        assert_eq!(delegate.settings(), SETTINGS);
        assert_eq!(delegate.config(), &HandshakeConfig::default());

        let mismatched = MockTransport::serving("srv", "svc/9");
        let err = Delegate::new(mismatched, &"svc/1".into(), HandshakeConfig::default())
            .unwrap_err();
        assert!(matches!(err, DelegateError::HandshakeMismatch { .. }));
    }

    #[test]
    fn failed_handshake_returns_the_transport() {
        let mismatched = MockTransport::serving("srv", "svc/9");
        let (err, transport) =
            Delegate::try_new(mismatched.clone(), &"svc/1".into(), HandshakeConfig::default())
                .unwrap_err();

        assert!(err.is_mismatch());
        assert_eq!(mismatched.closes(), 0);
        transport.send(3, &Msg::Data(3)).unwrap();
        transport.close().unwrap();
        assert_eq!(mismatched.closes(), 1);
        assert!(mismatched.events().contains(&Event::Send(3, Msg::Data(3))));
    }

    #[test]
    fn calls_pass_straight_through() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate = Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default())
            .unwrap();
        let handshake_events = transport.events().len();

        transport.push_reply(5, Msg::Data(50));
        delegate.set_send_deadline(None).unwrap();
        assert_eq!(delegate.send(5, &Msg::Data(5)).unwrap(), 1);
        delegate.flush().unwrap();
        let reply = delegate.receive().unwrap();
        assert_eq!((reply.seq, reply.item), (5, Msg::Data(50)));
        delegate.close().unwrap();

        assert_eq!(
            transport.events()[handshake_events..],
            [
                Event::SendDeadline(false),
                Event::Send(5, Msg::Data(5)),
                Event::Flush,
                Event::Receive,
                Event::Close,
            ]
        );
        assert_eq!(delegate.remote_addr(), transport.remote_addr());
    }

    #[test]
    fn errors_pass_straight_through() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate = Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default())
            .unwrap();

        transport.fail_flushes(true);
        transport.push_error(TransportError::Protocol("garbled".into()));

        assert!(matches!(delegate.flush(), Err(TransportError::Io(_))));
        assert!(matches!(
            delegate.receive(),
            Err(TransportError::Protocol(msg)) if msg == "garbled"
        ));
        assert!(matches!(
            delegate.receive(),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
