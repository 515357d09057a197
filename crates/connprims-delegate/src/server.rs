use connprims_transport::{
    ConnectionInfo, ConnectionSettings, PingCommand, PongReply, Received, ServerTransportFactory,
    Transport, TransportHandler,
};
use tracing::{debug, warn};

use crate::config::HandshakeConfig;
use crate::error::{DelegateError, Result};
use crate::handshake::handshake_server;

/// Turns accepted connections into validated transports for a handler.
///
/// For each connection, [`handle`](ServerDelegate::handle) builds a transport
/// with the factory, sends the handshake, and only then passes the transport
/// to the handler. A transport whose handshake failed is closed and never
/// reaches the handler.
pub struct ServerDelegate<F, H> {
    info: ConnectionInfo,
    settings: ConnectionSettings,
    config: HandshakeConfig,
    factory: F,
    handler: H,
}

impl<F, H> ServerDelegate<F, H>
where
    F: ServerTransportFactory,
    H: TransportHandler<F::Transport>,
{
    /// Fails with [`DelegateError::EmptyConnectionInfo`] if `info` is empty.
    pub fn new(info: ConnectionInfo, factory: F, handler: H) -> Result<Self> {
        if info.is_empty() {
            return Err(DelegateError::EmptyConnectionInfo);
        }
        Ok(Self {
            info,
            settings: ConnectionSettings::UNLIMITED,
            config: HandshakeConfig::default(),
            factory,
            handler,
        })
    }

    /// Settings pushed to every client.
    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Serve one accepted connection. Returns the handler's result unchanged.
    pub fn handle(&self, conn: F::Conn) -> std::result::Result<(), H::Error>
    where
        H::Error: From<DelegateError>,
    {
        let transport = self
            .factory
            .new_transport(conn)
            .map_err(DelegateError::from)?;

        if let Err(err) = handshake_server(&transport, &self.info, &self.settings, &self.config) {
            debug!(remote = %transport.remote_addr(), error = %err, "server handshake failed");
            if let Err(close_err) = transport.close() {
                warn!(
                    remote = %transport.remote_addr(),
                    error = %close_err,
                    "failed to close transport after handshake failure"
                );
            }
            return Err(err.into());
        }

        self.handler.handle(transport)
    }
}

/// Answer a Ping with a Pong under the same sequence number, flushed at once.
///
/// Returns `Ok(true)` if `received` was a Ping, `Ok(false)` otherwise.
pub fn answer_ping<T>(
    transport: &T,
    received: &Received<T::Inbound>,
) -> connprims_transport::Result<bool>
where
    T: Transport,
    T::Inbound: PingCommand,
    T::Outbound: PongReply,
{
    if !received.item.is_ping() {
        return Ok(false);
    }
    transport.send(received.seq, &<T::Outbound as PongReply>::pong())?;
    transport.flush()?;
    Ok(true)
}
