//! Reference [`Transport`] over a framed byte stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::BytesMut;
use connprims_transport::{
    remaining, Addr, ClientTransport, ClientTransportFactory, ConnectionInfo, ConnectionSettings,
    Endpoint, Received, Result, Seq, ServerTransport, ServerTransportFactory, Stream, Transport,
    TransportError,
};
use tracing::debug;

use crate::codec::{Frame, FrameConfig, UNLIMITED_PAYLOAD};
use crate::kinds;
use crate::message::Message;
use crate::reader::FrameReader;
use crate::varint::{decode_zigzag, put_zigzag, MAX_VARINT_LEN};
use crate::writer::FrameWriter;

/// A [`Transport`] carrying [`Message`]s in frames over a [`Stream`].
///
/// The read and write halves sit behind separate locks over cloned socket
/// handles, so a blocked `receive` never holds up `send` or `flush`. Sends are
/// buffered until `flush`. Deadlines are converted to socket timeouts when a
/// call starts, so changing a deadline does not affect a call already blocked.
pub struct FramedTransport {
    reader: Mutex<FrameReader<Stream>>,
    writer: Mutex<FrameWriter<Stream>>,
    send_deadline: Mutex<Option<Instant>>,
    receive_deadline: Mutex<Option<Instant>>,
    control: Stream,
    local: Addr,
    remote: Addr,
    closed: AtomicBool,
}

impl FramedTransport {
    pub fn new(stream: Stream) -> Result<Self> {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: Stream, config: FrameConfig) -> Result<Self> {
        let reader = FrameReader::with_config(stream.try_clone()?, config.clone());
        let writer = FrameWriter::with_config(stream.try_clone()?, config);
        let local = stream.local_addr();
        let remote = stream.peer_addr();
        debug!(%local, %remote, "framed transport ready");

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            send_deadline: Mutex::new(None),
            receive_deadline: Mutex::new(None),
            control: stream,
            local,
            remote,
            closed: AtomicBool::new(false),
        })
    }

    /// Credentials of the peer process, see [`Stream::peer_credentials`].
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        self.control.peer_credentials()
    }

    /// Largest payload `send` currently accepts.
    pub fn max_command_size(&self) -> usize {
        lock(&self.writer).max_payload_size()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn read_frame(&self) -> Result<Frame> {
        self.ensure_open()?;
        let mut reader = lock(&self.reader);
        let timeout = remaining(*lock(&self.receive_deadline))?;
        reader.get_ref().set_read_timeout(timeout)?;
        Ok(reader.read_frame()?)
    }

    fn flush_locked(&self, writer: &mut FrameWriter<Stream>) -> Result<()> {
        let timeout = remaining(*lock(&self.send_deadline))?;
        writer.get_ref().set_write_timeout(timeout)?;
        Ok(writer.flush()?)
    }

    /// Send one handshake frame and push it out immediately.
    fn write_unit(&self, kind: u16, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut writer = lock(&self.writer);
        writer.send(kind, 0, payload)?;
        self.flush_locked(&mut writer)
    }
}

impl Transport for FramedTransport {
    type Outbound = Message;
    type Inbound = Message;

    fn local_addr(&self) -> Addr {
        self.local.clone()
    }

    fn remote_addr(&self) -> Addr {
        self.remote.clone()
    }

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        *lock(&self.send_deadline) = deadline;
        Ok(())
    }

    fn send(&self, seq: Seq, item: &Message) -> Result<usize> {
        self.ensure_open()?;
        Ok(lock(&self.writer).send(item.kind(), seq, item.payload())?)
    }

    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let mut writer = lock(&self.writer);
        self.flush_locked(&mut writer)
    }

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        *lock(&self.receive_deadline) = deadline;
        Ok(())
    }

    fn receive(&self) -> Result<Received<Message>> {
        let frame = self.read_frame()?;
        let seq = frame.seq;
        let size = frame.wire_size();
        let item = Message::from_frame(frame)?;
        Ok(Received { seq, item, size })
    }

    /// Shuts the socket down in both directions. A second call fails with
    /// [`TransportError::Shutdown`].
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Shutdown);
        }
        debug!(remote = %self.remote, "closing framed transport");
        match self.control.shutdown() {
            Err(TransportError::Io(err)) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl ClientTransport for FramedTransport {
    fn receive_connection_info(&self) -> Result<ConnectionInfo> {
        let frame = self.read_frame()?.expect_kind(kinds::INFO)?;
        Ok(ConnectionInfo::new(frame.payload))
    }

    fn receive_connection_settings(&self) -> Result<ConnectionSettings> {
        let frame = self.read_frame()?.expect_kind(kinds::SETTINGS)?;
        Ok(ConnectionSettings {
            max_command_size: decode_zigzag(&frame.payload)?,
        })
    }

    fn apply_connection_settings(&self, settings: ConnectionSettings) -> Result<()> {
        let max = settings.command_size_limit().unwrap_or(UNLIMITED_PAYLOAD);
        lock(&self.writer).set_max_payload_size(max);
        debug!(max_command_size = max, "applied connection settings");
        Ok(())
    }
}

impl ServerTransport for FramedTransport {
    fn send_connection_info(&self, info: &ConnectionInfo) -> Result<()> {
        self.write_unit(kinds::INFO, info.as_bytes())
    }

    fn send_connection_settings(&self, settings: &ConnectionSettings) -> Result<()> {
        let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN);
        put_zigzag(&mut buf, settings.max_command_size);
        self.write_unit(kinds::SETTINGS, &buf)
    }
}

impl std::fmt::Debug for FramedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedTransport")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Dials an [`Endpoint`] for every new client transport.
#[derive(Debug, Clone)]
pub struct FramedConnector {
    endpoint: Endpoint,
    config: FrameConfig,
}

impl FramedConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, FrameConfig::default())
    }

    pub fn with_config(endpoint: Endpoint, config: FrameConfig) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl ClientTransportFactory for FramedConnector {
    type Transport = FramedTransport;

    fn new_transport(&self) -> Result<FramedTransport> {
        let stream = self.endpoint.connect()?;
        FramedTransport::with_config(stream, self.config.clone())
    }
}

/// Wraps accepted streams into server transports.
#[derive(Debug, Clone, Default)]
pub struct FramedTransportFactory {
    config: FrameConfig,
}

impl FramedTransportFactory {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl ServerTransportFactory for FramedTransportFactory {
    type Conn = Stream;
    type Transport = FramedTransport;

    fn new_transport(&self, conn: Stream) -> Result<FramedTransport> {
        FramedTransport::with_config(conn, self.config.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use bytes::Bytes;
    use connprims_transport::{deadline_after, PingCommand, PongReply};

    use super::*;

    fn pair() -> (FramedTransport, FramedTransport) {
        let (client, server) = UnixStream::pair().unwrap();
        (
            FramedTransport::new(Stream::from_unix(client)).unwrap(),
            FramedTransport::new(Stream::from_unix(server)).unwrap(),
        )
    }

    fn data(bytes: &'static [u8]) -> Message {
        Message::Data(Bytes::from_static(bytes))
    }

    #[test]
    fn handshake_payloads_cross_the_wire() {
        let (client, server) = pair();
        server
            .send_connection_info(&ConnectionInfo::from("svc/2"))
            .unwrap();
        server
            .send_connection_settings(&ConnectionSettings {
                max_command_size: 8,
            })
            .unwrap();

        assert_eq!(
            client.receive_connection_info().unwrap(),
            ConnectionInfo::from("svc/2")
        );
        let settings = client.receive_connection_settings().unwrap();
        assert_eq!(settings.max_command_size, 8);

        client.apply_connection_settings(settings).unwrap();
        assert_eq!(client.max_command_size(), 8);
        assert!(client.send(1, &data(b"8 bytes!")).is_ok());
        let err = client.send(2, &data(b"nine byte")).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(msg) if msg.contains("too large")));

        client
            .apply_connection_settings(ConnectionSettings::UNLIMITED)
            .unwrap();
        assert_eq!(client.max_command_size(), UNLIMITED_PAYLOAD);
    }

    #[test]
    fn wrong_handshake_frame_is_protocol_error() {
        let (client, server) = pair();
        server.send(0, &Message::pong()).unwrap();
        server.flush().unwrap();

        let err = client.receive_connection_info().unwrap_err();
        assert!(matches!(err, TransportError::Protocol(msg) if msg.contains("PONG")));
    }

    #[test]
    fn sends_wait_for_flush() {
        let (client, server) = pair();
        let size = client.send(42, &data(b"hello")).unwrap();
        assert_eq!(size, crate::HEADER_SIZE + 5);

        server
            .set_receive_deadline(deadline_after(Duration::from_millis(50)))
            .unwrap();
        assert!(server.receive().unwrap_err().is_timeout());

        client.flush().unwrap();
        server.set_receive_deadline(None).unwrap();
        let received = server.receive().unwrap();
        assert_eq!(received.seq, 42);
        assert_eq!(received.item, data(b"hello"));
        assert_eq!(received.size, size);
    }

    #[test]
    fn expired_deadline_fails_fast() {
        let (client, _server) = pair();
        client.set_receive_deadline(Some(Instant::now())).unwrap();
        assert!(client.receive().unwrap_err().is_timeout());

        client.set_send_deadline(Some(Instant::now())).unwrap();
        client.send(1, &data(b"x")).unwrap();
        assert!(client.flush().unwrap_err().is_timeout());
    }

    #[test]
    fn ping_and_pong_travel_as_control_frames() {
        let (client, server) = pair();
        client.send(connprims_transport::PING_SEQ, &Message::ping()).unwrap();
        client.flush().unwrap();

        let ping = server.receive().unwrap();
        assert!(ping.item.is_ping());
        assert_eq!(ping.size, crate::HEADER_SIZE);

        server.send(ping.seq, &Message::pong()).unwrap();
        server.flush().unwrap();
        assert!(client.receive().unwrap().item.is_pong());
    }

    #[test]
    fn close_is_not_idempotent() {
        let (client, server) = pair();
        client.close().unwrap();
        assert!(matches!(client.close(), Err(TransportError::Shutdown)));
        assert!(matches!(client.send(1, &data(b"x")), Err(TransportError::Shutdown)));
        assert!(matches!(
            server.receive(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn close_unblocks_pending_receive() {
        let (client, _server) = pair();
        let client = std::sync::Arc::new(client);
        let reader = {
            let client = std::sync::Arc::clone(&client);
            std::thread::spawn(move || client.receive())
        };

        std::thread::sleep(Duration::from_millis(20));
        client.close().unwrap();
        assert!(reader.join().unwrap().is_err());
    }

    #[test]
    fn connector_and_factory_over_tcp() {
        let listener = "127.0.0.1:0".parse::<Endpoint>().unwrap().bind().unwrap();
        let connector = FramedConnector::new(listener.endpoint());

        let client = connector.new_transport().unwrap();
        let server = FramedTransportFactory::default()
            .new_transport(listener.accept().unwrap())
            .unwrap();

        assert_eq!(client.remote_addr(), server.local_addr());
        server
            .send_connection_info(&ConnectionInfo::from("tcp"))
            .unwrap();
        assert_eq!(
            client.receive_connection_info().unwrap(),
            ConnectionInfo::from("tcp")
        );
    }
}
