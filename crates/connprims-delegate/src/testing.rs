//! Scripted in-memory transport for unit tests.
//!
//! Clones share state, so a test can keep a handle on a transport it hands to
//! a delegate and inspect what the delegate did with it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use connprims_transport::{
    Addr, ClientTransport, ConnectionInfo, ConnectionSettings, PingCommand, PongReply, Received,
    Result, Seq, ServerTransport, ServerTransportFactory, Transport, TransportError,
};

/// Settings every serving mock pushes.
pub const SETTINGS: ConnectionSettings = ConnectionSettings {
    max_command_size: 4096,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Ping,
    Pong,
    Data(u32),
}

impl PingCommand for Msg {
    fn ping() -> Self {
        Msg::Ping
    }

    fn is_ping(&self) -> bool {
        matches!(self, Msg::Ping)
    }
}

impl PongReply for Msg {
    fn pong() -> Self {
        Msg::Pong
    }

    fn is_pong(&self) -> bool {
        matches!(self, Msg::Pong)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `true` when a deadline was set, `false` when cleared.
    SendDeadline(bool),
    Send(Seq, Msg),
    Flush,
    ReceiveDeadline(bool),
    ReceiveInfo,
    ReceiveSettings,
    Receive,
    Apply(ConnectionSettings),
    SendInfo(ConnectionInfo),
    SendSettings(ConnectionSettings),
    Close,
}

#[derive(Default)]
struct State {
    info: Mutex<Option<Result<ConnectionInfo>>>,
    settings: Mutex<Option<Result<ConnectionSettings>>>,
    replies: Mutex<VecDeque<Result<Received<Msg>>>>,
    fail_send: AtomicBool,
    fail_flush: AtomicBool,
    fail_close: AtomicBool,
    stall_remote_addr: Mutex<Option<Duration>>,
    events: Mutex<Vec<(Instant, Event)>>,
}

#[derive(Clone)]
pub struct MockTransport {
    name: &'static str,
    state: Arc<State>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn broken_pipe() -> TransportError {
    TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
}

impl MockTransport {
    /// A transport with nothing scripted: every read reports a closed peer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(State::default()),
        }
    }

    /// A transport whose peer introduces itself with `info` and [`SETTINGS`].
    pub fn serving(name: &'static str, info: &'static str) -> Self {
        let mock = Self::new(name);
        *mock.state.info.lock().unwrap() = Some(Ok(ConnectionInfo::from(info)));
        *mock.state.settings.lock().unwrap() = Some(Ok(SETTINGS));
        mock
    }

    /// A transport whose handshake read fails with an I/O error.
    pub fn unreachable(name: &'static str) -> Self {
        let mock = Self::new(name);
        *mock.state.info.lock().unwrap() = Some(Err(broken_pipe()));
        mock
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn push_reply(&self, seq: Seq, item: Msg) {
        self.state.replies.lock().unwrap().push_back(Ok(Received {
            seq,
            item,
            size: 1,
        }));
    }

    pub fn push_error(&self, err: TransportError) {
        self.state.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_flushes(&self, fail: bool) {
        self.state.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make the next `remote_addr` call sleep for `delay` first.
    pub fn stall_remote_addr(&self, delay: Duration) {
        *self.state.stall_remote_addr.lock().unwrap() = Some(delay);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// When each Ping was sent, including failed attempts.
    pub fn ping_times(&self) -> Vec<Instant> {
        self.state
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| matches!(event, Event::Send(_, Msg::Ping)))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.ping_times().len()
    }

    pub fn closes(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Close)
            .count()
    }

    fn record(&self, event: Event) {
        self.state
            .events
            .lock()
            .unwrap()
            .push((Instant::now(), event));
    }

    fn check(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(broken_pipe())
        } else {
            Ok(())
        }
    }
}

impl Transport for MockTransport {
    type Outbound = Msg;
    type Inbound = Msg;

    fn local_addr(&self) -> Addr {
        Addr::Unix(None)
    }

    fn remote_addr(&self) -> Addr {
        let stall = self.state.stall_remote_addr.lock().unwrap().take();
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        Addr::Unix(Some(self.name.into()))
    }

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.record(Event::SendDeadline(deadline.is_some()));
        Ok(())
    }

    fn send(&self, seq: Seq, item: &Msg) -> Result<usize> {
        self.record(Event::Send(seq, item.clone()));
        self.check(&self.state.fail_send)?;
        Ok(1)
    }

    fn flush(&self) -> Result<()> {
        self.record(Event::Flush);
        self.check(&self.state.fail_flush)
    }

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.record(Event::ReceiveDeadline(deadline.is_some()));
        Ok(())
    }

    fn receive(&self) -> Result<Received<Msg>> {
        self.record(Event::Receive);
        self.state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }

    fn close(&self) -> Result<()> {
        self.record(Event::Close);
        self.check(&self.state.fail_close)
    }
}

impl ClientTransport for MockTransport {
    fn receive_connection_info(&self) -> Result<ConnectionInfo> {
        self.record(Event::ReceiveInfo);
        self.state
            .info
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }

    fn receive_connection_settings(&self) -> Result<ConnectionSettings> {
        self.record(Event::ReceiveSettings);
        self.state
            .settings
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }

    fn apply_connection_settings(&self, settings: ConnectionSettings) -> Result<()> {
        self.record(Event::Apply(settings));
        Ok(())
    }
}

impl ServerTransport for MockTransport {
    fn send_connection_info(&self, info: &ConnectionInfo) -> Result<()> {
        self.record(Event::SendInfo(info.clone()));
        self.check(&self.state.fail_send)
    }

    fn send_connection_settings(&self, settings: &ConnectionSettings) -> Result<()> {
        self.record(Event::SendSettings(*settings));
        self.check(&self.state.fail_send)
    }
}

/// Server factory whose "connections" already are mock transports.
pub struct Passthrough;

impl ServerTransportFactory for Passthrough {
    type Conn = MockTransport;
    type Transport = MockTransport;

    fn new_transport(&self, conn: MockTransport) -> Result<MockTransport> {
        Ok(conn)
    }
}
