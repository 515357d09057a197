use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use connprims_transport::{Addr, PingCommand, PongReply, Received, Result, Seq, PING_SEQ};
use tracing::debug;

use super::{ClientDelegate, ReconnectClientDelegate};
use crate::config::KeepaliveConfig;

enum Signal {
    Activity,
    Shutdown,
}

/// Sends a Ping whenever the wrapped delegate has not flushed anything for a
/// while, and hides Pong replies from [`receive`](ClientDelegate::receive).
///
/// The first Ping goes out `keepalive_time` after the last successful
/// [`flush`](ClientDelegate::flush), then one every `keepalive_intvl` until
/// the next flush. Pings run on a background thread started by
/// [`keepalive`](KeepaliveDelegate::keepalive).
///
/// Callers that set a send deadline and then send must hold the send lock
/// given to `keepalive` across both calls; Pings take the same lock so they
/// never land between them.
pub struct KeepaliveDelegate<D> {
    inner: Arc<D>,
    config: KeepaliveConfig,
    signals: SyncSender<Signal>,
    scheduler: Mutex<Option<Receiver<Signal>>>,
    shutdown: Arc<AtomicBool>,
}

impl<D> KeepaliveDelegate<D>
where
    D: ClientDelegate + 'static,
    D::Command: PingCommand,
    D::Reply: PongReply,
{
    pub fn new(inner: D, config: KeepaliveConfig) -> Self {
        let (signals, scheduler) = sync_channel(1);
        Self {
            inner: Arc::new(inner),
            config,
            signals,
            scheduler: Mutex::new(Some(scheduler)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the ping thread. It runs until [`close`](ClientDelegate::close)
    /// succeeds or this delegate is dropped.
    ///
    /// Fails if the thread cannot be spawned or was already started.
    pub fn keepalive(&self, send_lock: Arc<Mutex<()>>) -> std::io::Result<JoinHandle<()>> {
        let signals = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "keepalive is already running",
                )
            })?;

        let scheduler = Scheduler {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            signals,
            shutdown: Arc::clone(&self.shutdown),
            send_lock,
        };
        std::thread::Builder::new()
            .name("connprims-keepalive".to_string())
            .spawn(move || scheduler.run())
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.config
    }
}

impl<D> ClientDelegate for KeepaliveDelegate<D>
where
    D: ClientDelegate + 'static,
    D::Command: PingCommand,
    D::Reply: PongReply,
{
    type Command = D::Command;
    type Reply = D::Reply;

    fn local_addr(&self) -> Addr {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> Addr {
        self.inner.remote_addr()
    }

    fn set_send_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.inner.set_send_deadline(deadline)
    }

    fn send(&self, seq: Seq, command: &D::Command) -> Result<usize> {
        self.inner.send(seq, command)
    }

    /// A successful flush postpones the next Ping by `keepalive_time`.
    fn flush(&self) -> Result<()> {
        self.inner.flush()?;
        // a full slot already holds a pending activity signal
        let _ = self.signals.try_send(Signal::Activity);
        Ok(())
    }

    fn set_receive_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.inner.set_receive_deadline(deadline)
    }

    /// Returns the next reply that is not a Pong.
    fn receive(&self) -> Result<Received<D::Reply>> {
        loop {
            let received = self.inner.receive()?;
            if !received.item.is_pong() {
                return Ok(received);
            }
        }
    }

    /// Closes the wrapped delegate, then stops the ping thread. Pings keep
    /// going if the close fails.
    fn close(&self) -> Result<()> {
        self.inner.close()?;
        self.shutdown.store(true, Ordering::Release);
        let _ = self.signals.try_send(Signal::Shutdown);
        Ok(())
    }
}

impl<D> ReconnectClientDelegate for KeepaliveDelegate<D>
where
    D: ReconnectClientDelegate + 'static,
    D::Command: PingCommand,
    D::Reply: PongReply,
{
    fn reconnect(&self) -> crate::Result<()> {
        self.inner.reconnect()
    }
}

struct Scheduler<D> {
    inner: Arc<D>,
    config: KeepaliveConfig,
    signals: Receiver<Signal>,
    shutdown: Arc<AtomicBool>,
    send_lock: Arc<Mutex<()>>,
}

impl<D> Scheduler<D>
where
    D: ClientDelegate,
    D::Command: PingCommand,
{
    fn run(self) {
        debug!(
            remote = %self.inner.remote_addr(),
            keepalive_time = ?self.config.keepalive_time,
            keepalive_intvl = ?self.config.keepalive_intvl,
            "keepalive started"
        );
        let mut wait = self.config.keepalive_time;
        loop {
            match self.signals.recv_timeout(wait) {
                Ok(Signal::Activity) => {
                    if self.stopped() {
                        break;
                    }
                    wait = self.config.keepalive_time;
                }
                Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.stopped() {
                        break;
                    }
                    self.ping();
                    wait = self.config.keepalive_intvl;
                }
            }
        }
        debug!("keepalive stopped");
    }

    fn stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn ping(&self) {
        {
            let _guard = self.send_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = self.inner.set_send_deadline(None) {
                debug!(error = %err, "keepalive deadline reset failed");
                return;
            }
            if let Err(err) = self.inner.send(PING_SEQ, &<D::Command as PingCommand>::ping()) {
                debug!(error = %err, "keepalive ping failed");
                return;
            }
        }
        if let Err(err) = self.inner.flush() {
            debug!(error = %err, "keepalive flush failed");
        }
    }
}

impl<D> Drop for KeepaliveDelegate<D> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::Duration;

    use super::*;
    use crate::client::Delegate;
    use crate::config::HandshakeConfig;
    use crate::testing::{Event, MockTransport, Msg};

    /// Slack allowed for the scheduler thread to wake up.
    const SETTLE: Duration = Duration::from_millis(60);

    fn config() -> KeepaliveConfig {
        KeepaliveConfig {
            keepalive_time: Duration::from_millis(400),
            keepalive_intvl: Duration::from_millis(200),
        }
    }

    fn start(transport: &MockTransport) -> (KeepaliveDelegate<Delegate<MockTransport>>, Instant) {
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        let started = Instant::now();
        keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap();
        (keepalive, started)
    }

    fn offsets(times: &[Instant], from: Instant) -> Vec<Duration> {
        times.iter().map(|at| at.duration_since(from)).collect()
    }

    #[test]
    fn pings_after_idle_time_then_every_interval() {
        let transport = MockTransport::serving("srv", "svc/1");
        let (keepalive, started) = start(&transport);

        sleep(Duration::from_millis(350));
        assert_eq!(transport.pings(), 0);

        sleep(Duration::from_millis(550));
        keepalive.close().unwrap();

        let pings = offsets(&transport.ping_times(), started);
        assert!(pings.len() >= 2, "pings at {pings:?}");
        assert!(pings[0] >= Duration::from_millis(400), "pings at {pings:?}");
        assert!(pings[0] < Duration::from_millis(400) + SETTLE * 2, "pings at {pings:?}");
        for gap in pings.windows(2).map(|pair| pair[1] - pair[0]) {
            assert!(gap >= Duration::from_millis(200) - SETTLE / 4, "pings at {pings:?}");
            assert!(gap < Duration::from_millis(200) + SETTLE * 2, "pings at {pings:?}");
        }
    }

    #[test]
    fn ping_sequence_is_zero_and_flushed_outside_the_lock() {
        let transport = MockTransport::serving("srv", "svc/1");
        let (keepalive, _) = start(&transport);

        sleep(Duration::from_millis(400) + SETTLE);
        keepalive.close().unwrap();

        let events = transport.events();
        let at = events
            .iter()
            .position(|event| *event == Event::Send(PING_SEQ, Msg::Ping))
            .unwrap();
        assert_eq!(events[at - 1], Event::SendDeadline(false));
        assert_eq!(events[at + 1], Event::Flush);
    }

    #[test]
    fn flush_postpones_ping() {
        let transport = MockTransport::serving("srv", "svc/1");
        let (keepalive, started) = start(&transport);

        sleep(Duration::from_millis(200));
        keepalive.send(1, &Msg::Data(1)).unwrap();
        let flushed = Instant::now();
        keepalive.flush().unwrap();

        sleep(Duration::from_millis(300));
        assert_eq!(transport.pings(), 0, "ping before the postponed deadline");

        sleep(Duration::from_millis(200) + SETTLE);
        keepalive.close().unwrap();

        let first = transport.ping_times()[0];
        assert!(first.duration_since(flushed) >= Duration::from_millis(400));
        assert!(first.duration_since(started) >= Duration::from_millis(600));
    }

    #[test]
    fn send_without_flush_does_not_postpone_ping() {
        let transport = MockTransport::serving("srv", "svc/1");
        let (keepalive, started) = start(&transport);

        sleep(Duration::from_millis(200));
        keepalive.send(1, &Msg::Data(1)).unwrap();

        sleep(Duration::from_millis(200) + SETTLE);
        keepalive.close().unwrap();

        let pings = offsets(&transport.ping_times(), started);
        assert_eq!(pings.len(), 1, "pings at {pings:?}");
    }

    #[test]
    fn failed_flush_is_reported_and_does_not_postpone_ping() {
        let transport = MockTransport::serving("srv", "svc/1");
        let (keepalive, started) = start(&transport);

        sleep(Duration::from_millis(200));
        transport.fail_flushes(true);
        assert!(keepalive.flush().is_err());

        sleep(Duration::from_millis(200) + SETTLE);
        transport.fail_flushes(false);
        keepalive.close().unwrap();

        let pings = offsets(&transport.ping_times(), started);
        assert_eq!(pings.len(), 1, "pings at {pings:?}");
        assert!(pings[0] < Duration::from_millis(400) + SETTLE);
    }

    #[test]
    fn ping_failures_are_swallowed() {
        let transport = MockTransport::serving("srv", "svc/1");
        transport.fail_sends(true);
        let (keepalive, _) = start(&transport);

        sleep(Duration::from_millis(800) + SETTLE);
        let attempts = transport.pings();
        assert!(attempts >= 2, "{attempts} ping attempts");
        assert!(!transport.events().contains(&Event::Flush));

        keepalive.close().unwrap();
    }

    #[test]
    fn receive_skips_pongs() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());

        transport.push_reply(0, Msg::Pong);
        transport.push_reply(0, Msg::Pong);
        transport.push_reply(7, Msg::Data(70));
        transport.push_reply(0, Msg::Pong);
        transport.push_error(connprims_transport::TransportError::Shutdown);

        let reply = keepalive.receive().unwrap();
        assert_eq!((reply.seq, reply.item), (7, Msg::Data(70)));
        assert!(matches!(
            keepalive.receive(),
            Err(connprims_transport::TransportError::Shutdown)
        ));
    }

    #[test]
    fn close_stops_pings() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        let handle = keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap();

        sleep(Duration::from_millis(100));
        keepalive.close().unwrap();
        handle.join().unwrap();
        assert_eq!(transport.pings(), 0);
    }

    #[test]
    fn failed_close_keeps_pinging() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        let handle = keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap();

        transport.fail_closes(true);
        assert!(keepalive.close().is_err());

        sleep(Duration::from_millis(400) + SETTLE);
        assert!(transport.pings() >= 1);

        transport.fail_closes(false);
        keepalive.close().unwrap();
        handle.join().unwrap();
        let after_close = transport.pings();
        sleep(Duration::from_millis(300));
        assert_eq!(transport.pings(), after_close);
    }

    #[test]
    fn pings_wait_for_the_send_lock() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        let send_lock = Arc::new(Mutex::new(()));
        keepalive.keepalive(Arc::clone(&send_lock)).unwrap();

        {
            let _held = send_lock.lock().unwrap();
            sleep(Duration::from_millis(400) + SETTLE);
            assert_eq!(transport.pings(), 0);
            keepalive.set_send_deadline(None).unwrap();
            keepalive.send(3, &Msg::Data(3)).unwrap();
        }
        sleep(SETTLE);
        keepalive.close().unwrap();

        let events = transport.events();
        let data = events
            .iter()
            .position(|event| *event == Event::Send(3, Msg::Data(3)))
            .unwrap();
        let ping = events
            .iter()
            .position(|event| *event == Event::Send(PING_SEQ, Msg::Ping))
            .unwrap();
        assert!(ping > data);
    }

    #[test]
    fn close_right_after_flush_stops_the_thread() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        let handle = keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap();

        // Fill the signal slot with activity so the shutdown signal can be dropped.
        keepalive.flush().unwrap();
        keepalive.flush().unwrap();
        let closed = Instant::now();
        keepalive.close().unwrap();

        handle.join().unwrap();
        assert!(closed.elapsed() < Duration::from_millis(200));
        assert_eq!(transport.pings(), 0);
    }

    #[test]
    fn keepalive_starts_once() {
        let transport = MockTransport::serving("srv", "svc/1");
        let delegate =
            Delegate::new(transport.clone(), &"svc/1".into(), HandshakeConfig::default()).unwrap();
        let keepalive = KeepaliveDelegate::new(delegate, config());
        keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap();

        let err = keepalive.keepalive(Arc::new(Mutex::new(()))).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        keepalive.close().unwrap();
    }
}
