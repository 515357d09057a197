use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use connprims::delegate::{answer_ping, DelegateError, HandshakeConfig, ServerDelegate};
use connprims::frame::{FramedTransport, FramedTransportFactory};
use connprims::transport::{
    ConnectionInfo, ConnectionSettings, PongReply, Transport, TransportError,
};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{delegate_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_json_event, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let handshake_timeout = parse_duration(&args.handshake_timeout)?;
    let delegate = ServerDelegate::new(
        ConnectionInfo::from(args.info.clone()),
        FramedTransportFactory::default(),
        echo,
    )
    .map_err(|err| delegate_error("serve failed", err))?
    .with_settings(ConnectionSettings {
        max_command_size: args.max_command_size,
    })
    .with_handshake_config(HandshakeConfig::with_timeout(handshake_timeout));
    let delegate = Arc::new(delegate);

    let listener = args
        .endpoint
        .bind()
        .map_err(|err| transport_error("bind failed", err))?;
    let bound = listener.endpoint();
    info!(endpoint = %bound, transport = listener.transport_name(), "serving");
    print_json_event(format, "listening", &bound.to_string());

    let stopping = Arc::new(AtomicBool::new(false));
    {
        let stopping = Arc::clone(&stopping);
        let wake = bound.clone();
        ctrlc::set_handler(move || {
            stopping.store(true, Ordering::SeqCst);
            // accept() has no timeout; a throwaway connection wakes it.
            let _ = wake.connect();
        })
        .map_err(|err| io_error("failed to install signal handler", std::io::Error::other(err)))?;
    }

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let mut accepted = 0usize;
    while args.count.is_none_or(|count| accepted < count) {
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) if !stopping.load(Ordering::SeqCst) => {
                warn!(error = %err, "accept failed");
                continue;
            }
            Err(_) => break,
        };
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        accepted += 1;

        let delegate = Arc::clone(&delegate);
        let spawned = thread::Builder::new()
            .name(format!("connprims-conn-{accepted}"))
            .spawn(move || {
                if let Err(err) = delegate.handle(stream) {
                    warn!(error = %err, "connection ended with error");
                }
            });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(err) => warn!(error = %err, "failed to spawn connection thread"),
        }
    }

    if args.count.is_some() {
        for worker in workers {
            let _ = worker.join();
        }
    }
    info!(connections = accepted, "server stopped");
    Ok(SUCCESS)
}

/// Echo every data command back under its sequence number and answer pings.
fn echo(transport: FramedTransport) -> Result<(), DelegateError> {
    let remote = transport.remote_addr();
    debug!(%remote, "connection ready");

    let result = loop {
        let received = match transport.receive() {
            Ok(received) => received,
            Err(TransportError::ConnectionClosed) => break Ok(()),
            Err(err) => break Err(err),
        };
        match answer_ping(&transport, &received) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => break Err(err),
        }
        if received.item.is_pong() {
            continue;
        }
        if let Err(err) = transport
            .send(received.seq, &received.item)
            .and_then(|_| transport.flush())
        {
            break Err(err);
        }
    };

    if let Err(err) = transport.close() {
        debug!(%remote, error = %err, "close after echo failed");
    }
    debug!(%remote, "connection finished");
    result.map_err(DelegateError::from)
}
