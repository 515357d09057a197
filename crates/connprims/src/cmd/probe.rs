use std::time::{Duration, Instant};

use connprims::delegate::{Delegate, HandshakeConfig};
use connprims::frame::{FramedConnector, FramedTransport, Message};
use connprims::transport::{
    deadline_after, ClientTransport, ClientTransportFactory, ConnectionInfo, ConnectionSettings,
    Endpoint, PongReply, Transport, TransportError, PING_SEQ,
};
use tracing::debug;

use crate::cmd::{parse_duration, ProbeArgs};
use crate::exit::{delegate_error, transport_error, CliResult, SUCCESS};
use crate::output::{payload_preview, print_probe, OutputFormat, ProbeReport};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let connector = FramedConnector::new(args.endpoint.clone());

    let started = Instant::now();
    let transport = connector
        .new_transport()
        .map_err(|err| transport_error("connect failed", err))?;

    let (transport, info, settings) = match args.info {
        Some(expected) => {
            let expected = ConnectionInfo::from(expected);
            let config = HandshakeConfig::with_timeout(timeout);
            let delegate = match Delegate::try_new(transport, &expected, config) {
                Ok(delegate) => delegate,
                Err((err, transport)) => {
                    if let Err(close_err) = transport.close() {
                        debug!(error = %close_err, "close after failed handshake failed");
                    }
                    return Err(delegate_error("handshake failed", err));
                }
            };
            let settings = delegate.settings();
            (delegate.into_transport(), expected, settings)
        }
        None => discover(transport, timeout)
            .map_err(|err| transport_error("handshake failed", err))?,
    };
    let handshake = started.elapsed();

    let ping = Instant::now();
    round_trip_ping(&transport, timeout).map_err(|err| transport_error("ping failed", err))?;
    let ping = ping.elapsed();

    let credentials = transport.peer_credentials();
    let report = ProbeReport {
        endpoint: args.endpoint.to_string(),
        transport: match args.endpoint {
            Endpoint::Unix(_) => "uds",
            Endpoint::Tcp(_) => "tcp",
        },
        local: transport.local_addr().to_string(),
        remote: transport.remote_addr().to_string(),
        info: payload_preview(info.as_bytes()),
        max_command_size: settings.max_command_size,
        handshake_ms: handshake.as_millis(),
        ping_ms: ping.as_millis(),
        peer_uid: credentials.map(|(uid, _, _)| uid),
        peer_gid: credentials.map(|(_, gid, _)| gid),
        peer_pid: credentials.map(|(_, _, pid)| pid),
    };

    if let Err(err) = transport.close() {
        debug!(error = %err, "close after probe failed");
    }
    print_probe(&report, format);
    Ok(SUCCESS)
}

/// Read the server's handshake without checking its identity.
fn discover(
    transport: FramedTransport,
    timeout: Duration,
) -> Result<(FramedTransport, ConnectionInfo, ConnectionSettings), TransportError> {
    transport.set_receive_deadline(deadline_after(timeout))?;
    let info = transport.receive_connection_info()?;
    let settings = transport.receive_connection_settings()?;
    transport.apply_connection_settings(settings)?;
    transport.set_receive_deadline(None)?;
    Ok((transport, info, settings))
}

fn round_trip_ping(
    transport: &FramedTransport,
    timeout: Duration,
) -> Result<(), TransportError> {
    transport.set_send_deadline(deadline_after(timeout))?;
    transport.send(PING_SEQ, &Message::Ping)?;
    transport.flush()?;
    transport.set_receive_deadline(deadline_after(timeout))?;
    loop {
        let received = transport.receive()?;
        if received.item.is_pong() && received.seq == PING_SEQ {
            return Ok(());
        }
        debug!(seq = received.seq, "ignoring non-pong while probing");
    }
}
