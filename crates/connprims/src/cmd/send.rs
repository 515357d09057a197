use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use connprims::delegate::{
    ClientDelegate, HandshakeConfig, KeepaliveConfig, ReconnectClientDelegate,
};
use connprims::frame::Message;
use connprims::transport::{deadline_after, ConnectionInfo, Received, TransportError};
use connprims::ClientConfig;
use tracing::{debug, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{delegate_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = ClientConfig {
        handshake: HandshakeConfig::with_timeout(timeout),
        keepalive: KeepaliveConfig {
            keepalive_time: parse_duration(&args.keepalive_time)?,
            keepalive_intvl: parse_duration(&args.keepalive_intvl)?,
        },
        ..ClientConfig::default()
    };
    let command = Message::Data(resolve_payload(&args)?.into());

    let send_lock = Arc::new(Mutex::new(()));
    let client = connprims::connect(
        args.endpoint.clone(),
        ConnectionInfo::from(args.info.clone()),
        &config,
        Arc::clone(&send_lock),
    )
    .map_err(|err| delegate_error("connect failed", err))?;

    let started = Instant::now();
    let reply = match exchange(&client, &send_lock, args.seq, &command, timeout) {
        Ok(reply) => reply,
        Err(err) if is_connection_lost(&err) => {
            warn!(error = %err, "connection lost, reconnecting once");
            client
                .reconnect()
                .map_err(|err| delegate_error("reconnect failed", err))?;
            exchange(&client, &send_lock, args.seq, &command, timeout)
                .map_err(|err| transport_error("exchange failed", err))?
        }
        Err(err) => return Err(transport_error("exchange failed", err)),
    };
    print_reply(
        &reply,
        &client.remote_addr().to_string(),
        started.elapsed(),
        format,
    );

    client
        .close()
        .map_err(|err| transport_error("close failed", err))?;
    Ok(SUCCESS)
}

/// Send `command` and wait for the reply carrying the same sequence number.
fn exchange<D>(
    client: &D,
    send_lock: &Mutex<()>,
    seq: u64,
    command: &Message,
    timeout: Duration,
) -> Result<Received<Message>, TransportError>
where
    D: ClientDelegate<Command = Message, Reply = Message>,
{
    {
        let _guard = send_lock.lock().unwrap_or_else(PoisonError::into_inner);
        client.set_send_deadline(deadline_after(timeout))?;
        client.send(seq, command)?;
    }
    client.flush()?;

    client.set_receive_deadline(deadline_after(timeout))?;
    loop {
        let reply = client.receive()?;
        if reply.seq == seq {
            return Ok(reply);
        }
        debug!(seq = reply.seq, "skipping reply for another command");
    }
}

fn is_connection_lost(err: &TransportError) -> bool {
    match err {
        TransportError::ConnectionClosed => true,
        TransportError::Io(err) => matches!(
            err.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
