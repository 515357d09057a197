//! Client that keeps its connection alive with pings and reconnects when the
//! server drops it.
//!
//! Start `echo-server` first, then:
//!   cargo run --example reconnecting-client -- /tmp/connprims-echo-<pid>/echo.sock

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use connprims::delegate::{ClientDelegate, KeepaliveConfig, ReconnectClientDelegate};
use connprims::frame::Message;
use connprims::transport::{deadline_after, ConnectionInfo, Endpoint};
use connprims::ClientConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .ok_or("usage: reconnecting-client <endpoint>")?
        .parse()?;

    let config = ClientConfig {
        keepalive: KeepaliveConfig {
            keepalive_time: Duration::from_millis(500),
            keepalive_intvl: Duration::from_millis(250),
        },
        ..ClientConfig::default()
    };
    let send_lock = Arc::new(Mutex::new(()));
    let client = connprims::connect(
        endpoint,
        ConnectionInfo::from("echo/1"),
        &config,
        Arc::clone(&send_lock),
    )?;
    eprintln!("Connected to {}", client.remote_addr());

    for seq in 1..=5u64 {
        let payload = format!("message {seq}");
        let sent = {
            let _guard = send_lock.lock().map_err(|_| "send lock poisoned")?;
            client.send(seq, &Message::Data(payload.into()))
        };
        let result = sent.and_then(|_| client.flush());
        if let Err(err) = result {
            eprintln!("Send failed ({err}), reconnecting");
            client.reconnect()?;
            continue;
        }

        client.set_receive_deadline(deadline_after(Duration::from_secs(2)))?;
        match client.receive() {
            Ok(reply) => eprintln!("Reply seq {}: {:?}", reply.seq, reply.item),
            Err(err) => {
                eprintln!("Receive failed ({err}), reconnecting");
                client.reconnect()?;
            }
        }

        // Idle long enough for keepalive pings to go out.
        thread::sleep(Duration::from_secs(1));
    }

    client.close()?;
    Ok(())
}
