//! Echo server that handshakes every connection before echoing.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/connprims-echo-<pid>/echo.sock \
//!     --info echo/1 --data hello

use std::fs;
use std::sync::Arc;
use std::thread;

use connprims::delegate::{answer_ping, DelegateError, ServerDelegate};
use connprims::frame::{FramedTransport, FramedTransportFactory};
use connprims::transport::{
    ConnectionInfo, ConnectionSettings, Endpoint, Transport, TransportError,
};

fn echo(transport: FramedTransport) -> Result<(), DelegateError> {
    eprintln!("Client ready: {}", transport.remote_addr());
    loop {
        let received = match transport.receive() {
            Ok(received) => received,
            Err(TransportError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        };
        if answer_ping(&transport, &received)? {
            eprintln!("Answered ping");
            continue;
        }
        eprintln!("Echoing seq {} ({} bytes)", received.seq, received.size);
        transport.send(received.seq, &received.item)?;
        transport.flush()?;
    }
    let _ = transport.close();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("connprims-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::Unix(sock_dir.join("echo.sock"));

    let server = ServerDelegate::new(
        ConnectionInfo::from("echo/1"),
        FramedTransportFactory::default(),
        echo,
    )?
    .with_settings(ConnectionSettings {
        max_command_size: 64 * 1024,
    });
    let server = Arc::new(server);

    let listener = endpoint.bind()?;
    eprintln!("Listening on {}", listener.endpoint());

    loop {
        let stream = listener.accept()?;
        let server = Arc::clone(&server);
        thread::spawn(move || {
            if let Err(err) = server.handle(stream) {
                eprintln!("Connection failed: {err}");
            }
        });
    }
}
