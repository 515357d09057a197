//! Connection info and settings exchange.
//!
//! The server speaks first: it sends its [`ConnectionInfo`] and then its
//! [`ConnectionSettings`], once per physical connection and before any
//! application traffic. The client compares the info byte-for-byte with the
//! value it expects and hands the settings to its transport.

use connprims_transport::{
    deadline_after, ClientTransport, ConnectionInfo, ConnectionSettings, ServerTransport,
};
use tracing::{debug, warn};

use crate::config::HandshakeConfig;
use crate::error::{DelegateError, Result};

/// Run the client side of the handshake. Returns the applied settings.
///
/// A mismatch fails before the settings are read and leaves the receive
/// deadline in place; the transport is otherwise untouched and still usable.
/// I/O errors are returned as they are, without retrying.
pub fn handshake_client<T: ClientTransport>(
    transport: &T,
    expected: &ConnectionInfo,
    config: &HandshakeConfig,
) -> Result<ConnectionSettings> {
    transport.set_receive_deadline(deadline_after(config.timeout))?;
    let received = transport.receive_connection_info()?;
    if received != *expected {
        warn!(
            remote = %transport.remote_addr(),
            ?expected,
            ?received,
            "server connection info mismatch"
        );
        return Err(DelegateError::HandshakeMismatch {
            expected: expected.clone(),
            received,
        });
    }

    transport.set_receive_deadline(deadline_after(config.timeout))?;
    let settings = transport.receive_connection_settings()?;
    transport.apply_connection_settings(settings)?;
    transport.set_receive_deadline(None)?;

    debug!(
        remote = %transport.remote_addr(),
        max_command_size = settings.max_command_size,
        "client handshake complete"
    );
    Ok(settings)
}

/// Run the server side of the handshake.
///
/// With a zero timeout no send deadline is touched at all.
pub fn handshake_server<T: ServerTransport>(
    transport: &T,
    info: &ConnectionInfo,
    settings: &ConnectionSettings,
    config: &HandshakeConfig,
) -> Result<()> {
    if info.is_empty() {
        return Err(DelegateError::EmptyConnectionInfo);
    }

    let timed = !config.timeout.is_zero();
    if timed {
        transport.set_send_deadline(deadline_after(config.timeout))?;
    }
    transport.send_connection_info(info)?;

    if timed {
        transport.set_send_deadline(deadline_after(config.timeout))?;
    }
    transport.send_connection_settings(settings)?;

    if timed {
        transport.set_send_deadline(None)?;
    }
    debug!(remote = %transport.remote_addr(), "server handshake complete");
    Ok(())
}
