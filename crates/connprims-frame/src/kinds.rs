//! Frame kinds.
//!
//! Kinds below [`DATA`] carry connection control traffic. The handshake kinds
//! are only valid before the first application frame.

/// Server's connection info (handshake).
pub const INFO: u16 = 1;

/// Server's connection settings (handshake).
pub const SETTINGS: u16 = 2;

/// Liveness probe.
pub const PING: u16 = 3;

/// Reply to [`PING`].
pub const PONG: u16 = 4;

/// Application payload.
pub const DATA: u16 = 16;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        INFO => "INFO",
        SETTINGS => "SETTINGS",
        PING => "PING",
        PONG => "PONG",
        DATA => "DATA",
        _ => "UNKNOWN",
    }
}

/// Returns true for kinds exchanged only during the handshake.
pub fn is_handshake(kind: u16) -> bool {
    matches!(kind, INFO | SETTINGS)
}
