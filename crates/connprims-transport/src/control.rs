//! Liveness probe vocabulary.
//!
//! A Ping is a zero-payload command and a Pong its zero-payload reply. Command
//! and reply types that can carry them implement these traits so the keepalive
//! machinery can inject pings and drop pongs without knowing the codec.

/// Sequence number used for every Ping.
pub const PING_SEQ: crate::Seq = 0;

/// A command type that can express a Ping.
pub trait PingCommand {
    /// Build the Ping sentinel.
    fn ping() -> Self;

    /// Returns true if this command is a Ping.
    fn is_ping(&self) -> bool;
}

/// A reply type that can express a Pong.
pub trait PongReply {
    /// Build the Pong sentinel.
    fn pong() -> Self;

    /// Returns true if this reply is a Pong.
    fn is_pong(&self) -> bool;
}
