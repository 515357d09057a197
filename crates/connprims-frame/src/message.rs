use bytes::Bytes;
use connprims_transport::{PingCommand, PongReply};

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::kinds;

/// Application-level item carried by a [`crate::FramedTransport`].
///
/// Used as both the command and the reply type: a client sends `Data` and
/// `Ping`, a server answers with `Data` and `Pong`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping,
    Pong,
    Data(Bytes),
}

impl Message {
    /// The frame kind this message is written as.
    pub fn kind(&self) -> u16 {
        match self {
            Message::Ping => kinds::PING,
            Message::Pong => kinds::PONG,
            Message::Data(_) => kinds::DATA,
        }
    }

    /// The payload bytes, empty for control messages.
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Data(bytes) => bytes,
            Message::Ping | Message::Pong => &[],
        }
    }

    /// Interpret a frame received after the handshake.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        match frame.kind {
            kinds::PING => Ok(Message::Ping),
            kinds::PONG => Ok(Message::Pong),
            kinds::DATA => Ok(Message::Data(frame.payload)),
            other => Err(FrameError::UnexpectedKind {
                expected: "PING, PONG or DATA",
                found: kinds::kind_name(other),
            }),
        }
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Message::Data(bytes)
    }
}

impl From<&'static [u8]> for Message {
    fn from(bytes: &'static [u8]) -> Self {
        Message::Data(Bytes::from_static(bytes))
    }
}

impl PingCommand for Message {
    fn ping() -> Self {
        Message::Ping
    }

    fn is_ping(&self) -> bool {
        matches!(self, Message::Ping)
    }
}

impl PongReply for Message {
    fn pong() -> Self {
        Message::Pong
    }

    fn is_pong(&self) -> bool {
        matches!(self, Message::Pong)
    }
}
