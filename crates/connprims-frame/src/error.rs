use connprims_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4350 \"CP\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame of a kind not valid at this point of the conversation.
    #[error("unexpected {found} frame (expected {expected})")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    /// A varint field is truncated, overlong, or followed by trailing bytes.
    #[error("malformed varint")]
    InvalidVarint,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => TransportError::Io(io),
            FrameError::ConnectionClosed => TransportError::ConnectionClosed,
            other => TransportError::Protocol(other.to_string()),
        }
    }
}
