use connprims_transport::{ConnectionInfo, TransportError};

/// Errors produced by the connection lifecycle layer.
///
/// I/O on an established delegate reports [`TransportError`] unchanged; this
/// type covers construction, handshakes and reconnects.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    /// A server was configured with empty connection info.
    #[error("server connection info must not be empty")]
    EmptyConnectionInfo,

    /// The server identified itself with different connection info.
    #[error("server connection info mismatch: expected {expected:?}, received {received:?}")]
    HandshakeMismatch {
        expected: ConnectionInfo,
        received: ConnectionInfo,
    },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The delegate has been closed.
    #[error("delegate is closed")]
    Closed,
}

impl DelegateError {
    /// Mismatches are permanent: retrying against the same server cannot help.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, DelegateError::HandshakeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, DelegateError>;
