use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// Identifies protocol and version compatibility between a client and a server.
///
/// Sent by the server once per physical connection before any application
/// traffic. The client compares it byte-for-byte with the value it expects.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ConnectionInfo(Bytes);

impl ConnectionInfo {
    /// Create connection info from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for ConnectionInfo {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&'static str> for ConnectionInfo {
    fn from(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for ConnectionInfo {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<String> for ConnectionInfo {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => f.debug_tuple("ConnectionInfo").field(&text).finish(),
            Err(_) => f
                .debug_tuple("ConnectionInfo")
                .field(&format_args!("<binary {} bytes>", self.0.len()))
                .finish(),
        }
    }
}

/// Tunables pushed by the server after [`ConnectionInfo`].
///
/// The transport applies them to its own enforcement state; the delegate layer
/// only carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSettings {
    /// Maximum encoded command size in bytes. `<= 0` means unlimited.
    pub max_command_size: i64,
}

impl ConnectionSettings {
    /// Settings with no command size limit.
    pub const UNLIMITED: Self = Self {
        max_command_size: 0,
    };

    /// The command size limit, or `None` when unlimited.
    pub fn command_size_limit(&self) -> Option<usize> {
        if self.max_command_size <= 0 {
            None
        } else {
            Some(usize::try_from(self.max_command_size).unwrap_or(usize::MAX))
        }
    }
}
