use std::time::Duration;

/// Default idle time before the first keepalive ping.
pub const DEFAULT_KEEPALIVE_TIME: Duration = Duration::from_secs(3);

/// Default interval between keepalive pings while the connection stays idle.
pub const DEFAULT_KEEPALIVE_INTVL: Duration = Duration::from_secs(1);

/// Configuration for the connection handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Deadline applied to each handshake read or write. Zero means unbounded.
    pub timeout: Duration,
}

impl HandshakeConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Configuration for keepalive pings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Idle time after the last flush before the first ping is sent.
    pub keepalive_time: Duration,
    /// Interval between pings once the connection is idle.
    pub keepalive_intvl: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            keepalive_time: DEFAULT_KEEPALIVE_TIME,
            keepalive_intvl: DEFAULT_KEEPALIVE_INTVL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert!(HandshakeConfig::default().timeout.is_zero());
        let keepalive = KeepaliveConfig::default();
        assert_eq!(keepalive.keepalive_time, Duration::from_secs(3));
        assert_eq!(keepalive.keepalive_intvl, Duration::from_secs(1));
    }
}
