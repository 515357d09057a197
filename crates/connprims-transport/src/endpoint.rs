use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::stream::Stream;
use crate::tcp::TcpSocket;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Where to listen or connect.
///
/// Parsed from `tcp://host:port`, `unix:///path`, a bare `host:port`, or a bare
/// filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Open a client connection.
    pub fn connect(&self) -> Result<Stream> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(TransportError::Connect {
                endpoint: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }),
            Endpoint::Tcp(addr) => TcpSocket::connect(*addr),
        }
    }

    /// Bind a listener.
    pub fn bind(&self) -> Result<Listener> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Listener::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(TransportError::Bind {
                endpoint: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }),
            Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpSocket::bind(*addr)?)),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }
        if let Some(rest) = input.strip_prefix("tcp://") {
            return rest
                .parse()
                .map(Endpoint::Tcp)
                .map_err(|_| TransportError::InvalidEndpoint(input.to_string()));
        }
        if let Some(rest) = input.strip_prefix("unix://") {
            if rest.is_empty() {
                return Err(TransportError::InvalidEndpoint(input.to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(rest)));
        }
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }
        Ok(Endpoint::Unix(PathBuf::from(input)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// A bound listener for either endpoint kind.
pub enum Listener {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpSocket),
}

impl Listener {
    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        match self {
            #[cfg(unix)]
            Listener::Unix(socket) => socket.accept(),
            Listener::Tcp(socket) => socket.accept(),
        }
    }

    /// The endpoint clients should connect to. Resolves ephemeral TCP ports.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            Listener::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
            Listener::Tcp(socket) => Endpoint::Tcp(socket.local_addr()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Listener::Unix(socket) => socket.transport_name(),
            Listener::Tcp(socket) => socket.transport_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_forms() {
        assert_eq!(
            "tcp://127.0.0.1:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            "127.0.0.1:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            "unix:///tmp/a.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/a.sock"))
        );
        assert_eq!(
            "/tmp/b.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/b.sock"))
        );
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            "".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            "tcp://nowhere".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            "unix://".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn display_roundtrips() {
        for raw in ["tcp://127.0.0.1:80", "unix:///run/x.sock"] {
            let endpoint: Endpoint = raw.parse().unwrap();
            assert_eq!(endpoint.to_string(), raw);
        }
    }

    #[test]
    fn tcp_listener_reports_resolved_port() {
        let listener = "127.0.0.1:0".parse::<Endpoint>().unwrap().bind().unwrap();
        match listener.endpoint() {
            Endpoint::Tcp(addr) => assert_ne!(addr.port(), 0),
            other => panic!("unexpected endpoint {other:?}"),
        }
        assert_eq!(listener.transport_name(), "tcp");
    }
}
