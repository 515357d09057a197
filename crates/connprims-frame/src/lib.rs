//! Length-prefixed wire framing and a reference framed transport.
//!
//! Every frame carries:
//! - A 2-byte magic number ("CP") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind
//! - An 8-byte little-endian sequence number
//!
//! [`FramedTransport`] implements the connprims transport contract on top of
//! this codec for Unix domain sockets and TCP.

pub mod codec;
pub mod error;
pub mod kinds;
pub mod message;
pub mod reader;
pub mod transport;
pub mod varint;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    UNLIMITED_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use message::Message;
pub use reader::FrameReader;
pub use transport::{FramedConnector, FramedTransport, FramedTransportFactory};
pub use writer::FrameWriter;
