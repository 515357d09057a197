use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};

use crate::codec::{encode_frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Buffers encoded frames and writes them to a `Write` stream on [`flush`].
///
/// [`send`] never touches the stream. A failed [`flush`] keeps whatever was
/// not yet written, so a later flush continues where it stopped.
///
/// [`send`]: FrameWriter::send
/// [`flush`]: FrameWriter::flush
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode a frame into the buffer. Returns its wire size.
    pub fn send(&mut self, kind: u16, seq: u64, payload: &[u8]) -> Result<usize> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(kind, seq, payload, &mut self.buf)?;
        Ok(HEADER_SIZE + payload.len())
    }

    /// Write every buffered byte, then flush the stream.
    pub fn flush(&mut self) -> Result<()> {
        while !self.buf.is_empty() {
            match self.inner.write(&self.buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.buf.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes accepted by `send` but not yet written.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame encoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    pub fn max_payload_size(&self) -> usize {
        self.config.max_payload_size
    }
}
