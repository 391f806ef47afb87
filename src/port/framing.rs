//! Length-prefixed messages over a byte stream.
//!
//! Every frame is a 4-byte big-endian length followed by exactly that many
//! payload bytes, in both directions.
use std::io::{self, ErrorKind, Read, Write};

use thiserror::Error;

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("stream ended after {received} of {expected} payload bytes")]
    Truncated { expected: usize, received: usize },
    #[error("failed to allocate {0} bytes for an incoming frame")]
    Alloc(usize),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Duplex message port over a reader and a writer.
#[derive(Debug)]
pub struct PacketPort<R, W> {
    reader: R,
    writer: W,
    max_len: Option<usize>,
}

impl<R: Read, W: Write> PacketPort<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_len: None,
        }
    }

    /// Rejects incoming frames longer than `max_len` before allocating.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Reads the next message.
    ///
    /// `Ok(None)` means the stream ended before a complete length prefix,
    /// which is the normal way for the parent to close the port.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; LEN_PREFIX];
        if read_full(&mut self.reader, &mut prefix)? < LEN_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if let Some(max) = self.max_len {
            if len > max {
                return Err(FrameError::TooLarge { len, max });
            }
        }

        let mut payload = Vec::new();
        payload
            .try_reserve_exact(len)
            .map_err(|_| FrameError::Alloc(len))?;
        let received = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if received < len {
            return Err(FrameError::Truncated {
                expected: len,
                received,
            });
        }

        log::trace!("Received frame of {} bytes", len);
        Ok(Some(payload))
    }

    /// Writes `payload` as one frame and flushes. Returns the bytes written,
    /// prefix included.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, FrameError> {
        let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;

        log::trace!("Sent frame of {} bytes", payload.len());
        Ok(LEN_PREFIX + payload.len())
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

// Fills `buf` as far as the stream allows; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
