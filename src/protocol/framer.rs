//! Newline-delimited framing.
//!
//! Inbound bytes accumulate in a per-connection `BytesMut`. A frame is
//! only cut once its delimiter has arrived; the delimiter itself is
//! dropped. Outbound replies are serialized straight into the send buffer
//! followed by the delimiter.

use crate::protocol::message::{FrameError, Reply};
use bytes::{BufMut, Bytes, BytesMut};

/// Frame delimiter.
pub const DELIMITER: u8 = b'\n';

/// Splits receive buffers into frames and encodes replies.
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    max_frame_size: usize,
}

impl Framer {
    /// `max_frame_size` bounds a single frame, excluding the delimiter.
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Cut the next complete, non-empty frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` when no delimiter is buffered yet. Empty frames
    /// (keepalives) are consumed silently.
    pub fn next_frame(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        loop {
            let Some(pos) = buf.iter().position(|&b| b == DELIMITER) else {
                if buf.len() > self.max_frame_size {
                    return Err(FrameError::Oversized {
                        limit: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            if pos > self.max_frame_size {
                return Err(FrameError::Oversized {
                    limit: self.max_frame_size,
                });
            }

            let mut frame = buf.split_to(pos + 1);
            frame.truncate(pos);

            if !frame.is_empty() {
                return Ok(Some(frame.freeze()));
            }
        }
    }

    /// Serialize `reply` and append it, delimited, to `out`.
    pub fn encode(&self, reply: &Reply, out: &mut BytesMut) -> Result<(), serde_json::Error> {
        serde_json::to_writer((&mut *out).writer(), reply)?;
        out.put_u8(DELIMITER);
        Ok(())
    }
}
