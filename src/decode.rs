//! Incremental decoder for response bodies made of concatenated JSON events.

use crate::error::StreamError;
use crate::types::Event;
use bytes::{Buf, BytesMut};
use serde_json::Deserializer;

/// Decoder for a body of back-to-back JSON objects.
///
/// Bytes are pushed as they arrive from the network; complete events are
/// pulled out one at a time. Only the current partial event is kept in the
/// buffer, never the whole body.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: BytesMut,
    decoded: u64,
    /// Whether the buffer may hold a complete event the last scan did not see.
    ready: bool,
    #[cfg(test)]
    scans: usize,
}

impl EventDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the body.
    ///
    /// An event can only complete on a closing brace, so a partial event is
    /// not rescanned until one arrives.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.buffer.is_empty() || chunk.contains(&b'}') {
            self.ready = true;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Decode the next complete event.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete event yet.
    pub fn next_event(&mut self) -> Result<Option<Event>, StreamError> {
        if !self.ready {
            return Ok(None);
        }
        #[cfg(test)]
        {
            self.scans += 1;
        }

        let mut values = Deserializer::from_slice(&self.buffer).into_iter::<Event>();

        match values.next() {
            Some(Ok(event)) => {
                let consumed = values.byte_offset();
                self.buffer.advance(consumed);
                self.decoded += 1;
                Ok(Some(event))
            }
            // Partial value: wait for more bytes
            Some(Err(err)) if err.is_eof() => {
                self.ready = false;
                Ok(None)
            }
            Some(Err(err)) => Err(StreamError::Decode(format!(
                "event #{}: {}",
                self.decoded + 1,
                err
            ))),
            None => {
                // Only whitespace left
                self.buffer.clear();
                self.ready = false;
                Ok(None)
            }
        }
    }

    /// Check that the body ended on an event boundary.
    pub fn finish(&self) -> Result<(), StreamError> {
        let pending = self
            .buffer
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .count();
        if pending == 0 {
            Ok(())
        } else {
            Err(StreamError::Truncated {
                pending: self.buffer.len(),
            })
        }
    }

    /// Number of events decoded so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Bytes held for the event currently being decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
