use bytes::{Bytes, BytesMut};
use tracing::warn;

/// Byte accumulator for the segment in progress.
///
/// Writes that would take it past `limit` are dropped whole.
#[derive(Debug)]
pub struct CacheBuffer {
    buf: BytesMut,
    limit: usize,
    dropped_bytes: u64,
}

impl CacheBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
            dropped_bytes: 0,
        }
    }

    /// Returns false when the write was dropped.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if self.buf.len() + bytes.len() > self.limit {
            if self.dropped_bytes == 0 {
                warn!(limit = self.limit, "Segment cache full, dropping data");
            }
            self.dropped_bytes += bytes.len() as u64;
            return false;
        }
        self.buf.extend_from_slice(bytes);
        true
    }

    /// Hand out the accumulated bytes and start over.
    pub fn take(&mut self) -> Bytes {
        self.dropped_bytes = 0;
        self.buf.split().freeze()
    }

    pub fn clear(&mut self) {
        self.dropped_bytes = 0;
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes dropped since the last `take` or `clear`.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }
}
