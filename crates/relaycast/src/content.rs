use std::fmt;
use std::time::Duration;

use bytes::Bytes;

/// One restart epoch of a channel's media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a content chunk inside a channel.
///
/// Ordered by `(stream_id, position)`; the timestamp rides along for
/// callers that want it but does not take part in comparisons.
#[derive(Debug, Clone, Copy)]
pub struct ReadPoint {
    pub stream_id: StreamId,
    pub timestamp: Duration,
    pub position: u64,
}

impl ReadPoint {
    fn key(&self) -> (StreamId, u64) {
        (self.stream_id, self.position)
    }
}

impl PartialEq for ReadPoint {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ReadPoint {}

impl PartialOrd for ReadPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ReadPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stream_id, self.position)
    }
}

/// An immutable, position-addressed slice of a channel's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub stream_id: StreamId,
    /// Elapsed time since the stream epoch started.
    pub timestamp: Duration,
    /// Byte offset within the stream epoch.
    pub position: u64,
    pub data: Bytes,
    /// Set when the chunk does not begin on a frame boundary.
    pub continuation: bool,
}

impl Content {
    pub fn read_point(&self) -> ReadPoint {
        ReadPoint {
            stream_id: self.stream_id,
            timestamp: self.timestamp,
            position: self.position,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Container setup data for one stream epoch.
///
/// Empty for transport streams and headerless FLV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeader {
    pub stream_id: StreamId,
    pub timestamp: Duration,
    pub position: u64,
    pub data: Bytes,
}

impl ContentHeader {
    pub fn new(stream_id: StreamId, data: Bytes) -> Self {
        Self {
            stream_id,
            timestamp: Duration::ZERO,
            position: 0,
            data,
        }
    }

    pub fn read_point(&self) -> ReadPoint {
        ReadPoint {
            stream_id: self.stream_id,
            timestamp: self.timestamp,
            position: self.position,
        }
    }
}
