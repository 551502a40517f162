use std::collections::VecDeque;

use bytes::Bytes;
use serde::Serialize;

/// A closed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub sequence: u64,
    /// Whole seconds, at least 1.
    pub duration_secs: u32,
    pub data: Bytes,
}

impl SegmentDescriptor {
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            sequence: self.sequence,
            duration_secs: self.duration_secs,
        }
    }
}

/// Listing entry of a segment, without its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub sequence: u64,
    pub duration_secs: u32,
}

/// Most recent closed segments in ascending sequence order.
#[derive(Debug)]
pub struct SegmentWindow {
    segments: VecDeque<SegmentDescriptor>,
    capacity: usize,
    listing_size: usize,
}

impl SegmentWindow {
    pub fn new(capacity: usize, listing_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            segments: VecDeque::with_capacity(capacity + 1),
            capacity,
            listing_size,
        }
    }

    /// Append a segment, evicting from the front past capacity.
    ///
    /// Returns the evicted segment, if any.
    pub fn push(&mut self, segment: SegmentDescriptor) -> Option<SegmentDescriptor> {
        debug_assert!(
            self.segments
                .back()
                .is_none_or(|last| last.sequence < segment.sequence)
        );
        self.segments.push_back(segment);
        if self.segments.len() > self.capacity {
            self.segments.pop_front()
        } else {
            None
        }
    }

    pub fn get(&self, sequence: u64) -> Option<&SegmentDescriptor> {
        self.segments.iter().find(|s| s.sequence == sequence)
    }

    /// Segment bytes, empty once evicted or never produced.
    pub fn data(&self, sequence: u64) -> Bytes {
        self.get(sequence)
            .map(|s| s.data.clone())
            .unwrap_or_default()
    }

    /// The newest `listing_size` segments, ascending.
    pub fn list_recent(&self) -> Vec<SegmentInfo> {
        let skip = self.segments.len().saturating_sub(self.listing_size);
        self.segments.iter().skip(skip).map(SegmentDescriptor::info).collect()
    }

    pub fn newest_sequence(&self) -> Option<u64> {
        self.segments.back().map(|s| s.sequence)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentDescriptor> {
        self.segments.iter()
    }
}
