//! Keyframe-aligned segmentation of a channel's transport stream.
//!
//! The [`Segmenter`] walks every 188-byte packet of the content it is fed,
//! asks its [`BoundaryClassifier`] whether the packet may start a segment,
//! and closes the open segment into a bounded [`SegmentWindow`] at each
//! boundary. The window is shared behind a lock so readers can list and
//! fetch segments while the segmenter task keeps writing.

mod cache;
mod classifier;
mod window;

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use ts::{TS_PACKET_SIZE, TsPacketRef};

pub use cache::CacheBuffer;
pub use classifier::{BoundaryClassifier, KeyframeClassifier, VideoIntervalClassifier};
pub use window::{SegmentDescriptor, SegmentInfo, SegmentWindow};

use crate::channel::Channel;
use crate::config::SegmenterConfig;
use crate::content::Content;
use crate::error::StoreError;
use crate::store::CursorItem;

/// Segment window shared between the segmenter and its readers.
pub type SharedWindow = Arc<RwLock<SegmentWindow>>;

pub struct Segmenter<C> {
    classifier: C,
    /// Sequence of the segment being accumulated.
    open: Option<u64>,
    next_sequence: u64,
    /// Stream time of the last boundary.
    keyframe_timestamp: Duration,
    cache: CacheBuffer,
    /// Partial packet left over from the previous chunk.
    carry: BytesMut,
    window: SharedWindow,
    closed_tx: Option<mpsc::UnboundedSender<SegmentDescriptor>>,
}

impl Segmenter<KeyframeClassifier> {
    pub fn keyframe(config: &SegmenterConfig) -> Self {
        Self::new(KeyframeClassifier, config)
    }
}

impl Segmenter<VideoIntervalClassifier> {
    pub fn video_interval(config: &SegmenterConfig) -> Self {
        Self::new(VideoIntervalClassifier::default(), config)
    }
}

impl<C: BoundaryClassifier> Segmenter<C> {
    pub fn new(classifier: C, config: &SegmenterConfig) -> Self {
        Self {
            classifier,
            open: None,
            next_sequence: 0,
            keyframe_timestamp: Duration::ZERO,
            cache: CacheBuffer::new(config.cache_limit),
            carry: BytesMut::with_capacity(TS_PACKET_SIZE),
            window: Arc::new(RwLock::new(SegmentWindow::new(
                config.window_size,
                config.listing_size,
            ))),
            closed_tx: None,
        }
    }

    /// Receive every segment as it closes, including ones the window later
    /// evicts. Replaces any previous receiver.
    pub fn closed_segments(&mut self) -> mpsc::UnboundedReceiver<SegmentDescriptor> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.closed_tx = Some(tx);
        rx
    }

    pub fn window(&self) -> SharedWindow {
        self.window.clone()
    }

    pub fn open_sequence(&self) -> Option<u64> {
        self.open
    }

    /// Bytes accumulated for the open segment.
    pub fn open_segment_len(&self) -> usize {
        self.cache.len()
    }

    /// Feed one content chunk. Returns how many segments were closed.
    pub fn feed(&mut self, content: &Content) -> usize {
        let timestamp = content.timestamp;
        let mut data: &[u8] = &content.data;
        let mut closed = 0;

        if !self.carry.is_empty() {
            let take = (TS_PACKET_SIZE - self.carry.len()).min(data.len());
            self.carry.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.carry.len() < TS_PACKET_SIZE {
                return 0;
            }
            let packet = self.carry.split();
            closed += usize::from(self.feed_packet(&packet, timestamp));
        }

        let mut packets = data.chunks_exact(TS_PACKET_SIZE);
        for packet in &mut packets {
            closed += usize::from(self.feed_packet(packet, timestamp));
        }
        self.carry.extend_from_slice(packets.remainder());
        closed
    }

    fn feed_packet(&mut self, packet: &[u8], timestamp: Duration) -> bool {
        let elapsed = timestamp.saturating_sub(self.keyframe_timestamp);
        let boundary = TsPacketRef::parse(packet)
            .is_ok_and(|parsed| self.classifier.is_boundary(&parsed, elapsed));

        let mut closed = false;
        if boundary {
            if let Some(sequence) = self.open {
                self.close_segment(sequence, elapsed);
                closed = true;
            }
            self.open = Some(self.next_sequence);
            self.next_sequence += 1;
            self.keyframe_timestamp = timestamp;
        }
        if self.open.is_some() {
            self.cache.push(packet);
        }
        closed
    }

    fn close_segment(&mut self, sequence: u64, elapsed: Duration) {
        let duration_secs = u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX).max(1);
        if self.cache.dropped_bytes() > 0 {
            warn!(sequence, dropped = self.cache.dropped_bytes(), "Segment truncated by cache limit");
        }
        let segment = SegmentDescriptor {
            sequence,
            duration_secs,
            data: self.cache.take(),
        };
        let len = segment.data.len();
        if let Some(tx) = &self.closed_tx
            && tx.send(segment.clone()).is_err()
        {
            self.closed_tx = None;
        }
        let evicted = self.window.write().push(segment);
        debug!(
            sequence,
            duration_secs,
            len,
            evicted = ?evicted.map(|s| s.sequence),
            rule = self.classifier.name(),
            "Segment closed"
        );
    }

    /// Drop the in-progress segment when the stream restarts.
    ///
    /// Closed segments stay retrievable; the next segment reuses the
    /// discarded sequence number so numbering stays gap-free.
    pub fn reset_epoch(&mut self) {
        if let Some(sequence) = self.open.take() {
            self.next_sequence = sequence;
            trace!(sequence, discarded = self.cache.len(), "Discarding open segment");
        }
        self.cache.clear();
        self.carry.clear();
        self.keyframe_timestamp = Duration::ZERO;
    }
}

/// Feed a channel's content into `segmenter` until the store closes or
/// `token` is cancelled.
pub async fn run_segmenter<C>(channel: Arc<Channel>, mut segmenter: Segmenter<C>, token: CancellationToken)
where
    C: BoundaryClassifier,
{
    let mut cursor = channel.store().cursor();
    let mut seen_epoch = false;

    loop {
        let batch = tokio::select! {
            _ = token.cancelled() => break,
            batch = cursor.next_batch() => batch,
        };
        match batch {
            Ok(items) => {
                for item in items {
                    match item {
                        CursorItem::Header(header) => {
                            if seen_epoch {
                                segmenter.reset_epoch();
                            }
                            seen_epoch = true;
                            debug!(channel = %channel.id(), stream_id = %header.stream_id, "Segmenting new epoch");
                        }
                        CursorItem::Content(content) => {
                            segmenter.feed(&content);
                        }
                    }
                }
            }
            Err(StoreError::FellBehind { position, horizon, .. }) => {
                warn!(channel = %channel.id(), position, horizon, "Segmenter fell behind, restarting segment");
                segmenter.reset_epoch();
                cursor.resync();
            }
            Err(StoreError::Closed) => break,
            Err(e) => {
                warn!(channel = %channel.id(), error = %e, "Segmenter stopped");
                break;
            }
        }
    }

    info!(
        channel = %channel.id(),
        segments = segmenter.window.read().len(),
        "Segmenter finished"
    );
}
