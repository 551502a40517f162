//! Pull-based readout of a channel's segment window.

use std::fmt::Write as _;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::channel::Channel;
use crate::segmenter::{SegmentInfo, SharedWindow};

/// Token that marks a URL without an embedded sequence number.
const NO_SEQUENCE_SENTINEL: &str = "http:";

/// Digits of the sequence token in segment URLs.
const SEQUENCE_DIGITS: usize = 5;

/// HLS-style view over one channel's segments.
#[derive(Debug, Clone)]
pub struct HlsReadout {
    channel: Arc<Channel>,
    window: SharedWindow,
    uri_prefix: String,
}

impl HlsReadout {
    pub fn new(channel: Arc<Channel>, window: SharedWindow, uri_prefix: impl Into<String>) -> Self {
        Self {
            channel,
            window,
            uri_prefix: uri_prefix.into(),
        }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Up to the listing size of the newest segments, ascending.
    pub fn list_recent_segments(&self) -> Vec<SegmentInfo> {
        self.window.read().list_recent()
    }

    /// Bytes of segment `sequence`, empty when it is not (or no longer) held.
    ///
    /// With `with_header`, the current epoch header is prepended so the
    /// segment is self-contained.
    pub fn segment_bytes(&self, sequence: u64, with_header: bool) -> Bytes {
        let data = self.window.read().data(sequence);
        if data.is_empty() || !with_header {
            return data;
        }
        let Some(header) = self.channel.store().header().filter(|h| !h.data.is_empty()) else {
            return data;
        };
        let mut out = BytesMut::with_capacity(header.data.len() + data.len());
        out.extend_from_slice(&header.data);
        out.extend_from_slice(&data);
        out.freeze()
    }

    /// Length of the segment a request URL points at, `None` when the URL
    /// carries no sequence number.
    pub fn content_length(&self, url: &str, with_header: bool) -> Option<usize> {
        let sequence = Self::sequence_from_url(url)?;
        Some(self.segment_bytes(sequence, with_header).len())
    }

    /// Sequence number embedded as `_NNNNN` in a segment URL.
    pub fn sequence_from_url(url: &str) -> Option<u64> {
        let token = match url.rfind('_') {
            Some(idx) => &url[idx + 1..],
            None => url,
        };
        let token = token.get(..SEQUENCE_DIGITS)?;
        if token == NO_SEQUENCE_SENTINEL {
            return None;
        }
        token.parse().ok()
    }

    pub fn segment_uri(&self, sequence: u64) -> String {
        format!("{}_{:05}.ts", self.uri_prefix, sequence)
    }

    /// Render a live media playlist of the listed segments.
    pub fn playlist(&self) -> String {
        let segments = self.list_recent_segments();
        let target_duration = segments.iter().map(|s| s.duration_secs).max().unwrap_or(1);
        let media_sequence = segments.first().map_or(0, |s| s.sequence);

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "#EXTM3U");
        let _ = writeln!(out, "#EXT-X-VERSION:3");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target_duration}");
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{media_sequence}");
        for segment in &segments {
            let _ = writeln!(out, "#EXTINF:{},", segment.duration_secs);
            let _ = writeln!(out, "{}", self.segment_uri(segment.sequence));
        }
        out
    }
}
