use std::time::Duration;

use ts::TsPacketRef;

/// Decides whether a transport packet may start a new segment.
pub trait BoundaryClassifier: Send {
    /// `since_last_boundary` is the stream time elapsed since the previous
    /// boundary (or since the epoch origin before the first one).
    fn is_boundary(&self, packet: &TsPacketRef<'_>, since_last_boundary: Duration) -> bool;

    fn name(&self) -> &'static str;
}

/// Cut on every packet flagged as a random access point.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeClassifier;

impl BoundaryClassifier for KeyframeClassifier {
    fn is_boundary(&self, packet: &TsPacketRef<'_>, _since_last_boundary: Duration) -> bool {
        packet.is_keyframe()
    }

    fn name(&self) -> &'static str {
        "keyframe"
    }
}

/// Cut on the first video PES start once `min_interval` has passed.
///
/// For sources whose random access flags cannot be trusted.
#[derive(Debug, Clone, Copy)]
pub struct VideoIntervalClassifier {
    pub min_interval: Duration,
}

impl Default for VideoIntervalClassifier {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(6),
        }
    }
}

impl BoundaryClassifier for VideoIntervalClassifier {
    fn is_boundary(&self, packet: &TsPacketRef<'_>, since_last_boundary: Duration) -> bool {
        packet.is_video_start() && since_last_boundary > self.min_interval
    }

    fn name(&self) -> &'static str {
        "video-interval"
    }
}
