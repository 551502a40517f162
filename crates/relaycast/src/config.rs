use std::time::Duration;

use mp4::DEFAULT_MAX_BOX_SIZE;

/// Default body cache ceiling shared by the TS demuxer, the segmenter and
/// the ingestor.
pub const DEFAULT_CACHE_LIMIT: usize = 8 * 1024 * 1024;

/// Flush threshold for TS content chunks (38 packets).
pub const DEFAULT_TS_FLUSH_THRESHOLD: usize = 7144;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a chunk stays readable after it was appended.
    pub time_to_live: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Closed segments retained for retrieval.
    pub window_size: usize,
    /// Segments exposed by listings and playlists.
    pub listing_size: usize,
    /// Ceiling of the in-progress segment buffer.
    pub cache_limit: usize,
}

impl SegmenterConfig {
    /// Window used with the strict keyframe boundary rule.
    pub fn keyframe() -> Self {
        Self {
            window_size: 7,
            listing_size: 3,
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }

    /// Window used with the video-interval boundary rule.
    pub fn video_interval() -> Self {
        Self {
            window_size: 5,
            ..Self::keyframe()
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::keyframe()
    }
}

#[derive(Debug, Clone)]
pub struct TsDemuxConfig {
    /// A chunk is emitted at the next payload-unit-start once this many
    /// bytes are buffered.
    pub flush_threshold: usize,
    pub cache_limit: usize,
}

impl Default for TsDemuxConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_TS_FLUSH_THRESHOLD,
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlvDemuxConfig {
    /// Buffered bytes allowed while a tag is incomplete.
    pub cache_ceiling: usize,
}

impl Default for FlvDemuxConfig {
    fn default() -> Self {
        Self {
            cache_ceiling: flv::DEFAULT_CACHE_CEILING,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mp4DemuxConfig {
    pub max_box_size: usize,
    /// Require `moof`+`mdat` pairs for body units. When false every box is
    /// passed through as its own unit.
    pub strict_pairs: bool,
}

impl Default for Mp4DemuxConfig {
    fn default() -> Self {
        Self {
            max_box_size: DEFAULT_MAX_BOX_SIZE,
            strict_pairs: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Wake-up tick of the ingest loop.
    pub poll_interval: Duration,
    /// Delay before retrying a failed manifest or segment fetch.
    pub retry_backoff: Duration,
    /// Consecutive fetch failures after which the ingest gives up.
    pub max_consecutive_failures: u32,
    /// Pacing window of the leaky bucket.
    pub pacing_window: Duration,
    /// Nominal segment duration assumed before the first manifest.
    pub default_segment_duration: Duration,
    pub flush_threshold: usize,
    pub cache_limit: usize,
    /// Largest manifest or segment body accepted.
    pub max_body_size: usize,
    pub request_timeout: Duration,
    /// Fetched segment URLs remembered for de-duplication.
    pub seen_url_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(3),
            max_consecutive_failures: 3,
            pacing_window: Duration::from_millis(80),
            default_segment_duration: Duration::from_secs(8),
            flush_threshold: DEFAULT_TS_FLUSH_THRESHOLD,
            cache_limit: DEFAULT_CACHE_LIMIT,
            max_body_size: DEFAULT_CACHE_LIMIT,
            request_timeout: Duration::from_secs(10),
            seen_url_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub initial_delay: Duration,
    pub period: Duration,
    pub ttl: u8,
    pub hops: u8,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            period: Duration::from_secs(30),
            ttl: 12,
            hops: 0,
        }
    }
}

/// Every tunable of the engine in one place.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub segmenter: SegmenterConfig,
    pub ts: TsDemuxConfig,
    pub flv: FlvDemuxConfig,
    pub mp4: Mp4DemuxConfig,
    pub ingest: IngestConfig,
    pub notifier: NotifierConfig,
}
