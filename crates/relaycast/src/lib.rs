// Relay core: container demuxing, the shared content store, keyframe
// segmentation and paced HLS ingest for one or more broadcast channels.
pub mod channel;
pub mod config;
pub mod content;
pub mod demux;
pub mod error;
pub mod ingest;
pub mod notifier;
pub mod readout;
pub mod segmenter;
pub mod store;

pub use channel::{Channel, ChannelId, StopReason};
pub use config::{
    EngineConfig, FlvDemuxConfig, IngestConfig, Mp4DemuxConfig, NotifierConfig, SegmenterConfig,
    StoreConfig, TsDemuxConfig,
};
pub use content::{Content, ContentHeader, ReadPoint, StreamId};
pub use demux::{ContentDemuxer, Demuxed, demuxer_for, run_demuxer};
pub use error::{DemuxError, IngestError, StoreError};
pub use ingest::{HttpFetcher, IngestEvent, IngestState, RatePacedIngestor, UpstreamFetcher};
pub use media_types::{ChannelInfo, ContentType};
pub use notifier::{StreamPositionNotifier, StreamPositionPacket};
pub use readout::HlsReadout;
pub use segmenter::{
    BoundaryClassifier, KeyframeClassifier, SegmentDescriptor, SegmentInfo, Segmenter,
    SharedWindow, VideoIntervalClassifier, run_segmenter,
};
pub use store::{ContentCursor, ContentStore, CursorItem};
