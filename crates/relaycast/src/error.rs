use flv::FlvError;
use mp4::Mp4Error;
use reqwest::StatusCode;
use ts::TsError;

use crate::content::StreamId;

/// Why a demuxer stopped producing content.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error("end of stream")]
    EndOfStream,

    #[error("bad data: {reason}")]
    BadData { reason: String },

    #[error("TS framing error: {0}")]
    Ts(#[from] TsError),

    #[error("FLV framing error: {0}")]
    Flv(#[from] FlvError),

    #[error("MP4 framing error: {0}")]
    Mp4(#[from] Mp4Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DemuxError {
    pub fn bad_data(reason: impl Into<String>) -> Self {
        Self::BadData {
            reason: reason.into(),
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The reader's last-seen position has already been pruned.
    #[error("reader fell behind: position {position} of stream {stream_id} is older than retained content ({horizon})")]
    FellBehind {
        stream_id: StreamId,
        position: u64,
        horizon: u64,
    },

    #[error("content store is closed")]
    Closed,

    #[error("no content header has been set")]
    MissingHeader,

    #[error("out of order append: stream {stream_id} position {position} after {last}")]
    OutOfOrder {
        stream_id: StreamId,
        position: u64,
        last: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingest cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("response from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },

    #[error("manifest error: {reason}")]
    Manifest { reason: String },

    #[error("manifest at {url} lists no segments")]
    EmptyManifest { url: String },

    #[error("content store error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    /// Whether the failure counts towards the consecutive-failure budget
    /// instead of stopping the ingest outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled | Self::InvalidUrl { .. } | Self::Store(_) => false,
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::BodyTooLarge { .. }
            | Self::Manifest { .. }
            | Self::EmptyManifest { .. } => true,
        }
    }
}
