//! Container demuxers and the driver that feeds their output into a channel.
//!
//! A demuxer only frames bytes: it returns the header blob once and then raw
//! body units. [`run_demuxer`] owns the epoch bookkeeping (stream id,
//! stream-relative timestamps and byte positions) so every container shares
//! the same numbering rules.

mod flv_demuxer;
mod mp4_demuxer;
mod ts_demuxer;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use media_types::{ChannelInfo, ContentType};
use tokio::io::AsyncRead;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use flv_demuxer::FlvDemuxer;
pub use mp4_demuxer::Mp4Demuxer;
pub use ts_demuxer::TsDemuxer;

use crate::channel::{Channel, StopReason};
use crate::config::EngineConfig;
use crate::content::{Content, ContentHeader, StreamId};
use crate::error::DemuxError;

/// One body unit before it is stamped with its epoch position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub data: Bytes,
    pub continuation: bool,
}

/// Result of one [`ContentDemuxer::read_body`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Demuxed {
    Body(Body),
    /// The container header reappeared mid-stream.
    NewEpoch(Bytes),
}

#[async_trait]
pub trait ContentDemuxer: Send {
    fn content_type(&self) -> ContentType;

    /// Metadata to publish once the header has been read.
    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo::new(self.content_type())
    }

    /// Read the container header. May be empty for containers without one.
    async fn read_header(&mut self) -> Result<Bytes, DemuxError>;

    /// Read the next body unit. Fails with [`DemuxError::EndOfStream`] once
    /// the source is exhausted.
    async fn read_body(&mut self) -> Result<Demuxed, DemuxError>;
}

/// Pick the demuxer for a content type.
pub fn demuxer_for<R>(
    content_type: ContentType,
    reader: R,
    config: &EngineConfig,
) -> Box<dyn ContentDemuxer>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    match content_type {
        ContentType::Ts => Box::new(TsDemuxer::new(reader, config.ts.clone())),
        ContentType::Flv => Box::new(FlvDemuxer::new(reader, config.flv.clone())),
        ContentType::Mp4 => Box::new(Mp4Demuxer::new(reader, config.mp4.clone())),
    }
}

#[async_trait]
impl ContentDemuxer for Box<dyn ContentDemuxer> {
    fn content_type(&self) -> ContentType {
        (**self).content_type()
    }

    fn channel_info(&self) -> ChannelInfo {
        (**self).channel_info()
    }

    async fn read_header(&mut self) -> Result<Bytes, DemuxError> {
        (**self).read_header().await
    }

    async fn read_body(&mut self) -> Result<Demuxed, DemuxError> {
        (**self).read_body().await
    }
}

/// Epoch numbering of the content a driver writes.
struct Epoch {
    stream_id: StreamId,
    origin: Instant,
    position: u64,
}

impl Epoch {
    fn start(channel: &Channel, header: Bytes) -> Self {
        let stream_id = channel.generate_stream_id();
        let position = header.len() as u64;
        channel
            .store()
            .set_header(ContentHeader::new(stream_id, header));
        Self {
            stream_id,
            origin: Instant::now(),
            position,
        }
    }

    fn next_content(&mut self, body: Body) -> Content {
        let content = Content {
            stream_id: self.stream_id,
            timestamp: self.origin.elapsed(),
            position: self.position,
            data: body.data,
            continuation: body.continuation,
        };
        self.position += content.data.len() as u64;
        content
    }
}

fn stop_reason(err: &DemuxError) -> StopReason {
    if err.is_end_of_stream() {
        StopReason::EndOfStream
    } else {
        StopReason::ConnectionError
    }
}

/// Drive a demuxer until the source ends, fails, or `token` is cancelled.
///
/// The demuxer (and with it the input) is dropped and the channel's store
/// closed before returning, so waiting readers finish instead of hanging.
pub async fn run_demuxer<D>(channel: Arc<Channel>, mut demuxer: D, token: CancellationToken) -> StopReason
where
    D: ContentDemuxer,
{
    let reason = drive(&channel, &mut demuxer, &token).await;
    drop(demuxer);
    channel.store().close();
    channel.set_broadcasting(false);
    info!(channel = %channel.id(), ?reason, "Demuxer stopped");
    reason
}

async fn drive<D: ContentDemuxer>(
    channel: &Channel,
    demuxer: &mut D,
    token: &CancellationToken,
) -> StopReason {
    let header = tokio::select! {
        _ = token.cancelled() => return StopReason::UserShutdown,
        header = demuxer.read_header() => header,
    };
    let header = match header {
        Ok(header) => header,
        Err(e) => {
            warn!(channel = %channel.id(), error = %e, "Failed to read content header");
            return stop_reason(&e);
        }
    };

    let mut epoch = Epoch::start(channel, header);
    channel.set_info(demuxer.channel_info());
    channel.set_broadcasting(true);
    info!(
        channel = %channel.id(),
        stream_id = %epoch.stream_id,
        content_type = %demuxer.content_type(),
        "Stream started"
    );

    loop {
        let unit = tokio::select! {
            _ = token.cancelled() => return StopReason::UserShutdown,
            unit = demuxer.read_body() => unit,
        };
        match unit {
            Ok(Demuxed::Body(body)) => {
                let content = epoch.next_content(body);
                if let Err(e) = channel.store().append(content) {
                    warn!(channel = %channel.id(), error = %e, "Failed to store content");
                    return StopReason::ConnectionError;
                }
            }
            Ok(Demuxed::NewEpoch(header)) => {
                epoch = Epoch::start(channel, header);
                channel.set_info(demuxer.channel_info());
                debug!(channel = %channel.id(), stream_id = %epoch.stream_id, "Header reappeared, new epoch");
            }
            Err(e) => {
                if e.is_end_of_stream() {
                    debug!(channel = %channel.id(), "Source ended");
                } else {
                    warn!(channel = %channel.id(), error = %e, "Demuxer failed");
                }
                return stop_reason(&e);
            }
        }
    }
}
