use async_trait::async_trait;
use bytes::Bytes;
use flv::{FlvTagCodec, FlvUnit};
use futures::StreamExt;
use media_types::ContentType;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use super::{Body, ContentDemuxer, Demuxed};
use crate::config::FlvDemuxConfig;
use crate::error::DemuxError;

/// Emits one content chunk per FLV tag.
///
/// Video tags are held back until the first keyframe-equivalent video tag;
/// audio and script tags always pass. The file header, when the stream
/// carries one, becomes the epoch header.
pub struct FlvDemuxer<R> {
    framed: FramedRead<R, FlvTagCodec>,
    pending: Option<FlvUnit>,
    video_started: bool,
    withheld_tags: u64,
}

impl<R: AsyncRead + Unpin + Send> FlvDemuxer<R> {
    pub fn new(reader: R, config: FlvDemuxConfig) -> Self {
        Self {
            framed: FramedRead::new(reader, FlvTagCodec::with_cache_ceiling(config.cache_ceiling)),
            pending: None,
            video_started: false,
            withheld_tags: 0,
        }
    }

    /// Video tags dropped while waiting for the first keyframe.
    pub fn withheld_tags(&self) -> u64 {
        self.withheld_tags
    }

    async fn next_unit(&mut self) -> Result<FlvUnit, DemuxError> {
        if let Some(unit) = self.pending.take() {
            return Ok(unit);
        }
        match self.framed.next().await {
            Some(Ok(unit)) => Ok(unit),
            Some(Err(e)) => Err(e.into()),
            None => Err(DemuxError::EndOfStream),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ContentDemuxer for FlvDemuxer<R> {
    fn content_type(&self) -> ContentType {
        ContentType::Flv
    }

    async fn read_header(&mut self) -> Result<Bytes, DemuxError> {
        match self.next_unit().await? {
            FlvUnit::Header(header) => Ok(header),
            unit @ FlvUnit::Tag(_) => {
                debug!("FLV stream without file header");
                self.pending = Some(unit);
                Ok(Bytes::new())
            }
        }
    }

    async fn read_body(&mut self) -> Result<Demuxed, DemuxError> {
        loop {
            let tag = match self.next_unit().await? {
                FlvUnit::Header(header) => {
                    self.video_started = false;
                    return Ok(Demuxed::NewEpoch(header));
                }
                FlvUnit::Tag(tag) => tag,
            };

            let boundary = tag.is_keyframe_equivalent();
            if boundary && !self.video_started {
                debug!(timestamp_ms = tag.timestamp_ms, "First FLV keyframe");
                self.video_started = true;
            }
            if tag.is_video() && !self.video_started {
                self.withheld_tags += 1;
                trace!(timestamp_ms = tag.timestamp_ms, "Withholding video tag before first keyframe");
                continue;
            }

            return Ok(Demuxed::Body(Body {
                data: tag.data,
                continuation: !boundary,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use flv::test_support::{aac_frame, avc_inter_frame, avc_keyframe, make_flv_header};

    use super::*;

    async fn bodies(demuxer: &mut FlvDemuxer<std::io::Cursor<Vec<u8>>>) -> Vec<Demuxed> {
        let mut out = Vec::new();
        loop {
            match demuxer.read_body().await {
                Ok(unit) => out.push(unit),
                Err(DemuxError::EndOfStream) => return out,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn test_file_header_is_epoch_header_and_gate_holds_video() {
        let mut data = make_flv_header(true, true);
        data.extend(avc_inter_frame(100));
        data.extend(aac_frame(110));
        data.extend(avc_keyframe(140));
        data.extend(avc_inter_frame(180));

        let mut demuxer = FlvDemuxer::new(std::io::Cursor::new(data), FlvDemuxConfig::default());
        assert_eq!(demuxer.read_header().await.unwrap(), Bytes::from(make_flv_header(true, true)));

        let units = bodies(&mut demuxer).await;
        assert_eq!(units.len(), 3);
        assert_eq!(demuxer.withheld_tags(), 1);
        let Demuxed::Body(keyframe) = &units[1] else {
            panic!("expected body");
        };
        assert!(!keyframe.continuation);
        assert_eq!(keyframe.data[0], 0x09);
        assert!(matches!(&units[0], Demuxed::Body(b) if b.continuation && b.data[0] == 0x08));
    }

    #[tokio::test]
    async fn test_headerless_stream_has_empty_header() {
        let mut data = avc_keyframe(0);
        data.extend(avc_inter_frame(40));
        let mut demuxer = FlvDemuxer::new(std::io::Cursor::new(data), FlvDemuxConfig::default());
        assert!(demuxer.read_header().await.unwrap().is_empty());
        assert_eq!(bodies(&mut demuxer).await.len(), 2);
    }

    #[tokio::test]
    async fn test_header_mid_stream_starts_new_epoch() {
        let mut data = make_flv_header(false, true);
        data.extend(avc_keyframe(0));
        data.extend(make_flv_header(false, true));
        data.extend(avc_inter_frame(40));
        data.extend(avc_keyframe(80));

        let mut demuxer = FlvDemuxer::new(std::io::Cursor::new(data), FlvDemuxConfig::default());
        demuxer.read_header().await.unwrap();
        let units = bodies(&mut demuxer).await;
        assert_eq!(units.len(), 3);
        assert!(matches!(units[1], Demuxed::NewEpoch(_)));
        // the inter frame after the new header is withheld again
        assert_eq!(demuxer.withheld_tags(), 1);
    }
}
