use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use media_types::{ChannelInfo, ContentType};
use mp4::{BoxType, Mp4Box, Mp4BoxCodec};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use super::{Body, ContentDemuxer, Demuxed};
use crate::config::Mp4DemuxConfig;
use crate::error::DemuxError;

/// Fragmented MP4 demuxer.
///
/// The header is `ftyp` followed by `moov`, verbatim. Bodies are `moof`+`mdat`
/// pairs; with `strict_pairs` off, every box is its own body.
pub struct Mp4Demuxer<R> {
    framed: FramedRead<R, Mp4BoxCodec>,
    strict_pairs: bool,
    bitrate_kbps: Option<u32>,
    skipped_boxes: u64,
}

fn concat(first: &Mp4Box, second: &Mp4Box) -> Bytes {
    let mut out = BytesMut::with_capacity(first.len() + second.len());
    out.extend_from_slice(&first.data);
    out.extend_from_slice(&second.data);
    out.freeze()
}

impl<R: AsyncRead + Unpin + Send> Mp4Demuxer<R> {
    pub fn new(reader: R, config: Mp4DemuxConfig) -> Self {
        Self {
            framed: FramedRead::new(reader, Mp4BoxCodec::with_max_box_size(config.max_box_size)),
            strict_pairs: config.strict_pairs,
            bitrate_kbps: None,
            skipped_boxes: 0,
        }
    }

    /// Boxes dropped because they did not form a `moof`+`mdat` pair.
    pub fn skipped_boxes(&self) -> u64 {
        self.skipped_boxes
    }

    async fn next_box(&mut self) -> Result<Mp4Box, DemuxError> {
        match self.framed.next().await {
            Some(Ok(mp4_box)) => Ok(mp4_box),
            Some(Err(e)) => Err(e.into()),
            None => Err(DemuxError::EndOfStream),
        }
    }

    fn record_header(&mut self, header: &Bytes) {
        let bitrate = mp4::parse_bitrate(header) / 1000;
        self.bitrate_kbps = u32::try_from(bitrate).ok().filter(|kbps| *kbps > 0);
        debug!(header_len = header.len(), bitrate_kbps = ?self.bitrate_kbps, "MP4 init segment");
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ContentDemuxer for Mp4Demuxer<R> {
    fn content_type(&self) -> ContentType {
        ContentType::Mp4
    }

    fn channel_info(&self) -> ChannelInfo {
        let info = ChannelInfo::new(ContentType::Mp4);
        match self.bitrate_kbps {
            Some(kbps) => info.with_bitrate(kbps),
            None => info,
        }
    }

    async fn read_header(&mut self) -> Result<Bytes, DemuxError> {
        let ftyp = self.next_box().await?;
        if ftyp.box_type != BoxType::Ftyp {
            return Err(DemuxError::bad_data(format!(
                "expected ftyp, found '{}'",
                ftyp.box_type
            )));
        }
        let moov = self.next_box().await?;
        if moov.box_type != BoxType::Moov {
            return Err(DemuxError::bad_data(format!(
                "expected moov, found '{}'",
                moov.box_type
            )));
        }
        let header = concat(&ftyp, &moov);
        self.record_header(&header);
        Ok(header)
    }

    async fn read_body(&mut self) -> Result<Demuxed, DemuxError> {
        loop {
            let first = self.next_box().await?;
            if !self.strict_pairs {
                return Ok(Demuxed::Body(Body {
                    data: first.data,
                    continuation: false,
                }));
            }

            match first.box_type {
                BoxType::Moof => {}
                BoxType::Ftyp => {
                    let second = self.next_box().await?;
                    if second.box_type == BoxType::Moov {
                        let header = concat(&first, &second);
                        self.record_header(&header);
                        return Ok(Demuxed::NewEpoch(header));
                    }
                    self.skipped_boxes += 2;
                    continue;
                }
                other => {
                    trace!(box_type = %other, "Skipping box outside a fragment");
                    self.skipped_boxes += 1;
                    continue;
                }
            }

            let second = self.next_box().await?;
            if second.box_type != BoxType::Mdat {
                trace!(box_type = %second.box_type, "moof not followed by mdat, skipping pair");
                self.skipped_boxes += 2;
                continue;
            }
            return Ok(Demuxed::Body(Body {
                data: concat(&first, &second),
                continuation: false,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use mp4::test_support::{make_box, make_fragment, make_init_segment};

    use super::*;

    async fn drain(demuxer: &mut Mp4Demuxer<std::io::Cursor<Vec<u8>>>) -> Vec<Demuxed> {
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
    async fn test_header_and_bitrate() {
        let init = make_init_segment(Some(2_500_000));
        let mut demuxer = Mp4Demuxer::new(std::io::Cursor::new(init.clone()), Mp4DemuxConfig::default());
        assert_eq!(demuxer.read_header().await.unwrap(), Bytes::from(init));
        assert_eq!(demuxer.channel_info().bitrate_kbps, Some(2_500));
        assert_eq!(demuxer.channel_info().type_tag(), Some("MP4"));
    }

    #[tokio::test]
    async fn test_wrong_first_box_is_bad_data() {
        let data = make_fragment(1, &[0; 8]);
        let mut demuxer = Mp4Demuxer::new(std::io::Cursor::new(data), Mp4DemuxConfig::default());
        assert!(matches!(
            demuxer.read_header().await,
            Err(DemuxError::BadData { .. })
        ));
    }

    #[tokio::test]
    async fn test_strict_mode_skips_stray_boxes() {
        let mut data = make_init_segment(None);
        data.extend(make_box(b"free", &[0; 4]));
        data.extend(make_fragment(1, &[1; 16]));
        data.extend(make_box(b"moof", &[]));
        data.extend(make_box(b"free", &[]));
        data.extend(make_fragment(2, &[2; 16]));

        let mut demuxer = Mp4Demuxer::new(std::io::Cursor::new(data), Mp4DemuxConfig::default());
        demuxer.read_header().await.unwrap();
        let units = drain(&mut demuxer).await;
        assert_eq!(units.len(), 2);
        assert_eq!(demuxer.skipped_boxes(), 3);
        assert!(matches!(&units[1], Demuxed::Body(b) if b.data[..] == make_fragment(2, &[2; 16])[..]));
    }

    #[tokio::test]
    async fn test_tolerant_mode_passes_every_box() {
        let mut data = make_init_segment(None);
        data.extend(make_box(b"free", &[0; 4]));
        data.extend(make_fragment(1, &[1; 16]));

        let config = Mp4DemuxConfig {
            strict_pairs: false,
            ..Mp4DemuxConfig::default()
        };
        let mut demuxer = Mp4Demuxer::new(std::io::Cursor::new(data), config);
        demuxer.read_header().await.unwrap();
        assert_eq!(drain(&mut demuxer).await.len(), 3);
    }

    #[tokio::test]
    async fn test_new_init_segment_starts_new_epoch() {
        let mut data = make_init_segment(None);
        data.extend(make_fragment(1, &[1; 4]));
        data.extend(make_init_segment(Some(800_000)));
        data.extend(make_fragment(1, &[1; 4]));

        let mut demuxer = Mp4Demuxer::new(std::io::Cursor::new(data), Mp4DemuxConfig::default());
        demuxer.read_header().await.unwrap();
        let units = drain(&mut demuxer).await;
        assert_eq!(units.len(), 3);
        assert!(matches!(&units[1], Demuxed::NewEpoch(h) if h[..] == make_init_segment(Some(800_000))[..]));
        assert_eq!(demuxer.channel_info().bitrate_kbps, Some(800));
    }
}
