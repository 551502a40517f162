use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use media_types::ContentType;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{trace, warn};
use ts::{TsPacketCodec, TsPacketRef};

use super::{Body, ContentDemuxer, Demuxed};
use crate::config::TsDemuxConfig;
use crate::error::DemuxError;

/// Groups transport packets into content chunks.
///
/// A chunk is cut at a payload-unit-start packet once the flush threshold is
/// reached, so chunks normally begin on a PES boundary. The header is a
/// zero-length marker.
pub struct TsDemuxer<R> {
    framed: FramedRead<R, TsPacketCodec>,
    config: TsDemuxConfig,
    cache: BytesMut,
    cache_starts_unit: bool,
    dropped_packets: u64,
}

impl<R: AsyncRead + Unpin + Send> TsDemuxer<R> {
    pub fn new(reader: R, config: TsDemuxConfig) -> Self {
        Self {
            framed: FramedRead::new(reader, TsPacketCodec::new()),
            cache: BytesMut::with_capacity(config.flush_threshold + ts::TS_PACKET_SIZE),
            config,
            cache_starts_unit: false,
            dropped_packets: 0,
        }
    }

    /// Packets discarded because the chunk cache was full.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    fn push_packet(&mut self, packet: &[u8], unit_start: bool) {
        if self.cache.len() + packet.len() > self.config.cache_limit {
            self.dropped_packets += 1;
            if self.dropped_packets == 1 || self.dropped_packets % 1024 == 0 {
                warn!(
                    cache = self.cache.len(),
                    dropped = self.dropped_packets,
                    "TS chunk cache full, dropping packets"
                );
            }
            return;
        }
        if self.cache.is_empty() {
            self.cache_starts_unit = unit_start;
        }
        self.cache.extend_from_slice(packet);
    }

    fn take_chunk(&mut self) -> Body {
        Body {
            data: self.cache.split().freeze(),
            continuation: !self.cache_starts_unit,
        }
    }

    async fn next_packet(&mut self) -> Result<Option<Bytes>, DemuxError> {
        match self.framed.next().await {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ContentDemuxer for TsDemuxer<R> {
    fn content_type(&self) -> ContentType {
        ContentType::Ts
    }

    async fn read_header(&mut self) -> Result<Bytes, DemuxError> {
        // Wait for the first framed packet so an input without any sync byte
        // never starts an epoch.
        let Some(packet) = self.next_packet().await? else {
            return Err(DemuxError::EndOfStream);
        };
        let unit_start = TsPacketRef::parse(&packet)?.payload_unit_start_indicator();
        self.push_packet(&packet, unit_start);
        Ok(Bytes::new())
    }

    async fn read_body(&mut self) -> Result<Demuxed, DemuxError> {
        loop {
            let Some(packet) = self.next_packet().await? else {
                if self.cache.is_empty() {
                    return Err(DemuxError::EndOfStream);
                }
                return Ok(Demuxed::Body(self.take_chunk()));
            };

            let unit_start = TsPacketRef::parse(&packet)?.payload_unit_start_indicator();
            if unit_start && self.cache.len() >= self.config.flush_threshold {
                let chunk = self.take_chunk();
                self.push_packet(&packet, unit_start);
                trace!(len = chunk.data.len(), "TS chunk");
                return Ok(Demuxed::Body(chunk));
            }
            self.push_packet(&packet, unit_start);
        }
    }
}

#[cfg(test)]
mod tests {
    use ts::test_support::{PacketSpec, make_stream};

    use super::*;

    async fn collect(data: Vec<u8>, config: TsDemuxConfig) -> (Bytes, Vec<Body>) {
        let mut demuxer = TsDemuxer::new(std::io::Cursor::new(data), config);
        let header = demuxer.read_header().await.unwrap();
        let mut bodies = Vec::new();
        loop {
            match demuxer.read_body().await {
                Ok(Demuxed::Body(body)) => bodies.push(body),
                Ok(Demuxed::NewEpoch(_)) => panic!("TS has no mid-stream header"),
                Err(DemuxError::EndOfStream) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        (header, bodies)
    }

    #[tokio::test]
    async fn test_chunks_cut_at_unit_start_after_threshold() {
        // unit start every 10 packets; threshold is 38 packets
        let specs: Vec<PacketSpec> = (0..100)
            .map(|i| if i % 10 == 0 { PacketSpec::keyframe() } else { PacketSpec::video() })
            .collect();
        let stream = make_stream(&specs);
        let (header, bodies) = collect(stream.clone(), TsDemuxConfig::default()).await;

        assert!(header.is_empty());
        let sizes: Vec<usize> = bodies.iter().map(|b| b.data.len() / 188).collect();
        assert_eq!(sizes, vec![40, 40, 20]);
        assert!(bodies.iter().all(|b| !b.continuation));
        let joined: Vec<u8> = bodies.iter().flat_map(|b| b.data.to_vec()).collect();
        assert_eq!(joined, stream);
    }

    #[tokio::test]
    async fn test_chunk_not_starting_on_unit_start_is_continuation() {
        let mut specs = vec![PacketSpec::video(); 3];
        specs.push(PacketSpec::keyframe());
        let (_, bodies) = collect(make_stream(&specs), TsDemuxConfig::default()).await;
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].continuation);
    }

    #[tokio::test]
    async fn test_cache_limit_drops_packets() {
        let stream = make_stream(&[PacketSpec::video(); 20]);
        let config = TsDemuxConfig {
            flush_threshold: 7144,
            cache_limit: 188 * 5,
        };
        let (_, bodies) = collect(stream, config).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].data.len(), 188 * 5);
    }

    #[tokio::test]
    async fn test_input_without_sync_never_starts() {
        let mut demuxer = TsDemuxer::new(std::io::Cursor::new(vec![0u8; 188 * 50]), TsDemuxConfig::default());
        assert!(matches!(
            demuxer.read_header().await,
            Err(DemuxError::EndOfStream)
        ));
    }
}
