use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use media_types::{ChannelInfo, ContentType};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use ts::{TS_PACKET_SIZE, TsPacketRef};

use super::IngestEvent;
use super::pacer::{RateCounter, RatePacer};
use crate::channel::Channel;
use crate::config::IngestConfig;
use crate::content::{Content, ContentHeader, StreamId};
use crate::error::IngestError;

/// Republish the bitrate once the receive rate beats the previous peak by
/// this factor.
const BITRATE_REPUBLISH_FACTOR: f64 = 1.2;

/// Writes fetched segments into a channel as paced content chunks.
#[derive(Debug)]
pub(crate) struct PacedSink {
    channel: Arc<Channel>,
    events: Option<mpsc::Sender<IngestEvent>>,
    flush_threshold: usize,
    cache_limit: usize,
    stream_id: Option<StreamId>,
    origin: Instant,
    position: u64,
    buffer: BytesMut,
    buffer_starts_unit: bool,
    rate: RateCounter,
    max_rate: f64,
    pacer: RatePacer,
}

impl PacedSink {
    pub(crate) fn new(
        channel: Arc<Channel>,
        config: &IngestConfig,
        events: Option<mpsc::Sender<IngestEvent>>,
    ) -> Self {
        Self {
            channel,
            events,
            flush_threshold: config.flush_threshold,
            cache_limit: config.cache_limit,
            stream_id: None,
            origin: Instant::now(),
            position: 0,
            buffer: BytesMut::with_capacity(config.flush_threshold + TS_PACKET_SIZE),
            buffer_starts_unit: false,
            rate: RateCounter::default(),
            max_rate: 0.0,
            pacer: RatePacer::new(config.pacing_window),
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    /// Receive rate in bytes per second.
    pub(crate) fn receive_rate(&self) -> f64 {
        self.rate.rate()
    }

    fn start_epoch(&mut self) {
        let stream_id = self.channel.generate_stream_id();
        self.channel
            .store()
            .set_header(ContentHeader::new(stream_id, Bytes::new()));
        self.channel.set_info(ChannelInfo::new(ContentType::Ts));
        self.channel.set_broadcasting(true);
        self.stream_id = Some(stream_id);
        self.origin = Instant::now();
        self.position = 0;
        debug!(channel = %self.channel.id(), %stream_id, "Ingest stream started");
    }

    /// Deliver one segment at roughly its nominal playback rate.
    pub(crate) async fn on_segment(
        &mut self,
        data: &Bytes,
        duration: Duration,
        token: &CancellationToken,
    ) -> Result<(), IngestError> {
        if self.stream_id.is_none() {
            self.start_epoch();
        }

        let byte_average = data.len() as f64 / duration.as_secs_f64().max(1.0);
        let mut packets = data.chunks_exact(TS_PACKET_SIZE);
        for packet in &mut packets {
            if self.buffer.len() >= self.flush_threshold {
                self.flush()?;
                self.update_max_rate();
            }
            self.push(packet);
            self.rate.add(packet.len());
            self.pacer.pace(byte_average, packet.len(), token).await?;
        }
        if !packets.remainder().is_empty() {
            trace!(trailing = packets.remainder().len(), "Ignoring partial packet at segment end");
        }
        self.flush()
    }

    fn push(&mut self, packet: &[u8]) {
        if self.buffer.len() + packet.len() > self.cache_limit {
            trace!("Ingest buffer full, dropping packet");
            return;
        }
        if self.buffer.is_empty() {
            self.buffer_starts_unit =
                TsPacketRef::parse(packet).is_ok_and(|p| p.payload_unit_start_indicator());
        }
        self.buffer.extend_from_slice(packet);
    }

    pub(crate) fn flush(&mut self) -> Result<(), IngestError> {
        let Some(stream_id) = self.stream_id else {
            return Ok(());
        };
        if self.buffer.is_empty() {
            return Ok(());
        }
        let content = Content {
            stream_id,
            timestamp: self.origin.elapsed(),
            position: self.position,
            data: self.buffer.split().freeze(),
            continuation: !self.buffer_starts_unit,
        };
        self.position += content.data.len() as u64;
        self.channel.store().append(content)?;
        Ok(())
    }

    fn update_max_rate(&mut self) {
        let rate = self.rate.rate();
        if rate <= self.max_rate * BITRATE_REPUBLISH_FACTOR {
            return;
        }
        self.max_rate = rate;
        let kbps = (rate * 8.0 / 1000.0) as u32;
        self.channel
            .set_info(ChannelInfo::new(ContentType::Ts).with_bitrate(kbps));
        if let Some(events) = &self.events {
            let _ = events.try_send(IngestEvent::BitrateChanged { kbps });
        }
        debug!(channel = %self.channel.id(), kbps, "Receive bitrate updated");
    }
}

#[cfg(test)]
mod tests {
    use ts::test_support::{PacketSpec, make_stream};

    use super::*;
    use crate::channel::ChannelId;
    use crate::config::StoreConfig;

    fn sink() -> PacedSink {
        let channel = Arc::new(Channel::new(ChannelId::new_random(), StoreConfig::default()));
        PacedSink::new(channel, &IngestConfig::default(), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_is_flushed_in_chunks() {
        let mut sink = sink();
        let mut specs = vec![PacketSpec::video(); 100];
        specs[0] = PacketSpec::keyframe();
        let data = Bytes::from(make_stream(&specs));

        let start = Instant::now();
        sink.on_segment(&data, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2500), "{elapsed:?}");

        let store = sink.channel.store().clone();
        let contents = store.get_newer(None).unwrap();
        let sizes: Vec<usize> = contents.iter().map(|c| c.len() / 188).collect();
        assert_eq!(sizes, vec![38, 38, 24]);
        assert!(!contents[0].continuation);
        assert!(contents[1].continuation);
        assert_eq!(contents[2].position, 76 * 188);
        assert_eq!(sink.position(), 100 * 188);
        assert!(sink.channel.is_broadcasting());
        assert!(sink.channel.info().bitrate_kbps.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_epoch_across_segments() {
        let mut sink = sink();
        let data = Bytes::from(make_stream(&[PacketSpec::keyframe(); 10]));
        let token = CancellationToken::new();
        sink.on_segment(&data, Duration::from_secs(1), &token).await.unwrap();
        sink.on_segment(&data, Duration::from_secs(1), &token).await.unwrap();

        let contents = sink.channel.store().get_newer(None).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].stream_id, contents[1].stream_id);
        assert_eq!(contents[1].position, 10 * 188);
    }
}
