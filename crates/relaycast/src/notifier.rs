//! Periodic stream-position announcements for the relay layer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::channel::{Channel, ChannelId};
use crate::config::NotifierConfig;

/// Relay group a broadcast packet is flooded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastGroup {
    Relays,
}

/// Payload handed to the relay layer for flooding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamPositionPacket {
    pub channel_id: ChannelId,
    /// Session id of this node.
    pub from: Uuid,
    pub group: BroadcastGroup,
    pub hops: u8,
    pub ttl: u8,
    /// Position of the newest content, in decimal.
    pub stream_position: String,
}

pub struct StreamPositionNotifier {
    channel: Arc<Channel>,
    session_id: Uuid,
    config: NotifierConfig,
}

impl StreamPositionNotifier {
    pub fn new(channel: Arc<Channel>, session_id: Uuid, config: NotifierConfig) -> Self {
        Self {
            channel,
            session_id,
            config,
        }
    }

    /// The packet to send now, if the channel is live and has relays.
    pub fn build_packet(&self) -> Option<StreamPositionPacket> {
        if !self.channel.is_broadcasting() || self.channel.relay_count() == 0 {
            return None;
        }
        let newest = self.channel.store().newest()?;
        Some(StreamPositionPacket {
            channel_id: self.channel.id(),
            from: self.session_id,
            group: BroadcastGroup::Relays,
            hops: self.config.hops,
            ttl: self.config.ttl,
            stream_position: newest.position.to_string(),
        })
    }

    /// Send a packet after the initial delay and then once per period until
    /// cancelled or the receiver goes away.
    pub async fn run(self, packets: mpsc::Sender<StreamPositionPacket>, token: CancellationToken) {
        let start = tokio::time::Instant::now() + self.config.initial_delay;
        let mut ticker = tokio::time::interval_at(start, self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(packet) = self.build_packet() else {
                continue;
            };
            debug!(
                channel = %packet.channel_id,
                position = %packet.stream_position,
                "Posting stream position"
            );
            tokio::select! {
                _ = token.cancelled() => break,
                sent = packets.send(packet) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
