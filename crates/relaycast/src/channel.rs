use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use media_types::ChannelInfo;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::content::StreamId;
use crate::store::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Why a producer stopped feeding a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop or reconnect requested by the owner.
    UserShutdown,
    /// The source failed or sent data that could not be framed.
    ConnectionError,
    /// The source ended cleanly.
    EndOfStream,
}

/// One broadcast channel: its content store, its metadata and the counters
/// the relay layer reads.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    store: Arc<ContentStore>,
    info: watch::Sender<ChannelInfo>,
    next_stream_id: AtomicU32,
    relay_count: AtomicUsize,
    broadcasting: AtomicBool,
}

impl Channel {
    pub fn new(id: ChannelId, store_config: StoreConfig) -> Self {
        let (info, _) = watch::channel(ChannelInfo::default());
        Self {
            id,
            store: Arc::new(ContentStore::new(store_config)),
            info,
            next_stream_id: AtomicU32::new(0),
            relay_count: AtomicUsize::new(0),
            broadcasting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Next stream epoch id, monotonic per channel.
    pub fn generate_stream_id(&self) -> StreamId {
        StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn info(&self) -> ChannelInfo {
        self.info.borrow().clone()
    }

    pub fn subscribe_info(&self) -> watch::Receiver<ChannelInfo> {
        self.info.subscribe()
    }

    /// Publish metadata. Returns false when nothing changed.
    pub fn set_info(&self, info: ChannelInfo) -> bool {
        let changed = self.info.send_if_modified(|current| {
            if *current == info {
                return false;
            }
            *current = info.clone();
            true
        });
        if changed {
            debug!(
                channel = %self.id,
                content_type = ?info.content_type,
                bitrate_kbps = ?info.bitrate_kbps,
                "Channel info updated"
            );
        }
        changed
    }

    pub fn relay_count(&self) -> usize {
        self.relay_count.load(Ordering::Relaxed)
    }

    pub fn set_relay_count(&self, count: usize) {
        self.relay_count.store(count, Ordering::Relaxed);
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting.load(Ordering::Relaxed)
    }

    pub fn set_broadcasting(&self, broadcasting: bool) {
        self.broadcasting.store(broadcasting, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use media_types::ContentType;

    use super::*;

    #[test]
    fn test_stream_ids_are_monotonic() {
        let channel = Channel::new(ChannelId::new_random(), StoreConfig::default());
        let a = channel.generate_stream_id();
        let b = channel.generate_stream_id();
        assert!(b > a);
    }

    #[test]
    fn test_set_info_reports_changes_only() {
        let channel = Channel::new(ChannelId::new_random(), StoreConfig::default());
        let mut rx = channel.subscribe_info();
        assert!(channel.set_info(ChannelInfo::new(ContentType::Ts)));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert!(!channel.set_info(ChannelInfo::new(ContentType::Ts)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(channel.info().type_tag(), Some("TS"));
    }
}
