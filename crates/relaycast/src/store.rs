//! Shared, multi-reader content sequence of one channel.
//!
//! A single writer (the active demuxer or ingestor) sets the epoch header and
//! appends chunks; any number of [`ContentCursor`]s walk the sequence at their
//! own pace. Chunks expire after the configured time-to-live. A cursor whose
//! last-seen chunk has already expired gets [`StoreError::FellBehind`] instead
//! of silently skipping the gap.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::content::{Content, ContentHeader, ReadPoint, StreamId};
use crate::error::StoreError;

#[derive(Debug)]
struct Entry {
    content: Arc<Content>,
    appended_at: Instant,
}

#[derive(Debug, Default)]
struct StoreState {
    header: Option<Arc<ContentHeader>>,
    entries: VecDeque<Entry>,
    /// Position of the newest chunk pruned from the current epoch.
    pruned_through: Option<u64>,
    /// Newest chunk ever appended in the current epoch, pruned or not.
    newest: Option<ReadPoint>,
    closed: bool,
}

impl StoreState {
    /// Chunks of the current epoch strictly after `since`.
    ///
    /// `since` is the last chunk a reader consumed. `None`, or a point from
    /// an older epoch, selects everything retained for the current epoch.
    fn newer_than(&self, since: Option<ReadPoint>) -> Result<Vec<Arc<Content>>, StoreError> {
        let Some(header) = &self.header else {
            return Ok(Vec::new());
        };
        let epoch = header.stream_id;

        let start = match since {
            Some(point) if point.stream_id == epoch => {
                if let Some(horizon) = self.pruned_through
                    && point.position < horizon
                {
                    return Err(StoreError::FellBehind {
                        stream_id: epoch,
                        position: point.position,
                        horizon,
                    });
                }
                self.entries
                    .partition_point(|entry| entry.content.position <= point.position)
            }
            Some(point) if point.stream_id > epoch => return Ok(Vec::new()),
            _ => 0,
        };

        Ok(self
            .entries
            .range(start..)
            .map(|entry| entry.content.clone())
            .collect())
    }

    fn prune(&mut self, now: Instant, ttl: std::time::Duration) -> usize {
        let mut pruned = 0;
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.appended_at) <= ttl {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                self.pruned_through = Some(entry.content.position);
                pruned += 1;
            }
        }
        pruned
    }
}

/// Ordered chunk sequence of the active stream epoch.
#[derive(Debug)]
pub struct ContentStore {
    config: StoreConfig,
    state: RwLock<StoreState>,
    changes: watch::Sender<u64>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl ContentStore {
    pub fn new(config: StoreConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            config,
            state: RwLock::new(StoreState::default()),
            changes,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Start a new stream epoch.
    ///
    /// Chunks of the previous epoch are discarded and a closed store is
    /// reopened.
    pub fn set_header(&self, header: ContentHeader) -> Arc<ContentHeader> {
        let header = Arc::new(header);
        let discarded = {
            let mut state = self.state.write();
            let discarded = state.entries.len();
            state.entries.clear();
            state.pruned_through = None;
            state.newest = None;
            state.closed = false;
            state.header = Some(header.clone());
            discarded
        };
        debug!(
            stream_id = %header.stream_id,
            header_len = header.data.len(),
            discarded,
            "New stream epoch"
        );
        self.notify();
        header
    }

    /// Append a chunk of the current epoch.
    ///
    /// Positions must strictly increase within the epoch.
    pub fn append(&self, content: Content) -> Result<Arc<Content>, StoreError> {
        let content = Arc::new(content);
        {
            let mut state = self.state.write();
            if state.closed {
                return Err(StoreError::Closed);
            }
            let header = state.header.as_ref().ok_or(StoreError::MissingHeader)?;
            if content.stream_id != header.stream_id {
                return Err(StoreError::OutOfOrder {
                    stream_id: content.stream_id,
                    position: content.position,
                    last: header.read_point().to_string(),
                });
            }
            if let Some(newest) = state.newest
                && content.position <= newest.position
            {
                return Err(StoreError::OutOfOrder {
                    stream_id: content.stream_id,
                    position: content.position,
                    last: newest.to_string(),
                });
            }

            let now = Instant::now();
            let pruned = state.prune(now, self.config.time_to_live);
            if pruned > 0 {
                trace!(pruned, "Pruned expired content");
            }
            state.entries.push_back(Entry {
                content: content.clone(),
                appended_at: now,
            });
            state.newest = Some(content.read_point());
        }
        self.notify();
        Ok(content)
    }

    /// Drop chunks older than the time-to-live. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.state
            .write()
            .prune(Instant::now(), self.config.time_to_live)
    }

    /// Everything newer than `since` in the current epoch, in position order.
    pub fn get_newer(&self, since: Option<ReadPoint>) -> Result<Vec<Arc<Content>>, StoreError> {
        self.state.read().newer_than(since)
    }

    pub fn header(&self) -> Option<Arc<ContentHeader>> {
        self.state.read().header.clone()
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.state.read().header.as_ref().map(|h| h.stream_id)
    }

    /// Point of the newest chunk appended in the current epoch.
    pub fn newest(&self) -> Option<ReadPoint> {
        self.state.read().newest
    }

    /// Number of chunks currently retained.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Mark the epoch finished. Cursors drain what is left, then see
    /// [`StoreError::Closed`].
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        debug!("Content store closed");
        self.notify();
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Watch channel bumped on every header, append and close.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn cursor(self: &Arc<Self>) -> ContentCursor {
        ContentCursor::new(self.clone())
    }

    fn snapshot(
        &self,
        since: Option<ReadPoint>,
    ) -> Result<(Option<Arc<ContentHeader>>, Vec<Arc<Content>>), StoreError> {
        let state = self.state.read();
        Ok((state.header.clone(), state.newer_than(since)?))
    }
}

/// One unit handed to a cursor.
#[derive(Debug, Clone)]
pub enum CursorItem {
    /// A new epoch started; its header precedes its chunks.
    Header(Arc<ContentHeader>),
    Content(Arc<Content>),
}

/// An independent reader over a [`ContentStore`].
#[derive(Debug)]
pub struct ContentCursor {
    store: Arc<ContentStore>,
    epoch: Option<StreamId>,
    last: Option<ReadPoint>,
    changes: watch::Receiver<u64>,
}

impl ContentCursor {
    pub fn new(store: Arc<ContentStore>) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            epoch: None,
            last: None,
            changes,
        }
    }

    /// Last chunk handed out.
    pub fn last_point(&self) -> Option<ReadPoint> {
        self.last
    }

    pub fn epoch(&self) -> Option<StreamId> {
        self.epoch
    }

    /// Everything available right now, without waiting.
    pub fn try_next_batch(&mut self) -> Result<Vec<CursorItem>, StoreError> {
        let since = self.last.filter(|point| Some(point.stream_id) == self.epoch);
        let (header, contents) = self.store.snapshot(since)?;
        let mut items = Vec::with_capacity(contents.len() + 1);

        let Some(header) = header else {
            return Ok(items);
        };
        if self.epoch != Some(header.stream_id) {
            self.epoch = Some(header.stream_id);
            self.last = None;
            items.push(CursorItem::Header(header));
        }

        for content in contents {
            self.last = Some(content.read_point());
            items.push(CursorItem::Content(content));
        }
        Ok(items)
    }

    /// Wait until something newer is available.
    ///
    /// Returns [`StoreError::Closed`] once the store is closed and drained.
    pub async fn next_batch(&mut self) -> Result<Vec<CursorItem>, StoreError> {
        loop {
            self.changes.borrow_and_update();
            let items = self.try_next_batch()?;
            if !items.is_empty() {
                return Ok(items);
            }
            if self.store.is_closed() {
                return Err(StoreError::Closed);
            }
            if self.changes.changed().await.is_err() {
                return Err(StoreError::Closed);
            }
        }
    }

    /// Skip ahead to the newest chunk after falling behind.
    pub fn resync(&mut self) {
        let newest = self.store.newest();
        if newest.is_some_and(|point| Some(point.stream_id) == self.epoch) {
            debug!(from = ?self.last.map(|p| p.position), to = ?newest.map(|p| p.position), "Cursor resynchronized");
            self.last = newest;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn content(stream: u32, position: u64, len: usize) -> Content {
        Content {
            stream_id: StreamId(stream),
            timestamp: Duration::from_millis(position),
            position,
            data: Bytes::from(vec![0u8; len]),
            continuation: false,
        }
    }

    fn store_with_epoch(stream: u32) -> Arc<ContentStore> {
        let store = Arc::new(ContentStore::default());
        store.set_header(ContentHeader::new(StreamId(stream), Bytes::new()));
        store
    }

    fn positions(contents: &[Arc<Content>]) -> Vec<u64> {
        contents.iter().map(|c| c.position).collect()
    }

    #[tokio::test]
    async fn test_get_newer_is_strictly_after_point() {
        let store = store_with_epoch(1);
        for pos in [0, 100, 250] {
            store.append(content(1, pos, 10)).unwrap();
        }

        assert_eq!(positions(&store.get_newer(None).unwrap()), vec![0, 100, 250]);

        let point = store.get_newer(None).unwrap()[0].read_point();
        assert_eq!(positions(&store.get_newer(Some(point)).unwrap()), vec![100, 250]);

        let newest = store.newest().unwrap();
        assert!(store.get_newer(Some(newest)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_disorder() {
        let store = Arc::new(ContentStore::default());
        assert_eq!(
            store.append(content(1, 0, 1)).unwrap_err(),
            StoreError::MissingHeader
        );

        store.set_header(ContentHeader::new(StreamId(1), Bytes::new()));
        store.append(content(1, 10, 1)).unwrap();
        assert!(matches!(
            store.append(content(1, 10, 1)),
            Err(StoreError::OutOfOrder { position: 10, .. })
        ));
        assert!(matches!(
            store.append(content(2, 20, 1)),
            Err(StoreError::OutOfOrder { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reader_from_old_epoch_gets_whole_new_epoch() {
        let store = store_with_epoch(1);
        store.append(content(1, 0, 5)).unwrap();
        let old_point = store.newest().unwrap();

        store.set_header(ContentHeader::new(StreamId(2), Bytes::new()));
        store.append(content(2, 0, 5)).unwrap();
        store.append(content(2, 5, 5)).unwrap();

        let newer = store.get_newer(Some(old_point)).unwrap();
        assert_eq!(positions(&newer), vec![0, 5]);
        assert!(newer.iter().all(|c| c.stream_id == StreamId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_content_reports_fell_behind() {
        let store = store_with_epoch(1);
        store.append(content(1, 0, 10)).unwrap();
        let laggard = store.newest().unwrap();
        store.append(content(1, 10, 10)).unwrap();
        let caught_up = store.newest().unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        store.append(content(1, 20, 10)).unwrap();
        assert_eq!(store.len(), 1);

        // the reader that consumed everything pruned keeps going
        assert_eq!(positions(&store.get_newer(Some(caught_up)).unwrap()), vec![20]);
        assert_eq!(
            store.get_newer(Some(laggard)).unwrap_err(),
            StoreError::FellBehind {
                stream_id: StreamId(1),
                position: 0,
                horizon: 10
            }
        );
    }

    #[tokio::test]
    async fn test_cursor_emits_header_before_content() {
        let store = store_with_epoch(3);
        store.append(content(3, 0, 4)).unwrap();
        let mut cursor = store.cursor();

        let items = cursor.try_next_batch().unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], CursorItem::Header(h) if h.stream_id == StreamId(3)));
        assert!(matches!(&items[1], CursorItem::Content(c) if c.position == 0));
        assert!(cursor.try_next_batch().unwrap().is_empty());

        store.set_header(ContentHeader::new(StreamId(4), Bytes::from_static(b"hdr")));
        store.append(content(4, 3, 4)).unwrap();
        let items = cursor.try_next_batch().unwrap();
        assert!(matches!(&items[0], CursorItem::Header(h) if h.data.as_ref() == b"hdr"));
        assert!(matches!(&items[1], CursorItem::Content(c) if c.stream_id == StreamId(4)));
        assert_eq!(cursor.epoch(), Some(StreamId(4)));
    }

    #[tokio::test]
    async fn test_cursor_waits_for_new_content() {
        let store = store_with_epoch(1);
        let mut cursor = store.cursor();
        assert_eq!(cursor.next_batch().await.unwrap().len(), 1);

        let writer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            writer.append(content(1, 0, 8)).unwrap();
        });

        let items = cursor.next_batch().await.unwrap();
        assert!(matches!(&items[0], CursorItem::Content(c) if c.position == 0));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_store_drains_then_fails() {
        let store = store_with_epoch(1);
        store.append(content(1, 0, 8)).unwrap();
        store.close();
        assert_eq!(store.append(content(1, 8, 8)).unwrap_err(), StoreError::Closed);

        let mut cursor = store.cursor();
        assert_eq!(cursor.next_batch().await.unwrap().len(), 2);
        assert_eq!(cursor.next_batch().await.unwrap_err(), StoreError::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_resync_after_falling_behind() {
        let store = store_with_epoch(1);
        let mut cursor = store.cursor();
        store.append(content(1, 0, 10)).unwrap();
        cursor.try_next_batch().unwrap();
        store.append(content(1, 10, 10)).unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        store.append(content(1, 20, 10)).unwrap();
        store.append(content(1, 30, 10)).unwrap();

        assert!(matches!(
            cursor.try_next_batch(),
            Err(StoreError::FellBehind { .. })
        ));
        cursor.resync();
        assert_eq!(cursor.last_point().map(|p| p.position), Some(30));
        assert!(cursor.try_next_batch().unwrap().is_empty());
    }
}
