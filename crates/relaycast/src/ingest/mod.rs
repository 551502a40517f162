//! Rate-paced ingest from a pull-based (HLS) upstream.
//!
//! [`RatePacedIngestor`] polls the upstream playlist roughly once per
//! nominal segment duration, fetches every segment it has not seen yet, and
//! feeds the bytes into the channel's content store as transport packets
//! paced to the segment's playback duration.

mod fetcher;
mod manifest;
mod pacer;
mod sink;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub use fetcher::{HttpFetcher, UpstreamFetcher};
pub use manifest::{Manifest, SegmentTask, parse_manifest};
pub use pacer::{RateCounter, RatePacer};

use crate::channel::{Channel, StopReason};
use crate::config::IngestConfig;
use crate::error::IngestError;
use sink::PacedSink;

/// Connection state of an ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Waiting,
    /// A playlist has been loaded.
    Connected,
    /// Segment data is flowing.
    Receiving,
    Error,
    Closed,
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Closed)
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Connected => "connected",
            Self::Receiving => "receiving",
            Self::Error => "error",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Progress notifications of an ingest.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    ManifestRefreshed {
        url: Url,
        listed: usize,
        queued: usize,
    },
    SegmentIngested {
        url: Url,
        len: usize,
        duration: Duration,
    },
    FetchFailed {
        reason: String,
        consecutive_failures: u32,
    },
    BitrateChanged {
        kbps: u32,
    },
}

/// Fetched segment URLs, oldest forgotten first.
#[derive(Debug)]
struct SeenUrls {
    order: VecDeque<Url>,
    set: HashSet<Url>,
    capacity: usize,
}

impl SeenUrls {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, url: &Url) -> bool {
        self.set.contains(url)
    }

    fn insert(&mut self, url: Url) -> bool {
        if !self.set.insert(url.clone()) {
            return false;
        }
        self.order.push_back(url);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

pub struct RatePacedIngestor<F> {
    channel: Arc<Channel>,
    fetcher: F,
    config: IngestConfig,
    source: Url,
    /// Media playlist reached through a master playlist.
    media_playlist: Option<Url>,
    nominal_duration: Duration,
    last_poll: Option<Instant>,
    queue: VecDeque<SegmentTask>,
    seen: SeenUrls,
    consecutive_failures: u32,
    state: watch::Sender<IngestState>,
    events: Option<mpsc::Sender<IngestEvent>>,
    sink: PacedSink,
}

impl<F: UpstreamFetcher> RatePacedIngestor<F> {
    pub fn new(channel: Arc<Channel>, fetcher: F, source: Url, config: IngestConfig) -> Self {
        let (state, _) = watch::channel(IngestState::Waiting);
        Self {
            sink: PacedSink::new(channel.clone(), &config, None),
            channel,
            fetcher,
            nominal_duration: config.default_segment_duration,
            seen: SeenUrls::new(config.seen_url_capacity),
            config,
            source,
            media_playlist: None,
            last_poll: None,
            queue: VecDeque::new(),
            consecutive_failures: 0,
            state,
            events: None,
        }
    }

    /// Report progress on `events`. Events are dropped when the receiver
    /// lags.
    pub fn with_events(mut self, events: mpsc::Sender<IngestEvent>) -> Self {
        self.sink = PacedSink::new(self.channel.clone(), &self.config, Some(events.clone()));
        self.events = Some(events);
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<IngestState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> IngestState {
        *self.state.borrow()
    }

    fn set_state(&self, state: IngestState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(channel = %self.channel.id(), %state, "Ingest state changed");
        }
    }

    fn emit(&self, event: IngestEvent) {
        if let Some(events) = &self.events {
            let _ = events.try_send(event);
        }
    }

    /// Run until cancelled or the failure budget is spent.
    ///
    /// The channel's store is closed on return.
    pub async fn run(mut self, token: CancellationToken) -> StopReason {
        info!(channel = %self.channel.id(), url = %self.source, "HLS ingest started");
        let reason = self.drive(&token).await;

        if let Err(e) = self.sink.flush() {
            debug!(error = %e, "Final flush failed");
        }
        self.channel.store().close();
        self.channel.set_broadcasting(false);
        if reason != StopReason::ConnectionError {
            self.set_state(IngestState::Closed);
        }
        info!(
            channel = %self.channel.id(),
            ?reason,
            position = self.sink.position(),
            "HLS ingest stopped"
        );
        reason
    }

    async fn drive(&mut self, token: &CancellationToken) -> StopReason {
        loop {
            tokio::select! {
                _ = token.cancelled() => return StopReason::UserShutdown,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            if self
                .last_poll
                .is_some_and(|last| last.elapsed() < self.nominal_duration)
            {
                continue;
            }
            self.last_poll = Some(Instant::now());

            let err = match self.poll_once(token).await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    continue;
                }
                Err(IngestError::Cancelled) => return StopReason::UserShutdown,
                Err(e) => e,
            };

            if !err.is_retryable() {
                warn!(channel = %self.channel.id(), error = %err, "HLS ingest failed");
                self.set_state(IngestState::Error);
                return StopReason::ConnectionError;
            }

            self.consecutive_failures += 1;
            warn!(
                channel = %self.channel.id(),
                error = %err,
                failures = self.consecutive_failures,
                "HLS fetch failed"
            );
            self.emit(IngestEvent::FetchFailed {
                reason: err.to_string(),
                consecutive_failures: self.consecutive_failures,
            });
            if self.consecutive_failures >= self.config.max_consecutive_failures {
                self.set_state(IngestState::Error);
                return StopReason::ConnectionError;
            }

            tokio::select! {
                _ = token.cancelled() => return StopReason::UserShutdown,
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }
            // retry on the next tick instead of waiting out the segment duration
            self.last_poll = None;
        }
    }

    async fn fetch(&self, url: &Url, token: &CancellationToken) -> Result<bytes::Bytes, IngestError> {
        tokio::select! {
            _ = token.cancelled() => Err(IngestError::Cancelled),
            body = self.fetcher.fetch(url) => body,
        }
    }

    async fn load_manifest(&mut self, token: &CancellationToken) -> Result<(Url, Vec<SegmentTask>), IngestError> {
        let url = self.media_playlist.clone().unwrap_or_else(|| self.source.clone());
        let body = self.fetch(&url, token).await?;
        match parse_manifest(&url, &body)? {
            Manifest::Media(tasks) => Ok((url, tasks)),
            Manifest::Redirect(target) if self.media_playlist.is_none() => {
                debug!(from = %url, to = %target, "Following master playlist");
                let body = self.fetch(&target, token).await?;
                let tasks = match parse_manifest(&target, &body)? {
                    Manifest::Media(tasks) => tasks,
                    Manifest::Redirect(_) => {
                        return Err(IngestError::manifest("nested master playlists are not followed"));
                    }
                };
                self.media_playlist = Some(target.clone());
                Ok((target, tasks))
            }
            Manifest::Redirect(_) => Err(IngestError::manifest("media playlist turned into a master playlist")),
        }
    }

    async fn poll_once(&mut self, token: &CancellationToken) -> Result<(), IngestError> {
        let (url, tasks) = self.load_manifest(token).await?;
        if self.state() != IngestState::Receiving {
            self.set_state(IngestState::Connected);
        }
        if tasks.is_empty() {
            return Err(IngestError::EmptyManifest { url: url.to_string() });
        }
        if let Some(last) = tasks.last() {
            self.nominal_duration = last.duration;
        }

        let listed = tasks.len();
        for task in tasks {
            if self.seen.contains(&task.url) || self.queue.iter().any(|q| q.url == task.url) {
                continue;
            }
            self.queue.push_back(task);
        }
        self.emit(IngestEvent::ManifestRefreshed {
            url,
            listed,
            queued: self.queue.len(),
        });

        while let Some(task) = self.queue.pop_front() {
            self.seen.insert(task.url.clone());
            let data = self.fetch(&task.url, token).await?;
            self.set_state(IngestState::Receiving);
            self.sink.on_segment(&data, task.duration, token).await?;
            debug!(
                url = %task.url,
                len = data.len(),
                rate = self.sink.receive_rate(),
                "Segment ingested"
            );
            self.emit(IngestEvent::SegmentIngested {
                url: task.url,
                len: data.len(),
                duration: task.duration,
            });
        }
        Ok(())
    }
}
