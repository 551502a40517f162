//! HLS ingest against an in-memory upstream, on a paused clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use relaycast_engine::{
    Channel, ChannelId, IngestConfig, IngestError, IngestEvent, IngestState, RatePacedIngestor,
    StopReason, StoreConfig, UpstreamFetcher,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ts::test_support::{PacketSpec, make_stream};
use url::Url;

const MANIFEST_URL: &str = "http://upstream.test/live/index.m3u8";

#[derive(Clone, Default)]
struct MockUpstream {
    bodies: Arc<HashMap<String, Bytes>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    fn new(bodies: &[(&str, Bytes)]) -> Self {
        Self {
            bodies: Arc::new(
                bodies
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.clone()))
                    .collect(),
            ),
            log: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn count(&self, url: &str) -> usize {
        self.log.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl UpstreamFetcher for MockUpstream {
    async fn fetch(&self, url: &Url) -> Result<Bytes, IngestError> {
        self.log.lock().push(url.to_string());
        self.bodies
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| IngestError::http_status(StatusCode::NOT_FOUND, url.as_str()))
    }
}

fn segment_body(packets: usize) -> Bytes {
    let mut specs = vec![PacketSpec::video(); packets];
    specs[0] = PacketSpec::keyframe();
    Bytes::from(make_stream(&specs))
}

fn new_channel() -> Arc<Channel> {
    Arc::new(Channel::new(ChannelId::new_random(), StoreConfig::default()))
}

async fn run_for(
    upstream: MockUpstream,
    channel: Arc<Channel>,
    run_time: Duration,
) -> (StopReason, IngestState, Vec<IngestEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let ingestor = RatePacedIngestor::new(
        channel,
        upstream,
        Url::parse(MANIFEST_URL).unwrap(),
        IngestConfig::default(),
    )
    .with_events(tx);
    let state = ingestor.subscribe_state();
    let token = CancellationToken::new();
    let handle = tokio::spawn(ingestor.run(token.clone()));

    tokio::time::sleep(run_time).await;
    token.cancel();
    let reason = handle.await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let final_state = *state.borrow();
    (reason, final_state, events)
}

#[tokio::test(start_paused = true)]
async fn segments_are_fetched_once_in_listed_order() {
    let manifest = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nseg1.ts\n#EXTINF:4,\nseg2.ts\n";
    let upstream = MockUpstream::new(&[
        (MANIFEST_URL, Bytes::from_static(manifest.as_bytes())),
        ("http://upstream.test/live/seg1.ts", segment_body(20)),
        ("http://upstream.test/live/seg2.ts", segment_body(30)),
    ]);
    let channel = new_channel();

    let (reason, state, events) = run_for(upstream.clone(), channel.clone(), Duration::from_secs(30)).await;
    assert_eq!(reason, StopReason::UserShutdown);
    assert_eq!(state, IngestState::Closed);

    let requests = upstream.requests();
    assert_eq!(
        &requests[..3],
        &[
            MANIFEST_URL.to_string(),
            "http://upstream.test/live/seg1.ts".to_string(),
            "http://upstream.test/live/seg2.ts".to_string(),
        ]
    );
    assert_eq!(upstream.count("http://upstream.test/live/seg1.ts"), 1);
    assert_eq!(upstream.count("http://upstream.test/live/seg2.ts"), 1);
    assert!(upstream.count(MANIFEST_URL) > 1);

    let ingested: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            IngestEvent::SegmentIngested { len, .. } => Some(*len),
            _ => None,
        })
        .collect();
    assert_eq!(ingested, vec![20 * 188, 30 * 188]);

    let store = channel.store();
    assert!(store.is_closed());
    let total: usize = store.get_newer(None).unwrap().iter().map(|c| c.len()).sum();
    assert_eq!(total, 50 * 188);
    assert_eq!(channel.info().type_tag(), Some("TS"));
}

#[tokio::test(start_paused = true)]
async fn master_playlist_is_followed_once() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n";
    let media = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2,\nseg100.ts\n";
    let upstream = MockUpstream::new(&[
        (MANIFEST_URL, Bytes::from_static(master.as_bytes())),
        ("http://upstream.test/live/low/index.m3u8", Bytes::from_static(media.as_bytes())),
        ("http://upstream.test/live/low/seg100.ts", segment_body(10)),
    ]);

    let (reason, _, _) = run_for(upstream.clone(), new_channel(), Duration::from_secs(20)).await;
    assert_eq!(reason, StopReason::UserShutdown);
    assert_eq!(upstream.count(MANIFEST_URL), 1);
    assert!(upstream.count("http://upstream.test/live/low/index.m3u8") > 2);
    assert_eq!(upstream.count("http://upstream.test/live/low/seg100.ts"), 1);
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_failures_are_terminal() {
    let upstream = MockUpstream::new(&[]);
    let channel = new_channel();

    let (reason, state, events) = run_for(upstream.clone(), channel.clone(), Duration::from_secs(60)).await;
    assert_eq!(reason, StopReason::ConnectionError);
    assert_eq!(state, IngestState::Error);
    assert_eq!(upstream.count(MANIFEST_URL), 3);

    let failures: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            IngestEvent::FetchFailed {
                consecutive_failures,
                ..
            } => Some(*consecutive_failures),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![1, 2, 3]);
    assert!(channel.store().is_closed());
}

#[tokio::test(start_paused = true)]
async fn empty_manifest_counts_as_failure() {
    let upstream = MockUpstream::new(&[(
        MANIFEST_URL,
        Bytes::from_static(b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n"),
    )]);

    let (reason, state, _) = run_for(upstream.clone(), new_channel(), Duration::from_secs(60)).await;
    assert_eq!(reason, StopReason::ConnectionError);
    assert_eq!(state, IngestState::Error);
    assert_eq!(upstream.count(MANIFEST_URL), 3);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_pacing() {
    let manifest = "#EXTM3U\n#EXT-X-TARGETDURATION:60\n#EXTINF:60,\nlong.ts\n";
    let upstream = MockUpstream::new(&[
        (MANIFEST_URL, Bytes::from_static(manifest.as_bytes())),
        ("http://upstream.test/live/long.ts", segment_body(2000)),
    ]);

    let start = tokio::time::Instant::now();
    let (reason, state, _) = run_for(upstream, new_channel(), Duration::from_secs(5)).await;
    assert_eq!(reason, StopReason::UserShutdown);
    assert_eq!(state, IngestState::Closed);
    assert!(start.elapsed() < Duration::from_secs(6));
}
