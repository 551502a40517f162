use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relaycast_engine::{
    BoundaryClassifier, Channel, ChannelId, ChannelInfo, ContentType, CursorItem, EngineConfig,
    HlsReadout, HttpFetcher, IngestEvent, RatePacedIngestor, Segmenter, StopReason, StoreError,
    demuxer_for, run_demuxer, run_segmenter,
};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::BoundaryRule;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::output::SegmentWriter;

/// Bytes read up front to recognise the container.
const SNIFF_LEN: u64 = 4096;

/// Open `path` and settle its container, sniffing the first bytes when no
/// format was given. The sniffed bytes are replayed in front of the file.
async fn open_input(
    path: &Path,
    format: Option<ContentType>,
) -> Result<(ContentType, impl AsyncRead + Unpin + Send + 'static)> {
    let mut file = File::open(path).await?;
    let mut head = Vec::new();
    (&mut file).take(SNIFF_LEN).read_to_end(&mut head).await?;

    let content_type = match format.or_else(|| ContentType::sniff(&head)) {
        Some(content_type) => content_type,
        None => {
            return Err(AppError::InvalidInput(format!(
                "cannot recognise the container of {}",
                path.display()
            )));
        }
    };
    debug!(path = %path.display(), %content_type, "Opened input");
    Ok((content_type, Cursor::new(head).chain(file)))
}

fn new_channel(config: &EngineConfig) -> Arc<Channel> {
    Arc::new(Channel::new(ChannelId::new_random(), config.store.clone()))
}

/// Run a segmenter on `channel` and write every segment it closes.
/// Resolves once the channel's store closes or `token` is cancelled.
fn spawn_segment_writer(
    channel: Arc<Channel>,
    rule: BoundaryRule,
    config: &EngineConfig,
    writer: SegmentWriter,
    token: CancellationToken,
) -> JoinHandle<Result<usize>> {
    match rule {
        BoundaryRule::Keyframe => tokio::spawn(write_segments(
            channel,
            Segmenter::keyframe(&config.segmenter),
            writer,
            token,
        )),
        BoundaryRule::VideoInterval => tokio::spawn(write_segments(
            channel,
            Segmenter::video_interval(&config.segmenter),
            writer,
            token,
        )),
    }
}

async fn write_segments<C>(
    channel: Arc<Channel>,
    mut segmenter: Segmenter<C>,
    writer: SegmentWriter,
    token: CancellationToken,
) -> Result<usize>
where
    C: BoundaryClassifier + 'static,
{
    let mut closed = segmenter.closed_segments();
    let readout = HlsReadout::new(channel.clone(), segmenter.window(), writer.prefix());
    let segmenter_task = tokio::spawn(run_segmenter(channel, segmenter, token));

    let mut written = 0;
    while let Some(segment) = closed.recv().await {
        writer.write_segment(&segment).await?;
        writer.write_playlist(&readout.playlist()).await?;
        written += 1;
    }
    segmenter_task.await?;
    Ok(written)
}

/// Segment a local transport stream into `output_dir`.
pub async fn segment_file(
    input: &Path,
    output_dir: &Path,
    rule: BoundaryRule,
    config: &AppConfig,
    token: CancellationToken,
) -> Result<usize> {
    let (content_type, reader) = open_input(input, None).await?;
    if content_type != ContentType::Ts {
        return Err(AppError::InvalidInput(format!(
            "segmenting needs an MPEG-TS input, {} is {content_type}",
            input.display()
        )));
    }

    let engine = config.engine_config(rule);
    let channel = new_channel(&engine);
    let writer = SegmentWriter::create(output_dir, &config.output).await?;
    let segments = spawn_segment_writer(channel.clone(), rule, &engine, writer, token.clone());

    let reason = run_demuxer(channel, demuxer_for(content_type, reader, &engine), token).await;
    let written = segments.await??;
    info!(?reason, segments = written, output = %output_dir.display(), "Segmenting finished");

    if reason == StopReason::ConnectionError {
        return Err(AppError::InvalidInput(format!(
            "{} stopped with unframeable data",
            input.display()
        )));
    }
    Ok(written)
}

/// Pull an HLS upstream into `output_dir` until cancelled, `duration`
/// elapses, or the upstream is lost.
pub async fn pull(
    url: &str,
    output_dir: &Path,
    duration: Option<Duration>,
    rule: BoundaryRule,
    config: &AppConfig,
    token: CancellationToken,
) -> Result<usize> {
    let source = Url::parse(url).map_err(|e| AppError::InvalidInput(format!("{url}: {e}")))?;
    let engine = config.engine_config(rule);
    let channel = new_channel(&engine);
    let fetcher = HttpFetcher::new(&engine.ingest)?;

    let (events_tx, events_rx) = mpsc::channel(64);
    let ingestor = RatePacedIngestor::new(channel.clone(), fetcher, source, engine.ingest.clone())
        .with_events(events_tx);
    tokio::spawn(log_events(events_rx));

    if let Some(duration) = duration {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    info!(?duration, "Pull duration reached");
                    token.cancel();
                }
            }
        });
    }

    let writer = SegmentWriter::create(output_dir, &config.output).await?;
    let segments = spawn_segment_writer(channel, rule, &engine, writer, token.clone());

    let reason = ingestor.run(token).await;
    let written = segments.await??;
    info!(?reason, segments = written, output = %output_dir.display(), "Pull finished");

    if reason == StopReason::ConnectionError {
        return Err(AppError::UpstreamLost(url.to_string()));
    }
    Ok(written)
}

async fn log_events(mut events: mpsc::Receiver<IngestEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            IngestEvent::ManifestRefreshed { url, listed, queued } => {
                debug!(%url, listed, queued, "Manifest refreshed");
            }
            IngestEvent::SegmentIngested { url, len, duration } => {
                info!(%url, len, ?duration, "Segment ingested");
            }
            IngestEvent::FetchFailed {
                reason,
                consecutive_failures,
            } => {
                warn!(%reason, consecutive_failures, "Upstream fetch failed");
            }
            IngestEvent::BitrateChanged { kbps } => {
                info!(kbps, "Receive bitrate raised");
            }
        }
    }
}

/// What a demuxer delivered to the content store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub info: ChannelInfo,
    pub epochs: usize,
    pub header_bytes: usize,
    pub chunks: usize,
    pub body_bytes: u64,
    pub continuations: usize,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "container:     {}", self.info.type_tag().unwrap_or("unknown"))?;
        writeln!(f, "mime type:     {}", self.info.mime_type().unwrap_or("-"))?;
        match self.info.bitrate_kbps {
            Some(kbps) => writeln!(f, "bitrate:       {kbps} kbps")?,
            None => writeln!(f, "bitrate:       unknown")?,
        }
        writeln!(f, "epochs:        {}", self.epochs)?;
        writeln!(f, "header bytes:  {}", self.header_bytes)?;
        writeln!(f, "chunks:        {}", self.chunks)?;
        writeln!(f, "continuations: {}", self.continuations)?;
        write!(f, "body bytes:    {}", self.body_bytes)
    }
}

/// Demux `input` into a throwaway channel and tally what a reader sees.
pub async fn probe(
    input: &Path,
    format: Option<ContentType>,
    config: &AppConfig,
    token: CancellationToken,
) -> Result<ProbeReport> {
    let (content_type, reader) = open_input(input, format).await?;
    let engine = config.engine_config(BoundaryRule::Keyframe);
    let channel = new_channel(&engine);

    let mut cursor = channel.store().cursor();
    let tally = tokio::spawn(async move {
        let mut report = ProbeReport::default();
        loop {
            match cursor.next_batch().await {
                Ok(items) => {
                    for item in items {
                        match item {
                            CursorItem::Header(header) => {
                                report.epochs += 1;
                                report.header_bytes += header.data.len();
                            }
                            CursorItem::Content(content) => {
                                report.chunks += 1;
                                report.body_bytes += content.data.len() as u64;
                                report.continuations += usize::from(content.continuation);
                            }
                        }
                    }
                }
                Err(StoreError::FellBehind { position, horizon, .. }) => {
                    warn!(position, horizon, "Probe reader fell behind, counts are partial");
                    cursor.resync();
                }
                Err(_) => break,
            }
        }
        report
    });

    let reason = run_demuxer(
        channel.clone(),
        demuxer_for(content_type, reader, &engine),
        token,
    )
    .await;
    let mut report = tally.await?;
    report.info = channel.info();
    debug!(?reason, "Probe finished");
    Ok(report)
}
