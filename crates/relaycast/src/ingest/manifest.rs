use std::borrow::Cow;
use std::time::Duration;

use m3u8_rs::{Playlist, parse_playlist_res};
use url::Url;

use crate::error::IngestError;

/// Shortest nominal duration a segment is paced at.
const MIN_SEGMENT_DURATION_SECS: f32 = 1.0;

/// One segment listed by a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTask {
    pub url: Url,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Media(Vec<SegmentTask>),
    /// A master playlist; follow its first variant.
    Redirect(Url),
}

fn resolve(base: &Url, uri: &str) -> Result<Url, IngestError> {
    base.join(uri.trim())
        .map_err(|e| IngestError::invalid_url(uri, e.to_string()))
}

fn nominal_duration(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(MIN_SEGMENT_DURATION_SECS))
        .unwrap_or(Duration::from_secs(1))
}

/// Parse a playlist fetched from `base`.
///
/// Segment URIs may be absolute, host-relative or relative to the playlist
/// location. Durations under one second are raised to one second.
pub fn parse_manifest(base: &Url, body: &[u8]) -> Result<Manifest, IngestError> {
    let trimmed = body.trim_ascii_start();
    let input: Cow<[u8]> = if trimmed.starts_with(b"#EXTM3U") {
        Cow::Borrowed(trimmed)
    } else {
        let mut owned = b"#EXTM3U\n".to_vec();
        owned.extend_from_slice(trimmed);
        Cow::Owned(owned)
    };

    match parse_playlist_res(&input) {
        Ok(Playlist::MasterPlaylist(master)) => {
            let variant = master
                .variants
                .first()
                .ok_or_else(|| IngestError::manifest("master playlist has no variants"))?;
            Ok(Manifest::Redirect(resolve(base, &variant.uri)?))
        }
        Ok(Playlist::MediaPlaylist(media)) => media
            .segments
            .iter()
            .map(|segment| {
                Ok(SegmentTask {
                    url: resolve(base, &segment.uri)?,
                    duration: nominal_duration(segment.duration),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()
            .map(Manifest::Media),
        Err(e) => Err(IngestError::manifest(format!("failed to parse playlist: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.com/live/stream/index.m3u8").unwrap()
    }

    #[test]
    fn test_media_playlist_tasks_in_order() {
        let body = b"#EXTINF:6,\nseg1.ts\n#EXTINF:4,\nseg2.ts\n";
        let Manifest::Media(tasks) = parse_manifest(&base(), body).unwrap() else {
            panic!("expected media playlist");
        };
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].url.as_str(), "http://example.com/live/stream/seg1.ts");
        assert_eq!(tasks[0].duration, Duration::from_secs(6));
        assert_eq!(tasks[1].url.as_str(), "http://example.com/live/stream/seg2.ts");
        assert_eq!(tasks[1].duration, Duration::from_secs(4));
    }

    #[test]
    fn test_uri_forms_and_duration_floor() {
        let body = b"#EXTM3U\n#EXT-X-TARGETDURATION:2\n\
            #EXTINF:0.5,\n/abs/a.ts\n\
            #EXTINF:2.5,\nhttp://cdn.example.net/b.ts\n\
            #EXTINF:2,\n../c.ts\n";
        let Manifest::Media(tasks) = parse_manifest(&base(), body).unwrap() else {
            panic!("expected media playlist");
        };
        let urls: Vec<&str> = tasks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://example.com/abs/a.ts",
                "http://cdn.example.net/b.ts",
                "http://example.com/live/c.ts"
            ]
        );
        assert_eq!(tasks[0].duration, Duration::from_secs(1));
        assert_eq!(tasks[1].duration, Duration::from_millis(2500));
    }

    #[test]
    fn test_master_playlist_redirects_to_first_variant() {
        let body = b"#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2560000\nhigh/index.m3u8\n";
        assert_eq!(
            parse_manifest(&base(), body).unwrap(),
            Manifest::Redirect(Url::parse("http://example.com/live/stream/low/index.m3u8").unwrap())
        );
    }

    #[test]
    fn test_playlist_without_segments() {
        let body = b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n";
        assert_eq!(parse_manifest(&base(), body).unwrap(), Manifest::Media(Vec::new()));
    }
}
