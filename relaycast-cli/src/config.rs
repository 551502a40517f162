use std::path::Path;
use std::time::Duration;

use relaycast_engine::{EngineConfig, SegmenterConfig};
use serde::Deserialize;

use crate::cli::BoundaryRule;
use crate::error::{AppError, Result};

/// Optional overrides read from a TOML file. Anything left out keeps the
/// engine default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub store: StoreSection,
    pub segmenter: SegmenterSection,
    pub ingest: IngestSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmenterSection {
    pub window_size: Option<usize>,
    pub listing_size: Option<usize>,
    pub cache_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSection {
    pub poll_interval_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub max_body_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// File name prefix of written segments, `{prefix}_{sequence:05}.ts`.
    pub prefix: String,
    pub playlist_name: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            prefix: "segment".to_string(),
            playlist_name: "playlist.m3u8".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.segmenter.window_size == Some(0) {
            return Err(AppError::Config("segmenter.window_size must be at least 1".into()));
        }
        if let (Some(window), Some(listing)) = (self.segmenter.window_size, self.segmenter.listing_size)
            && listing > window
        {
            return Err(AppError::Config(format!(
                "segmenter.listing_size ({listing}) exceeds window_size ({window})"
            )));
        }
        if self.output.prefix.is_empty() || self.output.prefix.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "output.prefix {:?} must be a plain file name",
                self.output.prefix
            )));
        }
        Ok(())
    }

    /// Engine configuration for a segmenting run with `rule`.
    pub fn engine_config(&self, rule: BoundaryRule) -> EngineConfig {
        let mut engine = EngineConfig {
            segmenter: match rule {
                BoundaryRule::Keyframe => SegmenterConfig::keyframe(),
                BoundaryRule::VideoInterval => SegmenterConfig::video_interval(),
            },
            ..EngineConfig::default()
        };

        if let Some(secs) = self.store.ttl_secs {
            engine.store.time_to_live = Duration::from_secs(secs);
        }

        let segmenter = &mut engine.segmenter;
        if let Some(window) = self.segmenter.window_size {
            segmenter.window_size = window;
        }
        if let Some(listing) = self.segmenter.listing_size {
            segmenter.listing_size = listing;
        }
        segmenter.listing_size = segmenter.listing_size.min(segmenter.window_size);
        if let Some(limit) = self.segmenter.cache_limit {
            segmenter.cache_limit = limit;
        }

        let ingest = &mut engine.ingest;
        if let Some(ms) = self.ingest.poll_interval_ms {
            ingest.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.ingest.retry_backoff_ms {
            ingest.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(max) = self.ingest.max_consecutive_failures {
            ingest.max_consecutive_failures = max;
        }
        if let Some(secs) = self.ingest.request_timeout_secs {
            ingest.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = self.ingest.max_body_size {
            ingest.max_body_size = size;
        }

        engine
    }
}
