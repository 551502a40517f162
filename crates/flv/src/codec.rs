use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::framing::{self, PREV_TAG_SIZE_FIELD_SIZE, TAG_HEADER_SIZE};
use crate::header::{FLV_HEADER_SIZE, FlvHeader};
use crate::tag::{FlvTag, FlvTagType, TimestampNormalizer};
use crate::FlvError;

/// Buffered bytes allowed while waiting for one tag to complete.
pub const DEFAULT_CACHE_CEILING: usize = 256 * 1024;

/// A unit produced by [`FlvTagCodec`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlvUnit {
    /// File header including the first `PreviousTagSize` field.
    Header(Bytes),
    Tag(FlvTag),
}

/// Splits an FLV byte stream into the file header and tags.
///
/// Leading bytes are discarded until either an `FLV` signature or a plausible
/// tag-type byte shows up. A tag is only emitted once all of its
/// `11 + size + 4` bytes are buffered. When the buffer grows past the cache
/// ceiling without completing a tag, everything buffered is dropped and the
/// codec waits for a fresh start byte.
#[derive(Debug)]
pub struct FlvTagCodec {
    started: bool,
    cache_ceiling: usize,
    normalizer: TimestampNormalizer,
    skipped_bytes: u64,
    resets: u64,
}

impl Default for FlvTagCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FlvTagCodec {
    pub fn new() -> Self {
        Self::with_cache_ceiling(DEFAULT_CACHE_CEILING)
    }

    pub fn with_cache_ceiling(cache_ceiling: usize) -> Self {
        Self {
            started: false,
            cache_ceiling,
            normalizer: TimestampNormalizer::new(),
            skipped_bytes: 0,
            resets: 0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Number of times the buffer was dropped for exceeding the ceiling.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Skip bytes until something that can start a unit is at the front.
    /// Returns false when more input is needed.
    fn seek_start(&mut self, src: &mut BytesMut) -> bool {
        while let Some(&first) = src.first() {
            if first == b'F' {
                if src.len() < 3 {
                    return false;
                }
                if FlvHeader::has_signature(src) {
                    self.started = true;
                    return true;
                }
            } else if FlvTagType::from(first).is_known() {
                debug!(tag_type = first, "FLV stream starts without a file header");
                self.started = true;
                return true;
            }
            src.advance(1);
            self.skipped_bytes += 1;
        }
        false
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<FlvUnit>, FlvError> {
        if src.len() < FLV_HEADER_SIZE {
            return Ok(None);
        }
        let header = FlvHeader::parse(&src[..FLV_HEADER_SIZE])?;
        let total = header.data_offset as usize + PREV_TAG_SIZE_FIELD_SIZE;
        if src.len() < total {
            return Ok(None);
        }
        debug!(
            version = header.version,
            has_audio = header.has_audio,
            has_video = header.has_video,
            "FLV file header"
        );
        self.normalizer.reset();
        Ok(Some(FlvUnit::Header(src.split_to(total).freeze())))
    }

    fn overflow(&mut self, src: &mut BytesMut) {
        warn!(
            buffered = src.len(),
            ceiling = self.cache_ceiling,
            "FLV cache ceiling exceeded, dropping buffered data"
        );
        src.clear();
        self.started = false;
        self.resets += 1;
    }
}

impl Decoder for FlvTagCodec {
    type Item = FlvUnit;
    type Error = FlvError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.started && !self.seek_start(src) {
            return Ok(None);
        }

        if src.first() == Some(&b'F') {
            return self.decode_header(src);
        }

        if src.len() < TAG_HEADER_SIZE {
            return Ok(None);
        }
        let mut header_bytes = [0u8; TAG_HEADER_SIZE];
        header_bytes.copy_from_slice(&src[..TAG_HEADER_SIZE]);
        let header = framing::parse_tag_header_bytes(&header_bytes);
        if let FlvTagType::Unknown(value) = header.tag_type {
            return Err(FlvError::InvalidTagType(value));
        }

        let wire_size = header.wire_size();
        if src.len() < wire_size {
            if src.len() > self.cache_ceiling {
                self.overflow(src);
            }
            return Ok(None);
        }

        let mut raw = src.split_to(wire_size);
        let timestamp_ms = self.normalizer.apply(&mut raw, header.timestamp_ms);
        trace!(
            tag_type = %header.tag_type,
            size = header.data_size,
            timestamp_ms,
            "FLV tag"
        );
        Ok(Some(FlvUnit::Tag(FlvTag {
            tag_type: header.tag_type,
            timestamp_ms,
            data: raw.freeze(),
        })))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(unit) => Ok(Some(unit)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Discarding incomplete FLV tag at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}
