//! Fragmented MP4 framing.
//!
//! A fragmented MP4 stream is a flat run of top-level boxes: `ftyp` and
//! `moov` once, then `moof`/`mdat` pairs. [`Mp4BoxCodec`] splits the stream
//! into whole boxes and [`parse_bitrate`] reads the advertised bitrate out of
//! an init segment.

mod box_utils;
pub mod codec;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use box_utils::{BoxType, parse_bitrate};
pub use codec::{DEFAULT_MAX_BOX_SIZE, Mp4Box, Mp4BoxCodec};
pub use error::Mp4Error;
