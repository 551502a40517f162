//! FLV framing for live relay ingestion.
//!
//! The framer works on a buffered byte window: it recognizes the optional
//! file header, splits the rest into tags (each carrying its trailing
//! `PreviousTagSize` field), classifies video keyframes and rewrites tag
//! timestamps relative to the first non-zero timestamp seen.

pub mod codec;
pub mod error;
pub mod framing;
pub mod header;
pub mod tag;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use codec::{DEFAULT_CACHE_CEILING, FlvTagCodec, FlvUnit};
pub use error::FlvError;
pub use header::FlvHeader;
pub use tag::{FlvTag, FlvTagType, TimestampNormalizer};
