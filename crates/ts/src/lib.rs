//! Transport Stream (TS) framing for MPEG-2 Transport Stream data
//!
//! This crate splits a raw byte stream into 188-byte transport packets,
//! auto-detecting 192-byte (timecode-prefixed) units and resynchronizing
//! byte by byte when the sync byte is lost. Each packet can be classified
//! as a keyframe boundary or the start of a video PES without copying.

pub mod codec;
pub mod error;
pub mod packet;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use codec::{PacketUnit, TsPacketCodec};
pub use error::TsError;
pub use packet::{PID_NULL, PID_PAT, SYNC_BYTE, TS_PACKET_SIZE, TsPacketRef};

/// Result type for TS parsing operations
pub type Result<T> = std::result::Result<T, TsError>;
