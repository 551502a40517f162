use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::FlvError;

pub const FLV_HEADER_SIZE: usize = 9;
// DataOffset is a 32-bit header length field. In practice it is 9 for standard FLV.
// Put a conservative bound to avoid buffering unbounded data for a bogus header.
const MAX_DATA_OFFSET: u32 = 64 * 1024;

/// The 9-byte FLV file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
    /// Total size of the header, usually 9
    pub data_offset: u32,
}

impl FlvHeader {
    /// Whether `bytes` begins with the `FLV` signature.
    pub fn has_signature(bytes: &[u8]) -> bool {
        bytes.len() >= 3 && &bytes[..3] == b"FLV"
    }

    /// Parse the fixed 9-byte header. `bytes` must hold at least 9 bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, FlvError> {
        if bytes.len() < FLV_HEADER_SIZE {
            return Err(FlvError::InvalidHeader(format!(
                "need {FLV_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut reader = Cursor::new(bytes);
        let signature = reader.read_u24::<BigEndian>()?;
        if signature != 0x464C56 {
            return Err(FlvError::InvalidHeader("invalid FLV signature".to_string()));
        }

        let version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let data_offset = reader.read_u32::<BigEndian>()?;

        if !(FLV_HEADER_SIZE as u32..=MAX_DATA_OFFSET).contains(&data_offset) {
            return Err(FlvError::InvalidHeader(format!(
                "invalid DataOffset: {data_offset}"
            )));
        }

        Ok(FlvHeader {
            version,
            has_audio: (flags & 0b0000_0100) != 0,
            has_video: (flags & 0b0000_0001) != 0,
            data_offset,
        })
    }
}
