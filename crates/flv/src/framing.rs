use crate::tag::FlvTagType;

pub const PREV_TAG_SIZE_FIELD_SIZE: usize = 4;
pub const TAG_HEADER_SIZE: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTagHeader {
    pub tag_type: FlvTagType,
    pub data_size: u32,
    pub timestamp_ms: u32,
}

impl ParsedTagHeader {
    /// Bytes the tag occupies on the wire, including the trailing size field.
    pub fn wire_size(&self) -> usize {
        TAG_HEADER_SIZE + self.data_size as usize + PREV_TAG_SIZE_FIELD_SIZE
    }
}

pub fn parse_tag_header_bytes(bytes: &[u8; TAG_HEADER_SIZE]) -> ParsedTagHeader {
    let tag_type = FlvTagType::from(bytes[0] & 0x1F);
    let data_size = ((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 8) | (bytes[3] as u32);
    // Bytes 4..7 carry the low 24 bits, byte 7 is the extension (high 8 bits).
    let timestamp_ms = ((bytes[7] as u32) << 24)
        | ((bytes[4] as u32) << 16)
        | ((bytes[5] as u32) << 8)
        | (bytes[6] as u32);

    ParsedTagHeader {
        tag_type,
        data_size,
        timestamp_ms,
    }
}

/// Overwrite the timestamp field of a tag header in place.
pub fn write_tag_timestamp(header: &mut [u8], timestamp_ms: u32) {
    let be = timestamp_ms.to_be_bytes();
    header[4] = be[1];
    header[5] = be[2];
    header[6] = be[3];
    header[7] = be[0];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_with_extended_timestamp() {
        let bytes = [0x09, 0x00, 0x01, 0x00, 0x12, 0x34, 0x56, 0x01, 0, 0, 0];
        let header = parse_tag_header_bytes(&bytes);
        assert_eq!(header.tag_type, FlvTagType::Video);
        assert_eq!(header.data_size, 256);
        assert_eq!(header.timestamp_ms, 0x0112_3456);
        assert_eq!(header.wire_size(), 11 + 256 + 4);
    }

    #[test]
    fn test_write_timestamp_round_trips() {
        let mut bytes = [0x08, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0];
        write_tag_timestamp(&mut bytes, 0x0A0B_0C0D);
        assert_eq!(&bytes[4..8], &[0x0B, 0x0C, 0x0D, 0x0A]);
        assert_eq!(parse_tag_header_bytes(&bytes).timestamp_ms, 0x0A0B_0C0D);
    }
}
