use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::framing::{self, PREV_TAG_SIZE_FIELD_SIZE, TAG_HEADER_SIZE};

/// AVC video payload: keyframe, codec id 7
const AVC_KEYFRAME: u8 = 0x17;
/// AVC video payload: inter frame, codec id 7
const AVC_INTER_FRAME: u8 = 0x27;
/// AVCPacketType 1 carries NAL units
const AVC_NALU: u8 = 0x01;

/// The type of an FLV tag.
///
/// The 3 types that are supported are:
/// - Audio(8)
/// - Video(9)
/// - ScriptData(18)
///
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    ScriptData = 18,
    Unknown(u8),
}

impl FlvTagType {
    pub fn is_known(&self) -> bool {
        !matches!(self, FlvTagType::Unknown(_))
    }
}

impl From<u8> for FlvTagType {
    fn from(value: u8) -> Self {
        match value {
            8 => FlvTagType::Audio,
            9 => FlvTagType::Video,
            18 => FlvTagType::ScriptData,
            _ => FlvTagType::Unknown(value),
        }
    }
}

impl From<FlvTagType> for u8 {
    fn from(value: FlvTagType) -> Self {
        match value {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::ScriptData => 18,
            FlvTagType::Unknown(val) => val,
        }
    }
}

impl fmt::Display for FlvTagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlvTagType::Audio => write!(f, "Audio"),
            FlvTagType::Video => write!(f, "Video"),
            FlvTagType::ScriptData => write!(f, "Script"),
            FlvTagType::Unknown(value) => write!(f, "Unknown({value})"),
        }
    }
}

/// One framed FLV tag.
///
/// `data` holds the tag exactly as it appears on the wire: the 11-byte
/// header, the payload and the trailing `PreviousTagSize` field.
#[derive(Debug, Clone, PartialEq)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    /// A timestamp in milliseconds, after normalization
    pub timestamp_ms: u32,
    pub data: Bytes,
}

impl FlvTag {
    /// Tag body between the header and the trailing size field.
    pub fn payload(&self) -> &[u8] {
        let end = self.data.len().saturating_sub(PREV_TAG_SIZE_FIELD_SIZE);
        self.data.get(TAG_HEADER_SIZE..end).unwrap_or(&[])
    }

    pub fn is_video(&self) -> bool {
        matches!(self.tag_type, FlvTagType::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.tag_type, FlvTagType::Audio)
    }

    pub fn is_script(&self) -> bool {
        matches!(self.tag_type, FlvTagType::ScriptData)
    }

    /// Video tag carrying AVC NAL units.
    pub fn is_avc(&self) -> bool {
        if !self.is_video() {
            return false;
        }
        match self.payload() {
            [first, packet_type, ..] => {
                (*first == AVC_KEYFRAME || *first == AVC_INTER_FRAME) && *packet_type == AVC_NALU
            }
            _ => false,
        }
    }

    /// AVC keyframe NAL unit.
    pub fn is_keyframe(&self) -> bool {
        self.is_video() && matches!(self.payload(), [AVC_KEYFRAME, AVC_NALU, ..])
    }

    /// Whether a segment may start at this tag. Video tags that are not AVC
    /// NAL units (other codecs, sequence headers) count as boundaries.
    pub fn is_keyframe_equivalent(&self) -> bool {
        self.is_video() && (self.is_keyframe() || !self.is_avc())
    }
}

/// Rewrites tag timestamps relative to the first non-zero timestamp seen.
///
/// Tags stamped zero are left alone, so sequence headers sent before the
/// first media tag keep their zero timestamp.
#[derive(Debug, Default, Clone)]
pub struct TimestampNormalizer {
    start_ms: Option<u32>,
}

impl TimestampNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_ms(&self) -> Option<u32> {
        self.start_ms
    }

    pub fn reset(&mut self) {
        self.start_ms = None;
    }

    /// Normalize the timestamp of a complete wire tag in place and return
    /// the rewritten value.
    pub fn apply(&mut self, tag: &mut BytesMut, timestamp_ms: u32) -> u32 {
        if timestamp_ms == 0 {
            return 0;
        }
        let start = *self.start_ms.get_or_insert(timestamp_ms);
        let relative = timestamp_ms.saturating_sub(start);
        if relative != timestamp_ms {
            framing::write_tag_timestamp(&mut tag[..TAG_HEADER_SIZE], relative);
        }
        relative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_tag;

    fn tag(tag_type: u8, payload: &[u8]) -> FlvTag {
        FlvTag {
            tag_type: FlvTagType::from(tag_type),
            timestamp_ms: 0,
            data: Bytes::from(make_tag(tag_type, 0, payload)),
        }
    }

    #[test]
    fn test_payload_excludes_header_and_size_field() {
        let t = tag(8, &[0xAF, 0x01, 0x02]);
        assert_eq!(t.payload(), &[0xAF, 0x01, 0x02]);
        assert!(t.is_audio());
        assert!(!t.is_keyframe_equivalent());
    }

    #[test]
    fn test_avc_keyframe_classification() {
        let key = tag(9, &[0x17, 0x01, 0, 0, 0]);
        assert!(key.is_avc());
        assert!(key.is_keyframe());
        assert!(key.is_keyframe_equivalent());

        let inter = tag(9, &[0x27, 0x01, 0, 0, 0]);
        assert!(inter.is_avc());
        assert!(!inter.is_keyframe());
        assert!(!inter.is_keyframe_equivalent());
    }

    #[test]
    fn test_non_avc_video_is_keyframe_equivalent() {
        // AVC sequence header (packet type 0)
        assert!(tag(9, &[0x17, 0x00, 0, 0, 0]).is_keyframe_equivalent());
        // VP6 frame
        assert!(tag(9, &[0x24, 0x00]).is_keyframe_equivalent());
        // too short to carry an AVC packet type
        assert!(tag(9, &[0x27]).is_keyframe_equivalent());
    }

    #[test]
    fn test_normalizer_rewrites_relative_to_first_nonzero() {
        let mut normalizer = TimestampNormalizer::new();

        let mut zero = BytesMut::from(&make_tag(9, 0, &[0x17, 0x00])[..]);
        assert_eq!(normalizer.apply(&mut zero, 0), 0);
        assert_eq!(normalizer.start_ms(), None);

        let mut first = BytesMut::from(&make_tag(9, 5_000, &[0x17, 0x01])[..]);
        assert_eq!(normalizer.apply(&mut first, 5_000), 0);
        assert_eq!(&first[4..8], &[0, 0, 0, 0]);

        let mut later = BytesMut::from(&make_tag(8, 5_040, &[0xAF])[..]);
        assert_eq!(normalizer.apply(&mut later, 5_040), 40);
        let header: [u8; TAG_HEADER_SIZE] = later[..TAG_HEADER_SIZE].try_into().unwrap();
        assert_eq!(framing::parse_tag_header_bytes(&header).timestamp_ms, 40);
    }
}
