use serde::{Deserialize, Serialize};

/// Container format carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// MPEG-2 transport stream
    Ts,
    /// Flash video tags
    Flv,
    /// Fragmented MP4 (ftyp+moov header, moof+mdat fragments)
    Mp4,
}

impl ContentType {
    /// Short type tag published in channel metadata.
    pub fn tag(&self) -> &'static str {
        match self {
            ContentType::Ts => "TS",
            ContentType::Flv => "FLV",
            ContentType::Mp4 => "MP4",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            // Relay clients expect the legacy MPEG MIME rather than video/mp2t.
            ContentType::Ts => "video/mpeg",
            ContentType::Flv => "video/x-flv",
            ContentType::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Ts => ".ts",
            ContentType::Flv => ".flv",
            ContentType::Mp4 => ".mp4",
        }
    }

    /// Guess the container from the first bytes of a stream.
    ///
    /// MP4 is checked first because an `ftyp` box can legitimately start
    /// with a byte that looks like an FLV tag type.
    pub fn sniff(head: &[u8]) -> Option<Self> {
        if head.len() >= 8 && &head[4..8] == b"ftyp" {
            return Some(ContentType::Mp4);
        }
        if head.len() >= 3 && &head[..3] == b"FLV" {
            return Some(ContentType::Flv);
        }
        if head.first() == Some(&0x47) || head.get(4) == Some(&0x47) {
            return Some(ContentType::Ts);
        }
        match head.first() {
            Some(0x08 | 0x09 | 0x12) => Some(ContentType::Flv),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ts" | "mpegts" | "mpeg-ts" => Ok(ContentType::Ts),
            "flv" => Ok(ContentType::Flv),
            "mp4" | "fmp4" => Ok(ContentType::Mp4),
            other => Err(format!("unknown content type `{other}`")),
        }
    }
}

/// Channel metadata published by a demuxer alongside its header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub content_type: Option<ContentType>,
    /// Estimated bitrate in kbps, if known.
    pub bitrate_kbps: Option<u32>,
}

impl ChannelInfo {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type: Some(content_type),
            bitrate_kbps: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = Some(bitrate_kbps);
        self
    }

    pub fn type_tag(&self) -> Option<&'static str> {
        self.content_type.map(|t| t.tag())
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        self.content_type.map(|t| t.mime_type())
    }

    pub fn extension(&self) -> Option<&'static str> {
        self.content_type.map(|t| t.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_containers() {
        let mut mp4 = vec![0, 0, 0, 0x18];
        mp4.extend_from_slice(b"ftypisom");
        assert_eq!(ContentType::sniff(&mp4), Some(ContentType::Mp4));
        assert_eq!(ContentType::sniff(b"FLV\x01\x05"), Some(ContentType::Flv));
        assert_eq!(ContentType::sniff(&[0x09, 0, 0, 0x10]), Some(ContentType::Flv));
        assert_eq!(ContentType::sniff(&[0x47, 0x40, 0x00, 0x10]), Some(ContentType::Ts));
        assert_eq!(
            ContentType::sniff(&[0x00, 0x00, 0x00, 0x00, 0x47]),
            Some(ContentType::Ts)
        );
        assert_eq!(ContentType::sniff(b"<html>"), None);
    }

    #[test]
    fn test_channel_info_tags() {
        let info = ChannelInfo::new(ContentType::Ts).with_bitrate(2500);
        assert_eq!(info.type_tag(), Some("TS"));
        assert_eq!(info.mime_type(), Some("video/mpeg"));
        assert_eq!(info.extension(), Some(".ts"));
        assert_eq!(info.bitrate_kbps, Some(2500));
        assert_eq!(ChannelInfo::default().type_tag(), None);
    }

    #[test]
    fn test_parse_content_type() {
        assert_eq!("TS".parse::<ContentType>(), Ok(ContentType::Ts));
        assert_eq!("fmp4".parse::<ContentType>(), Ok(ContentType::Mp4));
        assert!("mkv".parse::<ContentType>().is_err());
    }
}
