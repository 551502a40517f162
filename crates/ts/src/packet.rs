use crate::{Result, TsError};

/// Size of a standard transport packet.
pub const TS_PACKET_SIZE: usize = 188;

/// First byte of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// Video stream ID range (0xE0..=0xEF)
const STREAM_ID_VIDEO_MIN: u8 = 0xE0;
const STREAM_ID_VIDEO_MAX: u8 = 0xEF;
/// Audio stream ID range (0xC0..=0xDF)
const STREAM_ID_AUDIO_MIN: u8 = 0xC0;
const STREAM_ID_AUDIO_MAX: u8 = 0xDF;

/// Zero-copy view over a single 188-byte transport packet.
#[derive(Debug, Clone, Copy)]
pub struct TsPacketRef<'a> {
    data: &'a [u8],
}

impl<'a> TsPacketRef<'a> {
    /// Wrap a 188-byte packet, validating size and sync byte.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() != TS_PACKET_SIZE {
            return Err(TsError::InvalidPacketSize(data.len()));
        }
        if data[0] != SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(data[0]));
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn transport_error_indicator(&self) -> bool {
        (self.data[1] & 0x80) != 0
    }

    pub fn payload_unit_start_indicator(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    pub fn pid(&self) -> u16 {
        ((self.data[1] as u16 & 0x1F) << 8) | self.data[2] as u16
    }

    pub fn adaptation_field_control(&self) -> u8 {
        (self.data[3] >> 4) & 0x03
    }

    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    pub fn has_adaptation_field(&self) -> bool {
        matches!(self.adaptation_field_control(), 0x02 | 0x03)
    }

    pub fn has_payload(&self) -> bool {
        matches!(self.adaptation_field_control(), 0x01 | 0x03)
    }

    /// Adaptation field bytes after the length byte, if present and well-formed.
    pub fn adaptation_field(&self) -> Option<&'a [u8]> {
        if !self.has_adaptation_field() {
            return None;
        }
        let length = self.data[4] as usize;
        if length == 0 || 5 + length > TS_PACKET_SIZE {
            return None;
        }
        Some(&self.data[5..5 + length])
    }

    /// Random access indicator (bit 6 of the adaptation field flags).
    pub fn random_access_indicator(&self) -> bool {
        self.adaptation_field()
            .is_some_and(|af| (af[0] & 0x40) != 0)
    }

    pub fn payload(&self) -> Option<&'a [u8]> {
        if !self.has_payload() {
            return None;
        }
        let offset = if self.has_adaptation_field() {
            5 + self.data[4] as usize
        } else {
            4
        };
        if offset >= TS_PACKET_SIZE {
            return None;
        }
        Some(&self.data[offset..])
    }

    /// PES stream id when this packet starts a PES packet.
    pub fn pes_stream_id(&self) -> Option<u8> {
        if !self.payload_unit_start_indicator() {
            return None;
        }
        match self.payload()? {
            [0x00, 0x00, 0x01, stream_id, ..] => Some(*stream_id),
            _ => None,
        }
    }

    /// Whether this packet starts a video PES packet.
    pub fn is_video_start(&self) -> bool {
        self.pes_stream_id()
            .is_some_and(|id| (STREAM_ID_VIDEO_MIN..=STREAM_ID_VIDEO_MAX).contains(&id))
    }

    pub fn is_audio_start(&self) -> bool {
        self.pes_stream_id()
            .is_some_and(|id| (STREAM_ID_AUDIO_MIN..=STREAM_ID_AUDIO_MAX).contains(&id))
    }

    /// Whether the packet marks a random access point a segment may start at.
    pub fn is_keyframe(&self) -> bool {
        self.random_access_indicator()
    }
}
