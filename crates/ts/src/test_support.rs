//! Synthetic transport packet builders.
//!
//! Available for local tests and for downstream crate tests when the
//! `test-utils` feature is enabled.

use crate::{SYNC_BYTE, TS_PACKET_SIZE};

/// Shape of a synthetic packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketSpec {
    pub pid: u16,
    pub random_access: bool,
    /// When set, the packet starts a PES with this stream id (PUSI set).
    pub pes_stream_id: Option<u8>,
    pub continuity_counter: u8,
    pub fill: u8,
}

impl PacketSpec {
    /// Plain continuation packet on the conventional video PID.
    pub fn video() -> Self {
        Self {
            pid: 0x100,
            random_access: false,
            pes_stream_id: None,
            continuity_counter: 0,
            fill: 0xFF,
        }
    }

    /// Video PES start flagged as a random access point.
    pub fn keyframe() -> Self {
        Self {
            random_access: true,
            pes_stream_id: Some(0xE0),
            ..Self::video()
        }
    }

    /// Video PES start without the random access flag.
    pub fn video_start() -> Self {
        Self {
            pes_stream_id: Some(0xE0),
            ..Self::video()
        }
    }

    /// Audio PES start on the conventional audio PID.
    pub fn audio_start() -> Self {
        Self {
            pid: 0x101,
            pes_stream_id: Some(0xC0),
            ..Self::video()
        }
    }
}

pub fn make_packet(spec: PacketSpec) -> Vec<u8> {
    let mut out = vec![spec.fill; TS_PACKET_SIZE];
    out[0] = SYNC_BYTE;
    let pusi = if spec.pes_stream_id.is_some() { 0x40 } else { 0x00 };
    out[1] = pusi | ((spec.pid >> 8) as u8 & 0x1F);
    out[2] = (spec.pid & 0xFF) as u8;

    let mut offset = 4;
    if spec.random_access {
        out[3] = 0x30 | (spec.continuity_counter & 0x0F);
        out[4] = 1;
        out[5] = 0x40;
        offset = 6;
    } else {
        out[3] = 0x10 | (spec.continuity_counter & 0x0F);
    }

    if let Some(stream_id) = spec.pes_stream_id {
        out[offset..offset + 4].copy_from_slice(&[0x00, 0x00, 0x01, stream_id]);
    }
    out
}

/// Concatenate packets into one contiguous stream.
pub fn make_stream(specs: &[PacketSpec]) -> Vec<u8> {
    specs.iter().flat_map(|spec| make_packet(*spec)).collect()
}

/// Prefix every 188-byte packet with a 4-byte timecode (M2TS layout).
pub fn to_m2ts(stream: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stream.len() / TS_PACKET_SIZE * 192);
    for (i, packet) in stream.chunks(TS_PACKET_SIZE).enumerate() {
        out.extend_from_slice(&(i as u32).to_be_bytes());
        out.extend_from_slice(packet);
    }
    out
}
