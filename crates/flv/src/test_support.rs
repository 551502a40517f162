//! Synthetic FLV builders for tests.

use crate::framing::TAG_HEADER_SIZE;

/// 9-byte file header plus the leading zero `PreviousTagSize0`.
pub fn make_flv_header(has_audio: bool, has_video: bool) -> Vec<u8> {
    let mut flags = 0u8;
    if has_audio {
        flags |= 0x04;
    }
    if has_video {
        flags |= 0x01;
    }
    vec![b'F', b'L', b'V', 0x01, flags, 0, 0, 0, 9, 0, 0, 0, 0]
}

/// One complete wire tag including its trailing size field.
pub fn make_tag(tag_type: u8, timestamp_ms: u32, payload: &[u8]) -> Vec<u8> {
    let size = payload.len() as u32;
    let ts = timestamp_ms.to_be_bytes();
    let mut out = Vec::with_capacity(TAG_HEADER_SIZE + payload.len() + 4);
    out.push(tag_type);
    out.extend_from_slice(&size.to_be_bytes()[1..]);
    out.extend_from_slice(&[ts[1], ts[2], ts[3], ts[0]]);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(payload);
    out.extend_from_slice(&(TAG_HEADER_SIZE as u32 + size).to_be_bytes());
    out
}

/// AVC keyframe NALU tag.
pub fn avc_keyframe(timestamp_ms: u32) -> Vec<u8> {
    make_tag(9, timestamp_ms, &[0x17, 0x01, 0x00, 0x00, 0x00, 0x65])
}

/// AVC inter-frame NALU tag.
pub fn avc_inter_frame(timestamp_ms: u32) -> Vec<u8> {
    make_tag(9, timestamp_ms, &[0x27, 0x01, 0x00, 0x00, 0x00, 0x41])
}

/// AAC raw frame tag.
pub fn aac_frame(timestamp_ms: u32) -> Vec<u8> {
    make_tag(8, timestamp_ms, &[0xAF, 0x01, 0x21, 0x10])
}
