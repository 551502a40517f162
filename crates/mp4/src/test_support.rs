//! Shared fMP4 test builders.
//!
//! This module is available for local mp4 tests and optionally for downstream
//! crate tests when the `test-utils` feature is enabled.

pub fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

pub fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.push(((flags >> 16) & 0xFF) as u8);
    body.push(((flags >> 8) & 0xFF) as u8);
    body.push((flags & 0xFF) as u8);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

/// `btrt` box: buffer size, max bit rate, average bit rate.
pub fn make_btrt(max_bitrate: u32, avg_bitrate: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(12);
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&max_bitrate.to_be_bytes());
    body.extend_from_slice(&avg_bitrate.to_be_bytes());
    make_box(b"btrt", &body)
}

pub fn make_ftyp() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"isom");
    body.extend_from_slice(&0x200u32.to_be_bytes());
    body.extend_from_slice(b"isomiso6mp41");
    make_box(b"ftyp", &body)
}

/// `moov` with one track whose sample entry optionally carries a `btrt`.
pub fn make_moov(track_id: u32, max_bitrate: Option<u32>) -> Vec<u8> {
    let mut tkhd_payload = Vec::new();
    tkhd_payload.extend_from_slice(&0u32.to_be_bytes());
    tkhd_payload.extend_from_slice(&0u32.to_be_bytes());
    tkhd_payload.extend_from_slice(&track_id.to_be_bytes());
    tkhd_payload.extend_from_slice(&0u32.to_be_bytes());
    let tkhd = make_full_box(b"tkhd", 0, 0, &tkhd_payload);

    let sample_entry_children = max_bitrate
        .map(|max| make_btrt(max, max / 2))
        .unwrap_or_default();
    let sample_entry_box = make_box(b"avc1", &sample_entry_children);

    let mut stsd_payload = Vec::new();
    stsd_payload.extend_from_slice(&1u32.to_be_bytes());
    stsd_payload.extend_from_slice(&sample_entry_box);
    let stsd = make_full_box(b"stsd", 0, 0, &stsd_payload);

    let stbl = make_box(b"stbl", &stsd);
    let minf = make_box(b"minf", &stbl);
    let mdia = make_box(b"mdia", &minf);

    let mut trak_body = Vec::new();
    trak_body.extend_from_slice(&tkhd);
    trak_body.extend_from_slice(&mdia);
    let trak = make_box(b"trak", &trak_body);

    make_box(b"moov", &trak)
}

/// `ftyp` followed by `moov`.
pub fn make_init_segment(max_bitrate: Option<u32>) -> Vec<u8> {
    let mut out = make_ftyp();
    out.extend(make_moov(1, max_bitrate));
    out
}

/// One `moof` + `mdat` pair carrying `sample` for track 1.
pub fn make_fragment(sequence: u32, sample: &[u8]) -> Vec<u8> {
    let mfhd = make_full_box(b"mfhd", 0, 0, &sequence.to_be_bytes());
    let tfhd = make_full_box(b"tfhd", 0, 0, &1u32.to_be_bytes());

    // trun flags: data_offset_present + sample_size_present
    let trun_flags = 0x000001 | 0x000200;
    let mut trun_payload = Vec::new();
    trun_payload.extend_from_slice(&1u32.to_be_bytes()); // sample_count
    trun_payload.extend_from_slice(&0i32.to_be_bytes()); // placeholder data_offset
    trun_payload.extend_from_slice(&(sample.len() as u32).to_be_bytes());
    let mut trun = make_full_box(b"trun", 0, trun_flags, &trun_payload);

    // data_offset points past moof to the mdat payload.
    let moof_len = 8 + mfhd.len() + 8 + tfhd.len() + trun.len();
    let data_offset = (moof_len + 8) as i32;
    let trun_data_offset_pos = 8 /* box header */ + 4 /* fullbox flags */ + 4 /* sample_count */;
    trun[trun_data_offset_pos..trun_data_offset_pos + 4]
        .copy_from_slice(&data_offset.to_be_bytes());

    let mut traf_body = Vec::new();
    traf_body.extend_from_slice(&tfhd);
    traf_body.extend_from_slice(&trun);
    let traf = make_box(b"traf", &traf_body);

    let mut moof_body = Vec::new();
    moof_body.extend_from_slice(&mfhd);
    moof_body.extend_from_slice(&traf);
    let moof = make_box(b"moof", &moof_body);
    let mdat = make_box(b"mdat", sample);

    let mut out = moof;
    out.extend_from_slice(&mdat);
    out
}
