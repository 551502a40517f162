use std::fmt;

use memchr::memmem;

/// Top-level box types the relay cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxType {
    Ftyp,
    Moov,
    Moof,
    Mdat,
    Other([u8; 4]),
}

impl BoxType {
    pub fn from_fourcc(fourcc: [u8; 4]) -> Self {
        match &fourcc {
            b"ftyp" => BoxType::Ftyp,
            b"moov" => BoxType::Moov,
            b"moof" => BoxType::Moof,
            b"mdat" => BoxType::Mdat,
            _ => BoxType::Other(fourcc),
        }
    }

    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            BoxType::Ftyp => *b"ftyp",
            BoxType::Moov => *b"moov",
            BoxType::Moof => *b"moof",
            BoxType::Mdat => *b"mdat",
            BoxType::Other(fourcc) => *fourcc,
        }
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fourcc = self.fourcc();
        for byte in fourcc {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// Declared size of a box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclaredSize {
    /// Total box size and header length.
    Sized { size: u64, header_size: usize },
    /// `size == 0`: box runs to the end of the file.
    ToEnd,
}

/// Read a box header: returns the declared size and the FourCC.
///
/// Handles 32-bit size, 64-bit extended size (`size == 1`),
/// and box-extends-to-EOF (`size == 0`). `None` means more bytes are needed.
pub(crate) fn read_box_header(data: &[u8]) -> Option<(DeclaredSize, [u8; 4])> {
    if data.len() < 8 {
        return None;
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let fourcc: [u8; 4] = [data[4], data[5], data[6], data[7]];

    match size {
        1 => {
            if data.len() < 16 {
                return None;
            }
            let ext_size = u64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]);
            Some((
                DeclaredSize::Sized {
                    size: ext_size,
                    header_size: 16,
                },
                fourcc,
            ))
        }
        0 => Some((DeclaredSize::ToEnd, fourcc)),
        _ => Some((
            DeclaredSize::Sized {
                size,
                header_size: 8,
            },
            fourcc,
        )),
    }
}

/// Size (20) and type of a bit rate box, followed by buffer size,
/// max bit rate and average bit rate.
const BTRT_PATTERN: [u8; 8] = [0x00, 0x00, 0x00, 0x14, b'b', b't', b'r', b't'];
const BTRT_MAX_BITRATE_OFFSET: usize = 12;

/// Sum of the max-bitrate fields of every `btrt` box in `data`, in bits per
/// second.
///
/// The boxes are found by byte pattern rather than by walking the box tree,
/// so every sample entry of every track contributes.
pub fn parse_bitrate(data: &[u8]) -> u64 {
    memmem::find_iter(data, &BTRT_PATTERN)
        .filter_map(|at| {
            let field = data.get(at + BTRT_MAX_BITRATE_OFFSET..at + BTRT_MAX_BITRATE_OFFSET + 4)?;
            Some(u32::from_be_bytes([field[0], field[1], field[2], field[3]]) as u64)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_box, make_btrt};

    #[test]
    fn test_box_type_round_trip_and_display() {
        assert_eq!(BoxType::from_fourcc(*b"moof"), BoxType::Moof);
        assert_eq!(BoxType::from_fourcc(*b"styp"), BoxType::Other(*b"styp"));
        assert_eq!(BoxType::Other(*b"sidx").to_string(), "sidx");
        assert_eq!(BoxType::Other([0, b'a', b'b', b'c']).to_string(), "\\x00abc");
    }

    #[test]
    fn test_read_box_header_variants() {
        let plain = make_box(b"free", &[0; 4]);
        assert_eq!(
            read_box_header(&plain),
            Some((
                DeclaredSize::Sized {
                    size: 12,
                    header_size: 8
                },
                *b"free"
            ))
        );

        let mut large = vec![0, 0, 0, 1];
        large.extend_from_slice(b"mdat");
        large.extend_from_slice(&24u64.to_be_bytes());
        assert_eq!(
            read_box_header(&large),
            Some((
                DeclaredSize::Sized {
                    size: 24,
                    header_size: 16
                },
                *b"mdat"
            ))
        );
        assert_eq!(read_box_header(&large[..12]), None);

        let to_end = [0, 0, 0, 0, b'm', b'd', b'a', b't'];
        assert_eq!(read_box_header(&to_end), Some((DeclaredSize::ToEnd, *b"mdat")));
    }

    #[test]
    fn test_parse_bitrate_sums_all_btrt_boxes() {
        let mut moov = Vec::new();
        moov.extend(make_btrt(2_000_000, 1_500_000));
        moov.extend(make_box(b"free", &[0; 16]));
        moov.extend(make_btrt(128_000, 96_000));
        let init = make_box(b"moov", &moov);
        assert_eq!(parse_bitrate(&init), 2_128_000);
        assert_eq!(parse_bitrate(b"no bitrate here"), 0);
    }

    #[test]
    fn test_parse_bitrate_ignores_truncated_box() {
        let btrt = make_btrt(1_000, 1_000);
        assert_eq!(parse_bitrate(&btrt[..14]), 0);
    }
}
