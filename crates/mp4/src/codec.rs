use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::box_utils::{BoxType, DeclaredSize, read_box_header};
use crate::Mp4Error;

/// Largest top-level box accepted from a live stream.
pub const DEFAULT_MAX_BOX_SIZE: usize = 8 * 1024 * 1024;

/// One complete top-level box, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Box {
    pub box_type: BoxType,
    pub header_size: usize,
    pub data: Bytes,
}

impl Mp4Box {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn payload(&self) -> Bytes {
        self.data.slice(self.header_size..)
    }
}

/// Splits an fMP4 byte stream into top-level boxes.
///
/// A declared size above the ceiling is an error rather than something to
/// wait for, so a corrupt size field cannot make the decoder buffer forever.
#[derive(Debug)]
pub struct Mp4BoxCodec {
    max_box_size: usize,
    boxes: u64,
}

impl Default for Mp4BoxCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4BoxCodec {
    pub fn new() -> Self {
        Self::with_max_box_size(DEFAULT_MAX_BOX_SIZE)
    }

    pub fn with_max_box_size(max_box_size: usize) -> Self {
        Self {
            max_box_size,
            boxes: 0,
        }
    }

    pub fn boxes(&self) -> u64 {
        self.boxes
    }
}

impl Decoder for Mp4BoxCodec {
    type Item = Mp4Box;
    type Error = Mp4Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((declared, fourcc)) = read_box_header(src) else {
            return Ok(None);
        };
        let box_type = BoxType::from_fourcc(fourcc);

        let (size, header_size) = match declared {
            DeclaredSize::Sized { size, header_size } => (size, header_size),
            DeclaredSize::ToEnd => {
                return Err(Mp4Error::Malformed(format!(
                    "box '{box_type}' has open-ended size"
                )));
            }
        };
        if size < header_size as u64 {
            return Err(Mp4Error::Malformed(format!(
                "box '{box_type}' declares size {size}, smaller than its header"
            )));
        }
        if size > self.max_box_size as u64 {
            return Err(Mp4Error::BoxTooLarge {
                box_type: box_type.to_string(),
                size,
                limit: self.max_box_size,
            });
        }

        let size = size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        self.boxes += 1;
        trace!(%box_type, size, "MP4 box");
        Ok(Some(Mp4Box {
            box_type,
            header_size,
            data: src.split_to(size).freeze(),
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(mp4_box) => Ok(Some(mp4_box)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Discarding incomplete MP4 box at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}
