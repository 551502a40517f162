use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::{SYNC_BYTE, TS_PACKET_SIZE, TsError};

/// Bytes needed to decide the unit size (sync at offset 0 or offset 4).
const DETECT_WINDOW: usize = 5;

/// On-wire size of one transport unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketUnit {
    /// Plain 188-byte packets.
    Ts188,
    /// 4-byte timecode followed by a 188-byte packet.
    M2ts192,
}

impl PacketUnit {
    pub fn size(&self) -> usize {
        match self {
            PacketUnit::Ts188 => TS_PACKET_SIZE,
            PacketUnit::M2ts192 => TS_PACKET_SIZE + 4,
        }
    }

    fn sync_offset(&self) -> usize {
        match self {
            PacketUnit::Ts188 => 0,
            PacketUnit::M2ts192 => 4,
        }
    }

    fn starts_at(&self, buf: &[u8]) -> bool {
        buf.get(self.sync_offset()) == Some(&SYNC_BYTE)
    }

    /// Whether the unit after this one also starts with a sync byte.
    /// `None` while not enough bytes are buffered to tell.
    fn followed_by_sync(&self, buf: &[u8]) -> Option<bool> {
        buf.get(self.size() + self.sync_offset())
            .map(|b| *b == SYNC_BYTE)
    }

    /// Detect the unit size at the start of `buf`.
    ///
    /// A candidate whose next unit also starts with a sync byte wins, 192
    /// first since a timecode byte may equal the sync byte. Without that
    /// confirmation the first candidate with a sync byte in place is taken,
    /// 188 first.
    pub fn detect(buf: &[u8]) -> Option<Self> {
        let confirmed = |unit: &PacketUnit| {
            unit.starts_at(buf) && unit.followed_by_sync(buf) == Some(true)
        };
        [PacketUnit::M2ts192, PacketUnit::Ts188]
            .into_iter()
            .find(confirmed)
            .or_else(|| {
                [PacketUnit::Ts188, PacketUnit::M2ts192]
                    .into_iter()
                    .find(|unit| unit.starts_at(buf))
            })
    }
}

/// Splits a byte stream into 188-byte transport packets.
///
/// Truncated input yields `Ok(None)` without consuming anything. Input that
/// does not line up with a sync byte is skipped up to the next sync byte,
/// where the unit size is detected again. 192-byte units have their
/// timecode prefix stripped.
#[derive(Debug, Default)]
pub struct TsPacketCodec {
    unit: Option<PacketUnit>,
    skipped_bytes: u64,
    packets: u64,
}

impl TsPacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit size locked in by the most recent successful sync.
    pub fn unit(&self) -> Option<PacketUnit> {
        self.unit
    }

    /// Total bytes discarded while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }
}

impl Decoder for TsPacketCodec {
    type Item = Bytes;
    type Error = TsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let unit = match self.unit {
                Some(unit) => unit,
                None => {
                    if src.len() < DETECT_WINDOW {
                        return Ok(None);
                    }
                    match PacketUnit::detect(src) {
                        Some(unit) => {
                            debug!(?unit, "TS packet unit detected");
                            self.unit = Some(unit);
                            unit
                        }
                        None => {
                            // Jump straight to the next sync candidate.
                            match memchr(SYNC_BYTE, &src[1..]) {
                                Some(idx) => {
                                    let skip = idx + 1;
                                    src.advance(skip);
                                    self.skipped_bytes += skip as u64;
                                }
                                None => {
                                    let skip = src.len() - (DETECT_WINDOW - 1);
                                    src.advance(skip);
                                    self.skipped_bytes += skip as u64;
                                    return Ok(None);
                                }
                            }
                            continue;
                        }
                    }
                }
            };

            let size = unit.size();
            if src.len() < size {
                return Ok(None);
            }

            let sync = unit.sync_offset();
            if src[sync] != SYNC_BYTE {
                // Re-detect at the same offset: the packet may simply use the
                // other unit size.
                trace!(?unit, "TS sync lost, resynchronizing");
                self.unit = None;
                continue;
            }

            let mut frame = src.split_to(size);
            if sync > 0 {
                frame.advance(sync);
            }
            self.packets += 1;
            return Ok(Some(frame.freeze()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Discarding truncated TS tail at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}
