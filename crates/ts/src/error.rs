use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsError {
    #[error("Invalid packet size: {0}, expected 188")]
    InvalidPacketSize(usize),

    #[error("Invalid sync byte: 0x{0:02X}, expected 0x47")]
    InvalidSyncByte(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
