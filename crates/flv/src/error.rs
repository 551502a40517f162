use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlvError {
    #[error("Invalid FLV header: {0}")]
    InvalidHeader(String),

    #[error("Invalid tag type: 0x{0:02X}")]
    InvalidTagType(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
