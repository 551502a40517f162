use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mp4Error {
    #[error("Box '{box_type}' declares {size} bytes, above the {limit} byte limit")]
    BoxTooLarge {
        box_type: String,
        size: u64,
        limit: usize,
    },

    #[error("Malformed box header: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
