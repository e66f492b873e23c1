//! Error types for the bloom index

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Not a bloom index file: bad magic 0x{0:04x}")]
    BadMagic(u16),

    #[error("Unsupported index version: {0}")]
    BadVersion(u8),

    #[error("Filter width mismatch: file has {file}, caller requested {requested}")]
    FormatMismatch { file: u16, requested: u16 },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Primary key 0 is reserved for tombstones")]
    ReservedPk,

    #[error("Need at least one value")]
    EmptyValues,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// Get error code for host-facing wrappers
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::BadMagic(_) => "ERR_MAGIC",
            IndexError::BadVersion(_) => "ERR_VERSION",
            IndexError::FormatMismatch { .. } => "ERR_FORMAT",
            IndexError::InvalidFormat(_) => "ERR_CORRUPT",
            IndexError::ReservedPk => "ERR_RESERVED_PK",
            IndexError::EmptyValues => "ERR_EMPTY_VALUES",
            IndexError::Io(_) => "ERR_IO",
        }
    }
}
