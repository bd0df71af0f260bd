use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("record truncated while reading {field}")]
    Truncated { field: &'static str },
    #[error("{field} declares {count} elements but only {remaining} bytes remain")]
    LengthOverflow {
        field: &'static str,
        count: usize,
        remaining: usize,
    },
    #[error("invalid normalized-score flag byte: {0}")]
    InvalidFlag(u8),
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;
