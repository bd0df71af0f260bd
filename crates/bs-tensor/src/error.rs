use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("data length {len} does not match shape {shape:?} (numel={numel})")]
    DataLength {
        len: usize,
        shape: Vec<usize>,
        numel: usize,
    },
    #[error("rank mismatch: expected {expected} dimensions, got {got}")]
    RankMismatch { expected: usize, got: usize },
    #[error("index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },
}

pub type Result<T> = std::result::Result<T, TensorError>;
