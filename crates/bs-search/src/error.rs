use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("invalid search dimensions: {0}")]
    InvalidDims(String),
    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },
    #[error("probability matrix: {0}")]
    ProbsShape(#[source] bs_tensor::TensorError),
    #[error("attention matrix: {0}")]
    AttnShape(#[source] bs_tensor::TensorError),
    #[error("step {step} is outside [0, {seq_len})")]
    StepOutOfRange { step: usize, seq_len: usize },
    #[error("step {got} requested but the state expects step {expected}")]
    StepOutOfOrder { expected: usize, got: usize },
    #[error("record at step {step}, slot {slot} claims beam {claimed}, but the slot belongs to beam {expected}")]
    BeamMismatch {
        step: usize,
        slot: usize,
        claimed: u32,
        expected: usize,
    },
    #[error("record at step {step}, slot {slot}: {source}")]
    Codec {
        step: usize,
        slot: usize,
        #[source]
        source: bs_hyps::CodecError,
    },
    #[error("tensor error: {0}")]
    Tensor(#[from] bs_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
