//! `bs-search` - Batched beam-search decoding core.
//!
//! The search state holds `num_beams` independent beams of `hyps_per_beam`
//! hypothesis slots each, laid out contiguously (`slot / hyps_per_beam` is the
//! beam). This crate provides:
//! - `BeamSearchStep`, the per-step expansion and termination kernel
//! - `StoppingPolicy`, the per-beam "can this beam still improve" test
//! - `TopKTerminated`, final ranking of terminated hypotheses
//!
//! The model and the decode loop live with the caller: each step takes the
//! log-probabilities for step `t` and mutates a `SearchState` in place.

pub mod candidate;
pub mod error;
pub mod options;
pub mod state;
pub mod step;
pub mod stopping;
pub mod topk;

pub use error::{Result, SearchError};
pub use options::{KernelVariant, StepOptions, TopKOptions};
pub use state::{BeamStatus, SearchDims, SearchState, MIN_SCORE};
pub use step::{BeamSearchStep, StepInput};
pub use stopping::{StepOutcome, StoppingPolicy};
pub use topk::{normalized_score, TopKTerminated};
