//! `bs-hyps` - Terminated hypothesis records.
//!
//! A terminated hypothesis is stored as an opaque, length-prefixed binary
//! record so that search state can hold it in a flat `[step][slot]` grid. An
//! empty buffer means "no hypothesis". This crate provides:
//! - `Hypothesis`, the decoded form
//! - `Hypothesis::encode` / `Hypothesis::decode`
//! - `unpack`, the batch decoder into parallel ids/lengths/scores arrays

pub mod codec;
pub mod error;
pub mod hypothesis;
pub mod unpack;

pub use error::{CodecError, Result};
pub use hypothesis::{AttentionVector, Hypothesis};
pub use unpack::{unpack, RecordFailure, UnpackedBatch};
