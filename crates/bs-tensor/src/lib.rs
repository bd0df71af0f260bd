//! `bs-tensor` - Dense tensors for the beam-search runtime.
//!
//! This crate provides:
//! - A generic row-major `Tensor<T>` used for step history grids
//! - Shape utilities with checked indexing and shape assertions

pub mod error;
pub mod shape;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use tensor::Tensor;
