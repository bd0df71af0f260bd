use crate::error::{Result, TensorError};
use std::fmt;

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Computes row-major contiguous strides for this shape.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Number of elements covered by one index along the leading axis.
    ///
    /// For [d0, d1, d2] this is d1*d2. A rank-0 shape has a row size of 1.
    pub fn row_size(&self) -> usize {
        self.dims.iter().skip(1).product()
    }

    /// Flat row-major offset of a full multi-dimensional index.
    pub fn offset(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.dims.len() {
            return Err(TensorError::RankMismatch {
                expected: self.dims.len(),
                got: index.len(),
            });
        }
        let mut offset = 0;
        for ((&i, &d), stride) in index.iter().zip(&self.dims).zip(self.strides()) {
            if i >= d {
                return Err(TensorError::IndexOutOfBounds {
                    index: index.to_vec(),
                    shape: self.dims.clone(),
                });
            }
            offset += i * stride;
        }
        Ok(offset)
    }

    /// Fails with `ShapeMismatch` unless this shape is exactly `expected`.
    pub fn expect(&self, expected: &[usize]) -> Result<()> {
        if self.dims != expected {
            return Err(TensorError::ShapeMismatch {
                expected: expected.to_vec(),
                got: self.dims.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}
