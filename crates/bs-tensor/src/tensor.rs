use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// A dense, row-major tensor over any element type.
///
/// Beam-search state is mostly `[step][slot]` grids of scores, token ids,
/// backpointers and encoded records, plus `[step][slot][attn_dim]` attention
/// history. All of them share this layout; indexing along the leading axis
/// yields contiguous rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    data: Vec<T>,
    shape: Shape,
}

impl<T> Tensor<T> {
    /// Create a tensor from flat row-major data and a shape.
    pub fn from_vec(data: Vec<T>, shape: Shape) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(TensorError::DataLength {
                len: data.len(),
                shape: shape.dims().to_vec(),
                numel: shape.numel(),
            });
        }
        Ok(Tensor { data, shape })
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the underlying row-major data.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Row `i` along the leading axis.
    ///
    /// # Panics
    /// Panics if `i` is outside the leading dimension.
    pub fn row(&self, i: usize) -> &[T] {
        let rs = self.shape.row_size();
        &self.data[i * rs..(i + 1) * rs]
    }

    /// Mutable row `i` along the leading axis.
    ///
    /// # Panics
    /// Panics if `i` is outside the leading dimension.
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        let rs = self.shape.row_size();
        &mut self.data[i * rs..(i + 1) * rs]
    }

    /// Checked element access by full multi-dimensional index.
    pub fn get(&self, index: &[usize]) -> Result<&T> {
        let offset = self.shape.offset(index)?;
        Ok(&self.data[offset])
    }

    /// Checked mutable element access by full multi-dimensional index.
    pub fn get_mut(&mut self, index: &[usize]) -> Result<&mut T> {
        let offset = self.shape.offset(index)?;
        Ok(&mut self.data[offset])
    }
}

impl<T: Clone> Tensor<T> {
    /// Create a tensor with every element set to `value`.
    pub fn full(shape: Shape, value: T) -> Self {
        let n = shape.numel();
        Tensor {
            data: vec![value; n],
            shape,
        }
    }

    /// Build a rank-2 tensor from equally sized rows.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![rows.len(), width],
                    got: vec![rows.len(), row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Tensor::from_vec(data, Shape::new(vec![rows.len(), width]))
    }
}

impl<T: Clone + Default> Tensor<T> {
    /// Create a tensor filled with `T::default()` (zeros for numbers, empty
    /// buffers for byte records).
    pub fn zeros(shape: Shape) -> Self {
        Tensor::full(shape, T::default())
    }
}
