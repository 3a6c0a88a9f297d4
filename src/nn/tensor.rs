//! A simple owned `f32` tensor type used for network inputs and outputs.

use std::fmt;

use anyhow::bail;

/// An N-dimensional array of `f32`s, stored in row-major order.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Box<[usize]>,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is invoked with successive indices, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));

            // Increment the index, innermost dimension first.
            for dim in (0..N).rev() {
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }

        Self {
            shape: shape.into(),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape from its row-major elements.
    ///
    /// Fails if the number of elements doesn't match the shape.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> anyhow::Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            bail!(
                "tensor of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len(),
            );
        }
        Ok(Self {
            shape: shape.into(),
            data: data.into_boxed_slice(),
        })
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Self::from_vec(tract.shape(), data.to_vec())
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions of this tensor.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements in this tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns all elements of this tensor in row-major order, regardless of its shape.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor {:?}", self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_fn() {
        let t = Tensor::from_array_shape_fn([2, 3], |[y, x]| (y * 10 + x) as f32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.as_slice(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);

        let empty = Tensor::from_array_shape_fn([1, 0, 4], |_| unreachable!());
        assert!(empty.is_empty());
        assert_eq!(empty.rank(), 3);
    }

    #[test]
    fn from_vec_checks_len() {
        assert!(Tensor::from_vec(&[2, 2], vec![0.0; 3]).is_err());
        let t = Tensor::from_vec(&[4], vec![1.0; 4]).unwrap();
        assert_eq!(t.len(), 4);
    }
}
