pub mod dtype;
pub mod host_tensor;
pub mod shape;

pub use dtype::DType;
pub use host_tensor::Tensor;
pub use shape::Shape;

use serde::{Deserialize, Serialize};

/// Structural projection of a tensor: element type and dimensions, never the
/// payload. Two tensors with equal specs are interchangeable as far as graph
/// definitions are concerned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dtype: DType, dims: Vec<usize>) -> Self {
        TensorSpec { dtype, dims }
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.num_elements() * self.dtype.size_in_bytes()
    }
}
