pub mod error;
pub mod graph;
pub mod hashing;
pub mod profiling;
pub mod rng;
pub mod snapshot;
pub mod stage;
pub mod tensor;
mod env;

pub use error::{StageError, StageResult};
pub use graph::{
    merge, split, update, Field, GraphDef, Leaf, LeafRole, LeafValues, Object, OpaqueValue,
    StaticValue,
};
pub use rng::{RngKey, RngStreams};
pub use stage::{CompilerError, CompilerResult, PortableCompiler, StagedFn, StagedOutput};
pub use tensor::{DType, Shape, Tensor, TensorSpec};
