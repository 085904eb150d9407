//! Contract for external compiling transforms.

use thiserror::Error;

use crate::graph::{GraphDef, LeafValues};

pub type CompilerResult<T> = Result<T, CompilerError>;

/// Compiler error surfaced to higher layers.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("compilation failed: {message}")]
    Compile { message: String },
    #[error("execution failed: {message}")]
    Execution { message: String },
}

impl CompilerError {
    pub fn compile(message: impl Into<String>) -> Self {
        CompilerError::Compile {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        CompilerError::Execution {
            message: message.into(),
        }
    }
}

/// Result of executing a compiled transform: the transformed values, plus a
/// new definition when the transform changed the structure of its output.
/// `def: None` means the output aligns with the definition it was compiled
/// against.
#[derive(Debug)]
pub struct StagedOutput {
    pub values: LeafValues,
    pub def: Option<GraphDef>,
}

impl StagedOutput {
    pub fn values(values: LeafValues) -> Self {
        StagedOutput { values, def: None }
    }

    pub fn with_def(values: LeafValues, def: GraphDef) -> Self {
        StagedOutput {
            values,
            def: Some(def),
        }
    }
}

/// An external compiler that specializes a transform per graph definition.
///
/// The definition is the whole compile-time interface: hashable, structural,
/// free of payload data. Array data flows exclusively through `execute`.
/// `compiler_name` must uniquely identify the compiler configuration, since
/// it namespaces the process-wide executable cache.
pub trait PortableCompiler: Send + Sync {
    type Executable: Send + Sync + 'static;

    fn compiler_name(&self) -> &str;

    fn compile(&self, def: &GraphDef) -> CompilerResult<Self::Executable>;

    fn execute(
        &self,
        executable: &Self::Executable,
        values: &LeafValues,
    ) -> CompilerResult<StagedOutput>;
}
