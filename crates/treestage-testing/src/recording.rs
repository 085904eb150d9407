use std::sync::Mutex;

use treestage::{
    CompilerError, CompilerResult, DType, GraphDef, LeafValues, PortableCompiler, StagedOutput,
};

/// Executable produced by [`RecordingCompiler`]: the definition it was
/// specialized for plus the scale it applies.
pub struct RecordedExecutable {
    def: GraphDef,
    scale: f32,
}

/// Test-only compiler that records every definition handed to `compile` and
/// executes by scaling all `f32` leaves.
///
/// Give each test its own compiler name: names namespace the process-wide
/// executable cache, and tests sharing a name would observe each other's
/// compilations.
pub struct RecordingCompiler {
    name: String,
    scale: f32,
    compiled: Mutex<Vec<GraphDef>>,
}

impl RecordingCompiler {
    pub fn new(name: impl Into<String>) -> Self {
        Self::scaling(name, 1.0)
    }

    pub fn scaling(name: impl Into<String>, scale: f32) -> Self {
        RecordingCompiler {
            name: name.into(),
            scale,
            compiled: Mutex::new(Vec::new()),
        }
    }

    /// Number of times `compile` ran.
    pub fn compile_count(&self) -> usize {
        self.compiled.lock().expect("compiler mutex poisoned").len()
    }

    /// Every definition handed to `compile`, in order.
    pub fn compiled_defs(&self) -> Vec<GraphDef> {
        self.compiled
            .lock()
            .expect("compiler mutex poisoned")
            .clone()
    }

    pub fn last_def_or_panic(&self) -> GraphDef {
        self.compiled
            .lock()
            .expect("compiler mutex poisoned")
            .last()
            .expect("compiler should have compiled a definition")
            .clone()
    }
}

impl PortableCompiler for RecordingCompiler {
    type Executable = RecordedExecutable;

    fn compiler_name(&self) -> &str {
        &self.name
    }

    fn compile(&self, def: &GraphDef) -> CompilerResult<RecordedExecutable> {
        self.compiled
            .lock()
            .expect("compiler mutex poisoned")
            .push(def.clone());
        Ok(RecordedExecutable {
            def: def.clone(),
            scale: self.scale,
        })
    }

    fn execute(
        &self,
        executable: &RecordedExecutable,
        values: &LeafValues,
    ) -> CompilerResult<StagedOutput> {
        executable
            .def
            .check_values(values)
            .map_err(|err| CompilerError::execution(err.to_string()))?;
        let transformed: Vec<_> = values
            .iter()
            .map(|tensor| {
                let mut tensor = tensor.clone();
                if tensor.dtype() == DType::F32 {
                    tensor.map_inplace(|v| v * executable.scale);
                }
                tensor
            })
            .collect();
        Ok(StagedOutput::values(LeafValues::new(transformed)))
    }
}
