use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use treestage::{split, Leaf, StagedFn};
use treestage_testing::{fixtures, RecordingCompiler};

#[test]
fn repeated_runs_compile_once_per_definition() -> anyhow::Result<()> {
    let compiler = Arc::new(RecordingCompiler::new("staged-compile-once"));
    let staged = StagedFn::new(Arc::clone(&compiler));

    let (def, mut values) = split(&fixtures::train_state(3)?)?;
    for _ in 0..4 {
        values = staged.run(&def, &values)?.values;
    }

    assert_eq!(compiler.compile_count(), 1);
    assert_eq!(compiler.last_def_or_panic(), def);
    let stats = staged.cache_stats();
    assert_eq!(stats.misses, 1, "first run should compile");
    assert_eq!(stats.hits, 3, "subsequent runs should reuse the executable");
    Ok(())
}

#[test]
fn misaligned_values_never_reach_the_compiler() -> anyhow::Result<()> {
    let compiler = Arc::new(RecordingCompiler::new("staged-misaligned-input"));
    let staged = StagedFn::new(Arc::clone(&compiler));

    let (def, values) = split(&fixtures::train_state(19)?)?;
    let mut short = values.as_slice().to_vec();
    short.pop();

    let err = staged.run(&def, &short.into()).unwrap_err();
    assert!(
        err.to_string().contains("length mismatch"),
        "unexpected error: {err}"
    );
    assert_eq!(
        compiler.compile_count(),
        0,
        "validation failures must short-circuit before compilation"
    );
    Ok(())
}

#[test]
fn run_graph_updates_live_objects_in_place() -> anyhow::Result<()> {
    let compiler = Arc::new(RecordingCompiler::scaling("staged-run-graph", 2.0));
    let staged = StagedFn::new(Arc::clone(&compiler));

    let mut rng = StdRng::seed_from_u64(8);
    let model = fixtures::tied_model(&mut rng)?;
    let before = model
        .child("embed")
        .and_then(|embed| embed.leaf("weight"))
        .expect("embedding has a weight")
        .value();

    staged.run_graph(&model)?;
    staged.run_graph(&model)?;

    let embed_weight = model
        .child("embed")
        .and_then(|embed| embed.leaf("weight"))
        .expect("embedding has a weight");
    let head_weight = model
        .child("head")
        .and_then(|head| head.leaf("weight"))
        .expect("head has a weight");
    assert!(
        Leaf::ptr_eq(&embed_weight, &head_weight),
        "in-place updates must not break weight tying"
    );
    let after = embed_weight.value();
    for (x, y) in before.data().iter().zip(after.data()) {
        assert!((x * 4.0 - y).abs() < 1e-6);
    }

    // Updates kept the structure, so the second call reused the executable.
    assert_eq!(compiler.compile_count(), 1);
    Ok(())
}

#[test]
fn evicted_definitions_fall_back_to_the_shared_cache() -> anyhow::Result<()> {
    let compiler = Arc::new(RecordingCompiler::new("staged-eviction"));
    let staged = StagedFn::with_capacity(Arc::clone(&compiler), 1);

    let (def_a, values_a) = split(&fixtures::train_state(1)?)?;
    let mut rng = StdRng::seed_from_u64(2);
    let (def_b, values_b) = split(&fixtures::tied_model(&mut rng)?)?;
    assert_ne!(def_a.fingerprint(), def_b.fingerprint());

    staged.run(&def_a, &values_a)?;
    staged.run(&def_b, &values_b)?;
    staged.run(&def_a, &values_a)?;

    // `def_a` was evicted from the per-function cache by `def_b`, but the
    // process-wide cache still had its executable.
    assert_eq!(compiler.compile_count(), 2);
    let stats = staged.cache_stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.shared_hits, 1);
    assert_eq!(stats.hits, 0);
    Ok(())
}

#[test]
fn identity_compiler_round_trips_values() -> anyhow::Result<()> {
    let staged = StagedFn::new(Arc::new(RecordingCompiler::new("staged-identity")));

    let state = fixtures::train_state(37)?;
    let (def, values) = split(&state)?;
    let output = staged.run(&def, &values)?;
    assert!(output.def.is_none());
    assert_eq!(staged.compiler().compile_count(), 1);
    for (a, b) in values.iter().zip(output.values.iter()) {
        assert_eq!(a.data(), b.data());
    }

    // Applying the identity output leaves the live graph unchanged.
    treestage::update(&state, &output.values)?;
    let (def_after, _) = split(&state)?;
    assert_eq!(def, def_after);
    Ok(())
}

/// Compiler that discards the input structure and emits a canned single-leaf
/// summary graph, exercising structure-changing outputs.
struct PruningCompiler;

impl treestage::PortableCompiler for PruningCompiler {
    type Executable = ();

    fn compiler_name(&self) -> &str {
        "staged-pruning"
    }

    fn compile(&self, _def: &treestage::GraphDef) -> treestage::CompilerResult<()> {
        Ok(())
    }

    fn execute(
        &self,
        _executable: &(),
        _values: &treestage::LeafValues,
    ) -> treestage::CompilerResult<treestage::StagedOutput> {
        let summary = treestage::Object::new("summary");
        summary
            .set_leaf(
                "loss",
                Leaf::param(treestage::Tensor::zeros(treestage::Shape::new([1]))),
            )
            .map_err(|err| treestage::CompilerError::execution(err.to_string()))?;
        let (def, values) =
            split(&summary).map_err(|err| treestage::CompilerError::execution(err.to_string()))?;
        Ok(treestage::StagedOutput::with_def(values, def))
    }
}

#[test]
fn structure_changing_outputs_carry_their_own_definition() -> anyhow::Result<()> {
    let staged = StagedFn::new(Arc::new(PruningCompiler));
    let state = fixtures::train_state(61)?;
    let (def, values) = split(&state)?;

    let output = staged.run(&def, &values)?;
    let new_def = output.def.expect("pruning changes the structure");
    assert_ne!(def.fingerprint(), new_def.fingerprint());
    assert_eq!(new_def.num_leaves(), output.values.len());

    // The one-shot driver cannot apply a structure change in place.
    let err = staged.run_graph(&state).unwrap_err();
    assert!(
        err.to_string().contains("changed the graph structure"),
        "unexpected error: {err}"
    );
    Ok(())
}

/// Compiler that rejects every definition, exercising the compile error path.
struct RejectingCompiler;

impl treestage::PortableCompiler for RejectingCompiler {
    type Executable = ();

    fn compiler_name(&self) -> &str {
        "staged-rejecting"
    }

    fn compile(&self, def: &treestage::GraphDef) -> treestage::CompilerResult<()> {
        Err(treestage::CompilerError::compile(format!(
            "kind '{}' is not supported",
            def.root().kind
        )))
    }

    fn execute(
        &self,
        _executable: &(),
        _values: &treestage::LeafValues,
    ) -> treestage::CompilerResult<treestage::StagedOutput> {
        unreachable!("rejecting compiler never produces an executable")
    }
}

#[test]
fn compile_failures_surface_to_the_caller() -> anyhow::Result<()> {
    let staged = StagedFn::new(Arc::new(RejectingCompiler));
    let state = fixtures::train_state(67)?;
    let (def, values) = split(&state)?;

    let err = staged.run(&def, &values).unwrap_err();
    assert!(
        err.to_string().contains("compilation failed"),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("train_state"));
    Ok(())
}
