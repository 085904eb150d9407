use treestage::{merge, split, update, LeafValues, Shape, StageError, Tensor};
use treestage_testing::fixtures;

fn scaled(values: &LeafValues, factor: f32) -> LeafValues {
    let entries: Vec<Tensor> = values
        .iter()
        .map(|tensor| {
            let mut tensor = tensor.clone();
            tensor.map_inplace(|v| v * factor);
            tensor
        })
        .collect();
    LeafValues::new(entries)
}

#[test]
fn update_is_equivalent_to_a_fresh_merge() -> anyhow::Result<()> {
    let state = fixtures::train_state(7)?;
    let (def, values_one) = split(&state)?;
    let values_two = scaled(&values_one, 2.0);

    let updated = merge(&def, &values_one)?;
    update(&updated, &values_two)?;
    let merged = merge(&def, &values_two)?;

    let (updated_def, updated_values) = split(&updated)?;
    let (merged_def, merged_values) = split(&merged)?;
    assert_eq!(updated_def, merged_def);
    for (a, b) in updated_values.iter().zip(merged_values.iter()) {
        assert_eq!(a.data(), b.data());
    }
    Ok(())
}

#[test]
fn update_never_changes_the_definition() -> anyhow::Result<()> {
    let state = fixtures::train_state(23)?;
    let (before, values) = split(&state)?;
    update(&state, &scaled(&values, -1.0))?;
    let (after, _) = split(&state)?;
    assert_eq!(before, after);
    assert_eq!(before.fingerprint(), after.fingerprint());
    Ok(())
}

#[test]
fn update_writes_through_aliases_exactly_once() -> anyhow::Result<()> {
    let state = fixtures::train_state(31)?;
    let (_, values) = split(&state)?;
    update(&state, &scaled(&values, 3.0))?;

    // The optimizer's aliased view observes the same write as the model.
    let model_weight = state
        .child("model")
        .and_then(|model| model.child("fc1"))
        .and_then(|fc1| fc1.leaf("weight"))
        .expect("model has fc1.weight");
    let target_weight = state
        .child("optim")
        .and_then(|optim| optim.child("target"))
        .and_then(|target| target.child("fc1"))
        .and_then(|fc1| fc1.leaf("weight"))
        .expect("optimizer target has fc1.weight");
    assert_eq!(model_weight.value().data(), target_weight.value().data());
    Ok(())
}

#[test]
fn misaligned_updates_fail_without_touching_the_graph() -> anyhow::Result<()> {
    let state = fixtures::train_state(41)?;
    let (_, values) = split(&state)?;

    let mut short = values.as_slice().to_vec();
    short.pop();
    let err = update(&state, &short.into()).unwrap_err();
    assert!(
        matches!(err, StageError::LeafCountMismatch { expected: 6, got: 5 }),
        "expected LeafCountMismatch, got {err:?}"
    );

    // First entry is valid but new data; last entry has the wrong shape.
    let mut mixed = values.as_slice().to_vec();
    mixed[0] = Tensor::ones(Shape::new([8]));
    let last = mixed.len() - 1;
    mixed[last] = Tensor::zeros(Shape::new([3, 3]));
    let err = update(&state, &mixed.into()).unwrap_err();
    assert!(
        matches!(err, StageError::LeafSpecMismatch { .. }),
        "expected LeafSpecMismatch, got {err:?}"
    );

    // The valid first entry must not have been written.
    let bias = state
        .child("model")
        .and_then(|model| model.child("fc1"))
        .and_then(|fc1| fc1.leaf("bias"))
        .expect("model has fc1.bias");
    assert_eq!(
        bias.value().data(),
        values.get(0).expect("first canonical leaf").data(),
        "failed update should leave the graph untouched"
    );
    Ok(())
}
