//! Shared graph fixtures exercising the topologies staging has to handle:
//! plain nesting, tied leaves, and an optimizer aliasing a whole model.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use treestage::{Leaf, Object, Shape, Tensor};

/// Fully connected layer object with `weight`/`bias` parameter leaves.
pub fn linear(rng: &mut StdRng, in_features: usize, out_features: usize) -> Result<Object> {
    let layer = Object::new("linear");
    layer.set_static("in_features", in_features as i64)?;
    layer.set_static("out_features", out_features as i64)?;
    layer.set_leaf(
        "weight",
        Leaf::param(Tensor::randn(
            Shape::new([in_features, out_features]),
            0.02,
            rng,
        )),
    )?;
    layer.set_leaf("bias", Leaf::param(Tensor::zeros(Shape::new([out_features]))))?;
    Ok(layer)
}

/// Two-layer model with untied parameters.
pub fn mlp(rng: &mut StdRng) -> Result<Object> {
    let model = Object::new("mlp");
    model.set_child("fc1", &linear(rng, 4, 8)?)?;
    model.set_child("fc2", &linear(rng, 8, 2)?)?;
    Ok(model)
}

/// Language-model-style graph whose embedding and output head share one
/// weight leaf.
pub fn tied_model(rng: &mut StdRng) -> Result<Object> {
    let weight = Leaf::param(Tensor::randn(Shape::new([8, 4]), 0.02, rng));
    let embed = Object::new("embedding");
    embed.set_leaf("weight", weight.clone())?;
    let head = Object::new("output_head");
    head.set_leaf("weight", weight)?;

    let model = Object::new("tied_lm");
    model.set_child("embed", &embed)?;
    model.set_child("head", &head)?;
    Ok(model)
}

/// Root object holding a model and an SGD optimizer whose `target` aliases
/// the model subtree, plus momentum buffers for the two weight matrices.
pub fn train_state(seed: u64) -> Result<Object> {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = mlp(&mut rng)?;

    let optim = Object::new("sgd");
    optim.set_static("lr", 0.1_f64)?;
    optim.set_child("target", &model)?;
    optim.set_leaf("m_fc1_weight", Leaf::buffer(Tensor::zeros(Shape::new([4, 8]))))?;
    optim.set_leaf("m_fc2_weight", Leaf::buffer(Tensor::zeros(Shape::new([8, 2]))))?;

    let state = Object::new("train_state");
    state.set_child("model", &model)?;
    state.set_child("optim", &optim)?;
    Ok(state)
}
