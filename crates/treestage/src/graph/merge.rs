//! Raising a structural definition plus values back into a live graph.

use crate::error::StageResult;
use crate::graph::def::{GraphDef, SlotBinding};
use crate::graph::object::{Field, Leaf, Object};
use crate::graph::values::LeafValues;

/// Reconstructs a live graph from a definition and a matching values
/// collection.
///
/// The values are checked against the definition first (count, then per-leaf
/// dtype/shape) and nothing is built on mismatch. Construction is two-phase:
/// all object shells are created before any slot is wired, so back-references
/// — including cycle edges pointing at an ancestor — resolve to an existing
/// handle. Aliased slots share one handle in the result, restoring the
/// original topology.
pub fn merge(def: &GraphDef, values: &LeafValues) -> StageResult<Object> {
    def.check_values(values)?;

    let leaves: Vec<Leaf> = def
        .leaves()
        .iter()
        .zip(values.as_slice())
        .map(|(leaf_def, tensor)| Leaf::new(tensor.clone(), leaf_def.role))
        .collect();

    let objects: Vec<Object> = def
        .nodes()
        .iter()
        .map(|node| {
            let object = Object::new(node.kind.clone());
            for (name, value) in &node.statics {
                object.insert_field_unchecked(name, Field::Static(value.clone()));
            }
            object
        })
        .collect();

    for (node, object) in def.nodes().iter().zip(&objects) {
        for slot in &node.slots {
            let field = match slot.binding {
                SlotBinding::Leaf(i) | SlotBinding::LeafAlias(i) => {
                    Field::Leaf(leaves[i].clone())
                }
                SlotBinding::Node(i) | SlotBinding::NodeAlias(i) => {
                    Field::Child(objects[i].clone())
                }
            };
            object.insert_field_unchecked(&slot.name, field);
        }
    }

    Ok(objects
        .into_iter()
        .next()
        .expect("validated definition has a root node"))
}
