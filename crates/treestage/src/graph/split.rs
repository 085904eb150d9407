//! Lowering a live state tree into its structural definition plus values.

use std::collections::HashMap;

use crate::error::{StageError, StageResult};
use crate::graph::def::{GraphDef, LeafDef, NodeDef, SlotBinding, SlotDef};
use crate::graph::object::{Field, Object};
use crate::graph::path::PathStack;
use crate::graph::values::LeafValues;
use crate::tensor::Tensor;

/// Decomposes a live graph into a [`GraphDef`] and a [`LeafValues`]
/// collection in a single traversal.
///
/// The traversal is deterministic (fields in name order, independent of
/// insertion order) and pure: the input graph is only read. Shared objects
/// and leaves are canonicalized at their first occurrence; later occurrences
/// become back-references, so `merge` can restore the sharing instead of
/// duplicating state. A field holding an opaque host value fails with
/// [`StageError::UnsupportedField`] naming the offending path.
pub fn split(root: &Object) -> StageResult<(GraphDef, LeafValues)> {
    let mut splitter = Splitter::default();
    splitter.visit_object(root)?;
    let Splitter {
        nodes,
        leaves,
        values,
        ..
    } = splitter;
    let def = GraphDef::from_parts(nodes, leaves)?;
    Ok((def, LeafValues::new(values)))
}

#[derive(Default)]
struct Splitter {
    nodes: Vec<NodeDef>,
    leaves: Vec<LeafDef>,
    values: Vec<Tensor>,
    node_index: HashMap<usize, usize>,
    leaf_index: HashMap<usize, usize>,
    path: PathStack,
}

impl Splitter {
    fn visit_object(&mut self, object: &Object) -> StageResult<usize> {
        // Register before descending so cycle edges resolve to an alias of
        // an ancestor instead of recursing forever.
        let index = self.nodes.len();
        self.node_index.insert(object.address(), index);
        self.nodes.push(NodeDef {
            kind: object.kind(),
            statics: Vec::new(),
            slots: Vec::new(),
        });

        let mut statics = Vec::new();
        let mut slots = Vec::new();
        // `fields` snapshots under the object lock and releases it, so the
        // recursion below never re-enters a held lock.
        for (name, field) in object.fields() {
            match field {
                Field::Static(value) => statics.push((name, value)),
                Field::Leaf(leaf) => {
                    let binding = match self.leaf_index.get(&leaf.address()) {
                        Some(&canonical) => SlotBinding::LeafAlias(canonical),
                        None => {
                            let canonical = self.leaves.len();
                            self.leaf_index.insert(leaf.address(), canonical);
                            let value = leaf.value();
                            self.leaves.push(LeafDef {
                                path: self.path.join(&name),
                                role: leaf.role(),
                                spec: value.spec(),
                            });
                            self.values.push(value);
                            SlotBinding::Leaf(canonical)
                        }
                    };
                    slots.push(SlotDef { name, binding });
                }
                Field::Child(child) => {
                    let binding = match self.node_index.get(&child.address()) {
                        Some(&canonical) => SlotBinding::NodeAlias(canonical),
                        None => {
                            self.path.push(&name);
                            let canonical = self.visit_object(&child)?;
                            self.path.pop();
                            SlotBinding::Node(canonical)
                        }
                    };
                    slots.push(SlotDef { name, binding });
                }
                Field::Opaque(opaque) => {
                    return Err(StageError::UnsupportedField {
                        path: self.path.join(&name),
                        type_name: opaque.type_name().to_string(),
                    });
                }
            }
        }

        self.nodes[index].statics = statics;
        self.nodes[index].slots = slots;
        Ok(index)
    }
}
