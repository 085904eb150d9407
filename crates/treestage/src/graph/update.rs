//! In-place propagation of computed values onto a live graph.

use std::collections::HashSet;

use crate::error::{StageError, StageResult};
use crate::graph::object::{Field, Leaf, Object};
use crate::graph::path::PathStack;
use crate::graph::values::LeafValues;

/// Overwrites the dynamic leaves of an existing graph with a values
/// collection, without reconstructing any objects.
///
/// The walk mirrors `split` exactly, so the k-th value lands on the k-th
/// canonical leaf. Every entry is validated against the live leaf's current
/// spec before anything is written; a misaligned collection therefore leaves
/// the graph untouched, and an accepted update never changes the graph's
/// structural definition.
pub fn update(root: &Object, values: &LeafValues) -> StageResult<()> {
    let leaves = collect_leaves(root)?;
    if leaves.len() != values.len() {
        return Err(StageError::LeafCountMismatch {
            expected: leaves.len(),
            got: values.len(),
        });
    }
    for ((path, leaf), tensor) in leaves.iter().zip(values.as_slice()) {
        let expected = leaf.spec();
        let got = tensor.spec();
        if got != expected {
            return Err(StageError::LeafSpecMismatch {
                path: path.clone(),
                expected,
                got,
            });
        }
    }
    for ((_, leaf), tensor) in leaves.iter().zip(values.as_slice()) {
        leaf.set_value(tensor.clone());
    }
    Ok(())
}

/// Canonical leaves of a live graph in traversal order, with their paths.
fn collect_leaves(root: &Object) -> StageResult<Vec<(String, Leaf)>> {
    let mut collector = Collector::default();
    collector.visit_object(root)?;
    Ok(collector.leaves)
}

#[derive(Default)]
struct Collector {
    leaves: Vec<(String, Leaf)>,
    seen_nodes: HashSet<usize>,
    seen_leaves: HashSet<usize>,
    path: PathStack,
}

impl Collector {
    fn visit_object(&mut self, object: &Object) -> StageResult<()> {
        if !self.seen_nodes.insert(object.address()) {
            return Ok(());
        }
        for (name, field) in object.fields() {
            match field {
                Field::Static(_) => {}
                Field::Leaf(leaf) => {
                    if self.seen_leaves.insert(leaf.address()) {
                        self.leaves.push((self.path.join(&name), leaf));
                    }
                }
                Field::Child(child) => {
                    self.path.push(&name);
                    self.visit_object(&child)?;
                    self.path.pop();
                }
                Field::Opaque(opaque) => {
                    return Err(StageError::UnsupportedField {
                        path: self.path.join(&name),
                        type_name: opaque.type_name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
