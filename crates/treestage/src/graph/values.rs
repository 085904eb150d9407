//! Flat, positionally keyed leaf-value collections.

use std::fmt;

use crate::tensor::Tensor;

/// Dynamic leaf payloads of a split graph, ordered by canonical leaf index.
///
/// A `LeafValues` on its own is just tensors; pairing it with the
/// [`GraphDef`](crate::graph::GraphDef) that produced it gives each entry a
/// path, a role, and a spec.
#[derive(Clone)]
pub struct LeafValues {
    entries: Vec<Tensor>,
}

impl LeafValues {
    pub fn new(entries: Vec<Tensor>) -> Self {
        LeafValues { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.entries.get(index)
    }

    pub fn as_slice(&self) -> &[Tensor] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Tensor> {
        self.entries
    }
}

impl From<Vec<Tensor>> for LeafValues {
    fn from(entries: Vec<Tensor>) -> Self {
        LeafValues::new(entries)
    }
}

impl fmt::Debug for LeafValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<_> = self.entries.iter().map(Tensor::spec).collect();
        f.debug_struct("LeafValues").field("specs", &specs).finish()
    }
}
