//! Immutable structural definitions of state trees.
//!
//! A [`GraphDef`] captures everything about a graph except its leaf payloads:
//! object kinds, static fields, field layout, leaf specs, and the aliasing
//! topology. Sharing is encoded as an indexed table of canonical nodes plus
//! integer back-references, which keeps the encoding order-independent and
//! cycle-safe. Two graphs with identical structure but different leaf values
//! produce identical definitions, so the fingerprint can key compilation
//! caches across invocations.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};
use crate::graph::object::{LeafRole, StaticValue};
use crate::graph::values::LeafValues;
use crate::hashing::{fnv1a_hash, stable_id};
use crate::tensor::TensorSpec;

/// Binding of a named slot inside a node definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotBinding {
    /// First (canonical) occurrence of a dynamic leaf, by leaf-table index.
    Leaf(usize),
    /// Back-reference to a leaf canonicalized earlier in traversal order.
    LeafAlias(usize),
    /// First (canonical) occurrence of a child node, by node-table index.
    Node(usize),
    /// Back-reference to a node canonicalized earlier (shared child or
    /// cycle edge).
    NodeAlias(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub binding: SlotBinding,
}

/// Structural record of one object: its kind, static fields, and slots, all
/// in name order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    pub kind: String,
    pub statics: Vec<(String, StaticValue)>,
    pub slots: Vec<SlotDef>,
}

/// Structural record of one canonical leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafDef {
    /// Dotted path of the first occurrence, e.g. `model.fc1.weight`.
    pub path: String,
    pub role: LeafRole,
    pub spec: TensorSpec,
}

#[derive(Serialize, Deserialize)]
struct GraphDefData {
    nodes: Vec<NodeDef>,
    leaves: Vec<LeafDef>,
}

#[derive(Serialize)]
struct GraphDefDataRef<'a> {
    nodes: &'a [NodeDef],
    leaves: &'a [LeafDef],
}

/// Immutable, hashable structural definition of a state tree. Node 0 is the
/// root.
#[derive(Clone, Debug)]
pub struct GraphDef {
    nodes: Vec<NodeDef>,
    leaves: Vec<LeafDef>,
    fingerprint: u64,
    stable_id: u128,
}

impl GraphDef {
    /// Builds a definition from raw tables, validating the encoding and
    /// computing the content hashes. This is how deserialized definitions
    /// re-enter the crate, so validation here is load-bearing.
    pub fn from_parts(nodes: Vec<NodeDef>, leaves: Vec<LeafDef>) -> StageResult<Self> {
        validate(&nodes, &leaves)?;
        let bytes = bincode::serialize(&GraphDefDataRef {
            nodes: &nodes,
            leaves: &leaves,
        })
        .map_err(|err| StageError::MalformedDef {
            reason: format!("definition serialization failed: {err}"),
        })?;
        Ok(GraphDef {
            fingerprint: fnv1a_hash(&bytes),
            stable_id: stable_id(&bytes),
            nodes,
            leaves,
        })
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    pub fn leaves(&self) -> &[LeafDef] {
        &self.leaves
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn root(&self) -> &NodeDef {
        &self.nodes[0]
    }

    /// Structure-only content hash; the compilation cache key.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Collision-resistant 128-bit identity for persistent indexes.
    pub fn stable_id(&self) -> u128 {
        self.stable_id
    }

    /// Index of the canonical leaf registered under `path`, if any.
    pub fn leaf_index(&self, path: &str) -> Option<usize> {
        self.leaves.iter().position(|leaf| leaf.path == path)
    }

    /// Checks a values collection against this definition: one entry per
    /// canonical leaf, each matching the recorded spec.
    pub fn check_values(&self, values: &LeafValues) -> StageResult<()> {
        if values.len() != self.leaves.len() {
            return Err(StageError::LeafCountMismatch {
                expected: self.leaves.len(),
                got: values.len(),
            });
        }
        for (leaf, tensor) in self.leaves.iter().zip(values.as_slice()) {
            let got = tensor.spec();
            if got != leaf.spec {
                return Err(StageError::LeafSpecMismatch {
                    path: leaf.path.clone(),
                    expected: leaf.spec.clone(),
                    got,
                });
            }
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }
}

impl PartialEq for GraphDef {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.leaves == other.leaves
    }
}

impl Eq for GraphDef {}

impl Hash for GraphDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl Serialize for GraphDef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        GraphDefDataRef {
            nodes: &self.nodes,
            leaves: &self.leaves,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GraphDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let data = GraphDefData::deserialize(deserializer)?;
        GraphDef::from_parts(data.nodes, data.leaves).map_err(serde::de::Error::custom)
    }
}

fn malformed(reason: impl Into<String>) -> StageError {
    StageError::MalformedDef {
        reason: reason.into(),
    }
}

fn field_name_ok(name: &str) -> bool {
    !name.is_empty() && name.is_ascii() && !name.contains('.')
}

/// Validates the canonical-plus-back-reference encoding by replaying the
/// traversal that produced it: canonical indices must appear in first-visit
/// order, aliases must point strictly backwards, and every table entry must
/// be reachable from the root.
fn validate(nodes: &[NodeDef], leaves: &[LeafDef]) -> StageResult<()> {
    if nodes.is_empty() {
        return Err(malformed("definition has no nodes"));
    }
    for leaf in leaves {
        if leaf.path.is_empty() {
            return Err(malformed("leaf paths must be non-empty"));
        }
        if leaf.spec.dims.is_empty() {
            return Err(malformed(format!(
                "leaf '{}' has a spec with no dimensions",
                leaf.path
            )));
        }
    }

    let mut next_node = 1usize;
    let mut next_leaf = 0usize;
    walk(nodes, leaves.len(), 0, &mut next_node, &mut next_leaf)?;

    if next_node != nodes.len() {
        return Err(malformed(format!(
            "{} of {} nodes are unreachable from the root",
            nodes.len() - next_node,
            nodes.len()
        )));
    }
    if next_leaf != leaves.len() {
        return Err(malformed(format!(
            "leaf table has {} entries but the nodes bind {}",
            leaves.len(),
            next_leaf
        )));
    }
    Ok(())
}

fn walk(
    nodes: &[NodeDef],
    num_leaves: usize,
    index: usize,
    next_node: &mut usize,
    next_leaf: &mut usize,
) -> StageResult<()> {
    let node = &nodes[index];

    let mut previous: Option<&str> = None;
    for (name, _) in &node.statics {
        if !field_name_ok(name) {
            return Err(malformed(format!("invalid static field name '{name}'")));
        }
        if previous.is_some_and(|prev| prev >= name.as_str()) {
            return Err(malformed(format!(
                "static fields of node {index} are not in strict name order at '{name}'"
            )));
        }
        previous = Some(name.as_str());
    }

    let mut previous: Option<&str> = None;
    for slot in &node.slots {
        let name = slot.name.as_str();
        if !field_name_ok(name) {
            return Err(malformed(format!("invalid slot name '{name}'")));
        }
        if previous.is_some_and(|prev| prev >= name) {
            return Err(malformed(format!(
                "slots of node {index} are not in strict name order at '{name}'"
            )));
        }
        previous = Some(name);
        if node.statics.iter().any(|(static_name, _)| static_name == name) {
            return Err(malformed(format!(
                "node {index} binds '{name}' both as a static and as a slot"
            )));
        }

        match slot.binding {
            SlotBinding::Leaf(i) => {
                if i != *next_leaf {
                    return Err(malformed(format!(
                        "canonical leaf {i} at slot '{name}' is out of traversal order"
                    )));
                }
                if i >= num_leaves {
                    return Err(malformed(format!(
                        "slot '{name}' references leaf {i} beyond the leaf table"
                    )));
                }
                *next_leaf += 1;
            }
            SlotBinding::LeafAlias(i) => {
                if i >= *next_leaf {
                    return Err(malformed(format!(
                        "leaf alias {i} at slot '{name}' precedes its canonical occurrence"
                    )));
                }
            }
            SlotBinding::Node(i) => {
                if i != *next_node {
                    return Err(malformed(format!(
                        "canonical node {i} at slot '{name}' is out of traversal order"
                    )));
                }
                if i >= nodes.len() {
                    return Err(malformed(format!(
                        "slot '{name}' references node {i} beyond the node table"
                    )));
                }
                *next_node += 1;
                walk(nodes, num_leaves, i, next_node, next_leaf)?;
            }
            SlotBinding::NodeAlias(i) => {
                if i >= *next_node {
                    return Err(malformed(format!(
                        "node alias {i} at slot '{name}' precedes its canonical occurrence"
                    )));
                }
            }
        }
    }
    Ok(())
}
