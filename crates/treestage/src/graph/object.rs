//! Live object handles making up a mutable state tree.
//!
//! Objects and leaves are cheap clonable handles; cloning shares the
//! underlying state, and pointer identity is what split/merge preserve as
//! "the same object reachable through two parents".

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::{Tensor, TensorSpec};

/// Role attached to a dynamic leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LeafRole {
    /// Trainable parameter.
    Param,
    /// Non-trainable state such as optimizer moments or normalization stats.
    Buffer,
}

/// Static configuration value carried by an object.
///
/// Statics are part of the structural definition, so they must hash and
/// compare exactly; floats go through their bit pattern for that reason.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StaticValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for StaticValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StaticValue::Bool(a), StaticValue::Bool(b)) => a == b,
            (StaticValue::Int(a), StaticValue::Int(b)) => a == b,
            (StaticValue::Float(a), StaticValue::Float(b)) => a.to_bits() == b.to_bits(),
            (StaticValue::Str(a), StaticValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StaticValue {}

impl Hash for StaticValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            StaticValue::Bool(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            StaticValue::Int(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            StaticValue::Float(v) => {
                state.write_u8(2);
                v.to_bits().hash(state);
            }
            StaticValue::Str(v) => {
                state.write_u8(3);
                v.hash(state);
            }
        }
    }
}

impl From<bool> for StaticValue {
    fn from(value: bool) -> Self {
        StaticValue::Bool(value)
    }
}

impl From<i64> for StaticValue {
    fn from(value: i64) -> Self {
        StaticValue::Int(value)
    }
}

impl From<f64> for StaticValue {
    fn from(value: f64) -> Self {
        StaticValue::Float(value)
    }
}

impl From<&str> for StaticValue {
    fn from(value: &str) -> Self {
        StaticValue::Str(value.to_string())
    }
}

impl From<String> for StaticValue {
    fn from(value: String) -> Self {
        StaticValue::Str(value)
    }
}

struct LeafInner {
    value: Tensor,
    role: LeafRole,
}

/// Shared handle to a dynamic tensor leaf.
///
/// Cloning shares state: a model parameter and the optimizer slot pointing at
/// it are two clones of one `Leaf`.
pub struct Leaf {
    inner: Arc<Mutex<LeafInner>>,
}

impl Leaf {
    pub fn new(value: Tensor, role: LeafRole) -> Self {
        Leaf {
            inner: Arc::new(Mutex::new(LeafInner { value, role })),
        }
    }

    pub fn param(value: Tensor) -> Self {
        Leaf::new(value, LeafRole::Param)
    }

    pub fn buffer(value: Tensor) -> Self {
        Leaf::new(value, LeafRole::Buffer)
    }

    /// Snapshot of the current tensor value.
    pub fn value(&self) -> Tensor {
        self.inner.lock().expect("leaf state poisoned").value.clone()
    }

    /// Structural spec of the current value.
    pub fn spec(&self) -> TensorSpec {
        self.inner.lock().expect("leaf state poisoned").value.spec()
    }

    pub fn role(&self) -> LeafRole {
        self.inner.lock().expect("leaf state poisoned").role
    }

    /// Overwrites the stored tensor. Replacing a value with a different
    /// dtype or shape changes the structural definition of every graph this
    /// leaf participates in; `update` refuses to do that, this setter does
    /// not.
    pub fn set_value(&self, value: Tensor) {
        self.inner.lock().expect("leaf state poisoned").value = value;
    }

    /// Returns `true` when both handles share the same underlying leaf.
    pub fn ptr_eq(a: &Leaf, b: &Leaf) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl Clone for Leaf {
    fn clone(&self) -> Self {
        Leaf {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("leaf state poisoned");
        f.debug_struct("Leaf")
            .field("role", &inner.role)
            .field("spec", &inner.value.spec())
            .finish()
    }
}

/// Type-erased host value that the structural classification cannot stage.
///
/// Opaque fields are legal on live objects (closures, host RNGs, debug
/// sinks), but `split` reports them as a classification error when asked to
/// stage a graph containing one.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        OpaqueValue {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A single named field of an object.
#[derive(Clone, Debug)]
pub enum Field {
    Static(StaticValue),
    Leaf(Leaf),
    Child(Object),
    Opaque(OpaqueValue),
}

struct ObjectInner {
    kind: String,
    fields: BTreeMap<String, Field>,
}

/// Shared handle to a live stateful object.
pub struct Object {
    inner: Arc<Mutex<ObjectInner>>,
}

impl Object {
    pub fn new(kind: impl Into<String>) -> Self {
        Object {
            inner: Arc::new(Mutex::new(ObjectInner {
                kind: kind.into(),
                fields: BTreeMap::new(),
            })),
        }
    }

    pub fn kind(&self) -> String {
        self.inner.lock().expect("object state poisoned").kind.clone()
    }

    /// Sets a static configuration field, replacing any previous binding.
    pub fn set_static(&self, name: &str, value: impl Into<StaticValue>) -> Result<()> {
        validate_field_name(name)?;
        self.insert_field_unchecked(name, Field::Static(value.into()));
        Ok(())
    }

    /// Sets a dynamic leaf field, replacing any previous binding.
    pub fn set_leaf(&self, name: &str, leaf: Leaf) -> Result<()> {
        validate_field_name(name)?;
        self.insert_field_unchecked(name, Field::Leaf(leaf));
        Ok(())
    }

    /// Sets a child-object field. The handle is shared, not copied, so the
    /// same child may be attached under several parents (or to itself).
    pub fn set_child(&self, name: &str, child: &Object) -> Result<()> {
        validate_field_name(name)?;
        self.insert_field_unchecked(name, Field::Child(child.clone()));
        Ok(())
    }

    /// Sets an opaque host-value field.
    pub fn set_opaque(&self, name: &str, value: OpaqueValue) -> Result<()> {
        validate_field_name(name)?;
        self.insert_field_unchecked(name, Field::Opaque(value));
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        self.inner
            .lock()
            .expect("object state poisoned")
            .fields
            .get(name)
            .cloned()
    }

    pub fn leaf(&self, name: &str) -> Option<Leaf> {
        match self.field(name) {
            Some(Field::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<Object> {
        match self.field(name) {
            Some(Field::Child(child)) => Some(child),
            _ => None,
        }
    }

    pub fn static_value(&self, name: &str) -> Option<StaticValue> {
        match self.field(name) {
            Some(Field::Static(value)) => Some(value),
            _ => None,
        }
    }

    /// Ordered snapshot of all fields. The lock is released before the
    /// snapshot is returned, so callers may recurse into children freely
    /// even when the graph contains reference cycles.
    pub fn fields(&self) -> Vec<(String, Field)> {
        self.inner
            .lock()
            .expect("object state poisoned")
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.clone()))
            .collect()
    }

    /// Returns `true` when both handles share the same underlying object.
    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn insert_field_unchecked(&self, name: &str, field: Field) {
        self.inner
            .lock()
            .expect("object state poisoned")
            .fields
            .insert(name.to_string(), field);
    }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        Object {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: recursing into children would loop on cycles.
        let inner = self.inner.lock().expect("object state poisoned");
        let names: Vec<&str> = inner.fields.keys().map(String::as_str).collect();
        f.debug_struct("Object")
            .field("kind", &inner.kind)
            .field("fields", &names)
            .finish()
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "field names must be non-empty");
    ensure!(
        !name.contains('.'),
        "field names must not contain '.', got '{name}'"
    );
    ensure!(name.is_ascii(), "field names must be ASCII, got '{name}'");
    Ok(())
}
