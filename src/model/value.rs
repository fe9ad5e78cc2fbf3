//! Value type - a node of a schema-less state tree
//!
//! Containers are shared handles: cloning a [`Value`] clones the handle, not
//! the contents, so two values can point at the same allocation. That
//! allocation identity is what reconciliation preserves.
//!
//! Handles also allow in-place mutation, which means callers can build
//! aliased (diamond) and even cyclic graphs. Everything in this module that
//! walks a tree guards against cycles on its current path.

use super::path::{Path, PathSegment};
use crate::{Error, Result};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a container (or opaque leaf) allocation
///
/// Only meaningful while the allocation is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Dynamic type tag of a value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
    Opaque,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
            ValueKind::Opaque => "opaque",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Sequence | ValueKind::Mapping)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of values behind a shared handle
#[derive(Clone, Default)]
pub struct Sequence(Arc<RwLock<Vec<Value>>>);

impl Sequence {
    pub fn new(items: Vec<Value>) -> Self {
        Sequence(Arc::new(RwLock::new(items)))
    }

    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as usize)
    }

    /// Same allocation?
    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read access to the items
    ///
    /// Takes a recursive read lock, so a sequence reachable twice in one
    /// walk can be read again while an outer guard is still held.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read_recursive()
    }

    /// Write access to the items
    ///
    /// Must not be called while a read guard on the same sequence is held
    /// by the current thread.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.0.write()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.write().push(value);
    }

    /// Replace the item at `index`, returning the old one
    ///
    /// Returns `None` (and stores nothing) when `index` is out of bounds.
    pub fn set(&self, index: usize, value: Value) -> Option<Value> {
        let mut items = self.write();
        items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }
}

/// String-keyed map of values behind a shared handle
///
/// Iteration follows insertion order.
#[derive(Clone, Default)]
pub struct Mapping(Arc<RwLock<IndexMap<String, Value>>>);

impl Mapping {
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Mapping(Arc::new(RwLock::new(entries)))
    }

    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as usize)
    }

    /// Same allocation?
    pub fn ptr_eq(&self, other: &Mapping) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read access to the entries (recursive read lock, see [`Sequence::read`])
    pub fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Value>> {
        self.0.read_recursive()
    }

    /// Write access to the entries
    pub fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Value>> {
        self.0.write()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Insert or overwrite; an existing key keeps its position
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.write().insert(key.into(), value)
    }

    /// Remove a key, preserving the order of the remaining entries
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().shift_remove(key)
    }
}

/// Leaf carrying an arbitrary payload, compared by identity only
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Opaque(Arc::new(payload))
    }

    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        self.id() == other.id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

/// A node of a state tree
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Sequence(Sequence),
    Mapping(Mapping),
    Opaque(Opaque),
}

impl Value {
    /// Build a sequence value from items
    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Sequence(Sequence::new(items.into_iter().collect()))
    }

    /// Build a mapping value; later duplicates of a key overwrite earlier ones
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Mapping(Mapping::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn opaque<T: Any + Send + Sync>(payload: T) -> Self {
        Value::Opaque(Opaque::new(payload))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Sequence(_) => ValueKind::Sequence,
            Value::Mapping(_) => ValueKind::Mapping,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Allocation identity of a container; `None` for everything else
    pub fn container_id(&self) -> Option<NodeId> {
        match self {
            Value::Sequence(seq) => Some(seq.id()),
            Value::Mapping(map) => Some(map.id()),
            _ => None,
        }
    }

    /// Reference identity
    ///
    /// Containers and opaque leaves are the same when they share an
    /// allocation. Primitives are the same when their values are equal.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => number_eq(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
            (Value::Mapping(a), Value::Mapping(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Child of a mapping by key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Child of a sequence by index
    pub fn at(&self, index: usize) -> Option<Value> {
        self.as_sequence().and_then(|seq| seq.get(index))
    }

    /// Subtree at `path`, if every step exists
    pub fn pointer(&self, path: &Path) -> Option<Value> {
        let mut current = self.clone();
        for segment in path.segments() {
            current = match segment {
                PathSegment::Key(key) => current.get(key)?,
                PathSegment::Index(index) => current.at(*index)?,
            };
        }
        Some(current)
    }

    /// Copy into fresh allocations
    ///
    /// The copy is deeply equal to `self` but shares no container with it.
    /// Aliasing and cycles are reproduced within the copy. Opaque leaves
    /// keep their identity since their payload cannot be cloned.
    pub fn deep_clone(&self) -> Value {
        let mut copies = HashMap::new();
        deep_clone_inner(self, &mut copies)
    }

    /// Convert to a `serde_json::Value`
    ///
    /// Fails on cycles and on opaque leaves.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut ancestors = Vec::new();
        let mut path = Path::root();
        to_json_inner(self, &mut ancestors, &mut path)
    }
}

/// Exact numeric value of a JSON number
///
/// Integral floats collapse onto the integer they represent, so `1` and
/// `1.0` share a key while `9007199254740993` and `9007199254740992.0` do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NumberKey {
    Int(i128),
    Float(u64),
}

impl NumberKey {
    pub(crate) fn of(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            return NumberKey::Int(i128::from(i));
        }
        if let Some(u) = n.as_u64() {
            return NumberKey::Int(i128::from(u));
        }
        let f = n.as_f64().unwrap_or_default();
        // Every integral f64 below 2^127 in magnitude converts to i128 exactly.
        if f.fract() == 0.0 && f.abs() < 2f64.powi(127) {
            NumberKey::Int(f as i128)
        } else {
            NumberKey::Float(f.to_bits())
        }
    }
}

/// JSON numbers compare by exact numeric value
pub(crate) fn number_eq(a: &Number, b: &Number) -> bool {
    NumberKey::of(a) == NumberKey::of(b)
}

fn deep_clone_inner(value: &Value, copies: &mut HashMap<NodeId, Value>) -> Value {
    match value {
        Value::Sequence(seq) => {
            if let Some(copy) = copies.get(&seq.id()) {
                return copy.clone();
            }
            let copy = Sequence::default();
            copies.insert(seq.id(), Value::Sequence(copy.clone()));
            let items: Vec<Value> = seq
                .read()
                .iter()
                .map(|item| deep_clone_inner(item, copies))
                .collect();
            *copy.write() = items;
            Value::Sequence(copy)
        }
        Value::Mapping(map) => {
            if let Some(copy) = copies.get(&map.id()) {
                return copy.clone();
            }
            let copy = Mapping::default();
            copies.insert(map.id(), Value::Mapping(copy.clone()));
            let entries: IndexMap<String, Value> = map
                .read()
                .iter()
                .map(|(key, item)| (key.clone(), deep_clone_inner(item, copies)))
                .collect();
            *copy.write() = entries;
            Value::Mapping(copy)
        }
        Value::String(s) => Value::String(Arc::from(&**s)),
        other => other.clone(),
    }
}

fn to_json_inner(
    value: &Value,
    ancestors: &mut Vec<NodeId>,
    path: &mut Path,
) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Sequence(seq) => {
            if ancestors.contains(&seq.id()) {
                return Err(Error::Cyclic {
                    path: path.to_string(),
                });
            }
            ancestors.push(seq.id());
            let items = seq.read();
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(index);
                let converted = to_json_inner(item, ancestors, path);
                path.pop();
                out.push(converted?);
            }
            ancestors.pop();
            serde_json::Value::Array(out)
        }
        Value::Mapping(map) => {
            if ancestors.contains(&map.id()) {
                return Err(Error::Cyclic {
                    path: path.to_string(),
                });
            }
            ancestors.push(map.id());
            let entries = map.read();
            let mut out = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries.iter() {
                path.push(key.as_str());
                let converted = to_json_inner(item, ancestors, path);
                path.pop();
                out.insert(key.clone(), converted?);
            }
            ancestors.pop();
            serde_json::Value::Object(out)
        }
        Value::Opaque(_) => {
            return Err(Error::Unrepresentable {
                kind: ValueKind::Opaque.to_string(),
            })
        }
    })
}

// Structural equality. A pair of containers met again on the current
// comparison path is taken as equal, which keeps cyclic inputs finite.
fn deep_eq(a: &Value, b: &Value, path: &mut Vec<(NodeId, NodeId)>) -> bool {
    if a.is_same(b) {
        return true;
    }
    match (a, b) {
        (Value::Sequence(x), Value::Sequence(y)) => {
            let pair = (x.id(), y.id());
            if path.contains(&pair) {
                return true;
            }
            let (xs, ys) = (x.read(), y.read());
            if xs.len() != ys.len() {
                return false;
            }
            path.push(pair);
            let equal = xs.iter().zip(ys.iter()).all(|(l, r)| deep_eq(l, r, path));
            path.pop();
            equal
        }
        (Value::Mapping(x), Value::Mapping(y)) => {
            let pair = (x.id(), y.id());
            if path.contains(&pair) {
                return true;
            }
            let (xs, ys) = (x.read(), y.read());
            if xs.len() != ys.len() {
                return false;
            }
            path.push(pair);
            let equal = xs
                .iter()
                .all(|(key, l)| ys.get(key).is_some_and(|r| deep_eq(l, r, path)));
            path.pop();
            equal
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        deep_eq(self, other, &mut Vec::new())
    }
}

struct Guarded<'a> {
    value: &'a Value,
    ancestors: &'a RefCell<Vec<NodeId>>,
}

impl fmt::Debug for Guarded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ancestors = self.ancestors;
        match self.value {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Sequence(seq) => {
                if ancestors.borrow().contains(&seq.id()) {
                    return f.write_str("<cycle>");
                }
                ancestors.borrow_mut().push(seq.id());
                let items = seq.read();
                let result = f
                    .debug_list()
                    .entries(items.iter().map(|value| Guarded { value, ancestors }))
                    .finish();
                ancestors.borrow_mut().pop();
                result
            }
            Value::Mapping(map) => {
                if ancestors.borrow().contains(&map.id()) {
                    return f.write_str("<cycle>");
                }
                ancestors.borrow_mut().push(map.id());
                let entries = map.read();
                let result = f
                    .debug_map()
                    .entries(
                        entries
                            .iter()
                            .map(|(key, value)| (key, Guarded { value, ancestors })),
                    )
                    .finish();
                ancestors.borrow_mut().pop();
                result
            }
            Value::Opaque(opaque) => write!(f, "Opaque({:#x})", opaque.id().as_usize()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ancestors = RefCell::new(Vec::new());
        let guarded = Guarded {
            value: self,
            ancestors: &ancestors,
        };
        fmt::Debug::fmt(&guarded, f)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Sequence(self.clone()), f)
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Mapping(self.clone()), f)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:#x})", self.id().as_usize())
    }
}

/// Compact JSON when representable, debug form otherwise
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(Arc::from(s)),
            serde_json::Value::Array(items) => Value::sequence(items.into_iter().map(Value::from)),
            serde_json::Value::Object(entries) => {
                Value::mapping(entries.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

/// Non-finite floats have no JSON form and become `Null`
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(Sequence::new(items))
    }
}

impl From<Sequence> for Value {
    fn from(seq: Sequence) -> Self {
        Value::Sequence(seq)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Mapping(map)
    }
}
