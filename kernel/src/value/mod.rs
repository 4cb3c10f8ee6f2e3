//! Runtime value model: the tagged variant every embeddable program value
//! is expressed in.
//!
//! `Value::clone()` is shallow for records (the clone shares the record).
//! Use [`Value::deep_copy`] or [`DeepCopier`] when a trial needs its own
//! graph: copies preserve internal sharing and cycles but never alias the
//! source.

mod filter;
mod record;

pub use filter::{is_environment_binding, prune_environment};
pub use record::{Record, RecordRef};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// Named bindings (locals, globals, keyword arguments, record fields).
///
/// `BTreeMap` keeps iteration deterministic at every serialization boundary.
pub type Bindings = BTreeMap<String, Value>;

/// A program value.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    List(Vec<Value>),
    /// Unordered collection. Stored as a `Vec`; compared order-insensitively.
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Shared, identity-bearing mutable object.
    Record(RecordRef),
    /// Function, module, class or bound callable. Environment furniture:
    /// never mutated, never compared.
    Callable(CallableRef),
    /// Host value the engine cannot introspect.
    Opaque(OpaqueValue),
}

/// A member of a closed enumeration.
#[derive(Debug, Clone)]
pub struct EnumValue {
    enumeration: Rc<str>,
    members: Rc<[String]>,
    index: usize,
}

impl EnumValue {
    /// Build a member of `enumeration`.
    ///
    /// Returns `None` if `index` is out of range.
    #[must_use]
    pub fn new(enumeration: &str, members: &[&str], index: usize) -> Option<Self> {
        if index >= members.len() {
            return None;
        }
        Some(Self {
            enumeration: Rc::from(enumeration),
            members: members.iter().map(|m| (*m).to_string()).collect(),
            index,
        })
    }

    /// The enumeration's type name.
    #[must_use]
    pub fn enumeration(&self) -> &str {
        &self.enumeration
    }

    /// All member names in declaration order.
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Declaration index of this member.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of this member.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.members[self.index]
    }

    /// Another member of the same enumeration.
    ///
    /// Returns `None` if `index` is out of range.
    #[must_use]
    pub fn with_index(&self, index: usize) -> Option<Self> {
        (index < self.members.len()).then(|| Self {
            enumeration: Rc::clone(&self.enumeration),
            members: Rc::clone(&self.members),
            index,
        })
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.enumeration == other.enumeration
            && self.members == other.members
    }
}

/// What kind of furniture a callable is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Module,
    Class,
    BoundMethod,
}

impl CallableKind {
    #[must_use]
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Module => "module",
            Self::Class => "type",
            Self::BoundMethod => "method",
        }
    }
}

/// Reference to a callable by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableRef {
    pub kind: CallableKind,
    pub name: String,
}

impl CallableRef {
    #[must_use]
    pub fn function(name: &str) -> Self {
        Self {
            kind: CallableKind::Function,
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn module(name: &str) -> Self {
        Self {
            kind: CallableKind::Module,
            name: name.to_string(),
        }
    }
}

/// Contract for host values that can offer a byte-level comparison.
///
/// Host types without an implementation that returns bytes are compared by
/// type tag only.
pub trait HostValue: fmt::Debug {
    /// Stable bytes identifying the value's content, if the host can provide them.
    fn canonical_bytes(&self) -> Option<Vec<u8>> {
        None
    }
}

/// A value the engine cannot look inside.
#[derive(Debug, Clone)]
pub struct OpaqueValue {
    pub type_tag: String,
    host: Option<Rc<dyn HostValue>>,
}

impl OpaqueValue {
    /// An opaque value with no host handle.
    #[must_use]
    pub fn new(type_tag: &str) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            host: None,
        }
    }

    /// An opaque value backed by a host handle.
    #[must_use]
    pub fn with_host(type_tag: &str, host: Rc<dyn HostValue>) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            host: Some(host),
        }
    }

    /// Host-provided canonical bytes, if any.
    #[must_use]
    pub fn canonical_bytes(&self) -> Option<Vec<u8>> {
        self.host.as_ref().and_then(|h| h.canonical_bytes())
    }
}

impl Value {
    /// Convenience constructor for text values.
    #[must_use]
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }

    /// Convenience constructor for a fresh record.
    #[must_use]
    pub fn record(type_name: &str, fields: Vec<(&str, Value)>) -> Self {
        Self::Record(RecordRef::new(
            type_name,
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        ))
    }

    /// Declared type tag used by canonical snapshots.
    #[must_use]
    pub fn type_tag(&self) -> String {
        match self {
            Self::None => "NoneType".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Float(_) => "float".into(),
            Self::Text(_) => "str".into(),
            Self::Bytes(_) => "bytes".into(),
            Self::Enum(e) => e.enumeration().to_string(),
            Self::List(_) => "list".into(),
            Self::Set(_) => "set".into(),
            Self::Map(_) => "dict".into(),
            Self::Record(r) => r.type_name(),
            Self::Callable(c) => c.kind.type_tag().into(),
            Self::Opaque(o) => o.type_tag.clone(),
        }
    }

    /// True for values that expose named or indexed children.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Map(_) | Self::Record(_)
        )
    }

    /// True for functions, modules, classes and bound callables.
    #[must_use]
    pub fn is_furniture(&self) -> bool {
        matches!(self, Self::Callable(_))
    }

    /// Children that belong to program data, keyed as they are addressed
    /// in dotted paths. Furniture children are excluded.
    ///
    /// Children are shallow clones: records inside stay shared.
    #[must_use]
    pub fn children(&self) -> Vec<(String, Value)> {
        match self {
            Self::List(items) | Self::Set(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_furniture())
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            Self::Map(entries) => entries
                .iter()
                .filter(|(_, v)| !v.is_furniture())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Self::Record(r) => r
                .borrow()
                .fields
                .iter()
                .filter(|(k, v)| !is_environment_binding(k, v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// True if the value is a composite with at least one data child.
    #[must_use]
    pub fn has_data_children(&self) -> bool {
        self.is_composite() && !self.children().is_empty()
    }

    /// Copy the whole value graph. Shared records stay shared within the
    /// copy, cycles are reproduced, and nothing aliases `self`.
    #[must_use]
    pub fn deep_copy(&self) -> Value {
        DeepCopier::new().copy(self)
    }

    /// Read the value at a dotted child path (`["field", "0", "key"]`).
    #[must_use]
    pub fn get_path(&self, path: &[&str]) -> Option<Value> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self.clone());
        };
        let child = match self {
            Self::List(items) | Self::Set(items) => items.get(head.parse::<usize>().ok()?)?.clone(),
            Self::Map(entries) => entries.get(*head)?.clone(),
            Self::Record(r) => r.field(head)?,
            _ => return None,
        };
        child.get_path(rest)
    }

    /// Replace the value at a dotted child path.
    ///
    /// A missing final record field or map key is inserted. Returns `false`
    /// if an intermediate step does not exist.
    pub fn set_path(&mut self, path: &[&str], new_value: Value) -> bool {
        let Some((head, rest)) = path.split_first() else {
            *self = new_value;
            return true;
        };
        match self {
            Self::List(items) | Self::Set(items) => {
                let Ok(index) = head.parse::<usize>() else {
                    return false;
                };
                items
                    .get_mut(index)
                    .is_some_and(|child| child.set_path(rest, new_value))
            }
            Self::Map(entries) => {
                if rest.is_empty() {
                    entries.insert((*head).to_string(), new_value);
                    return true;
                }
                entries
                    .get_mut(*head)
                    .is_some_and(|child| child.set_path(rest, new_value))
            }
            Self::Record(r) => {
                if rest.is_empty() {
                    r.set_field(head, new_value);
                    return true;
                }
                // Take the child out so a cycle back into `r` never meets a
                // live borrow.
                let Some(mut child) = r.take_field(head) else {
                    return false;
                };
                let ok = child.set_path(rest, new_value);
                r.set_field(head, child);
                ok
            }
            _ => false,
        }
    }

    /// JSON rendering for diagnostics. Revisited records render as
    /// `{"$ref": <id>}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = BTreeSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut BTreeSet<usize>) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::None => serde_json::Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
            Self::Bytes(b) => json!({ "bytes": hex::encode(b) }),
            Self::Enum(e) => json!(format!("{}.{}", e.enumeration(), e.member())),
            Self::List(items) | Self::Set(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_inner(seen)))
                    .collect(),
            ),
            Self::Record(r) => {
                if !seen.insert(r.id()) {
                    return json!({ "$ref": r.id() });
                }
                let mut object = serde_json::Map::new();
                object.insert("$type".into(), json!(r.type_name()));
                object.insert("$id".into(), json!(r.id()));
                for (k, v) in self.children() {
                    object.insert(k, v.to_json_inner(seen));
                }
                serde_json::Value::Object(object)
            }
            Self::Callable(c) => json!(format!("<{} {}>", c.kind.type_tag(), c.name)),
            Self::Opaque(o) => json!(format!("<opaque {}>", o.type_tag)),
        }
    }
}

impl PartialEq for Value {
    /// Shallow equality: records compare by identity, floats by bit pattern.
    /// Use canonical snapshots for structural equality.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a.ptr_eq(b),
            (Self::Callable(a), Self::Callable(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => a.type_tag == b.type_tag,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Deep copier with an identity memo.
///
/// Copying several roots through one copier preserves sharing *between*
/// them, which is what an entry state needs when an argument and a global
/// reference the same record.
#[derive(Debug, Default)]
pub struct DeepCopier {
    memo: HashMap<usize, RecordRef>,
}

impl DeepCopier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy one value graph.
    pub fn copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Record(r) => {
                if let Some(copy) = self.memo.get(&r.id()) {
                    return Value::Record(copy.clone());
                }
                let (type_name, fields) = {
                    let inner = r.borrow();
                    (inner.type_name.clone(), inner.fields.clone())
                };
                let copy = RecordRef::new(&type_name, BTreeMap::new());
                self.memo.insert(r.id(), copy.clone());
                let copied: Bindings = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.copy(v)))
                    .collect();
                copy.borrow_mut().fields = copied;
                Value::Record(copy)
            }
            Value::List(items) => Value::List(items.iter().map(|v| self.copy(v)).collect()),
            Value::Set(items) => Value::Set(items.iter().map(|v| self.copy(v)).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.copy(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Copy every binding in a map.
    pub fn copy_bindings(&mut self, bindings: &Bindings) -> Bindings {
        bindings
            .iter()
            .map(|(k, v)| (k.clone(), self.copy(v)))
            .collect()
    }
}

/// Split a dotted path into its segments.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Join a parent path and a child key.
#[must_use]
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i64, y: i64) -> Value {
        Value::record("Point", vec![("x", Value::Int(x)), ("y", Value::Int(y))])
    }

    #[test]
    fn deep_copy_does_not_alias_source() {
        let original = point(1, 2);
        let mut copy = original.deep_copy();
        assert!(copy.set_path(&["x"], Value::Int(99)));
        assert_eq!(original.get_path(&["x"]), Some(Value::Int(1)));
        assert_eq!(copy.get_path(&["x"]), Some(Value::Int(99)));
    }

    #[test]
    fn deep_copy_preserves_sharing_across_roots() {
        let shared = point(0, 0);
        let a = Value::record("Holder", vec![("inner", shared.clone())]);
        let b = Value::record("Holder", vec![("inner", shared)]);

        let mut copier = DeepCopier::new();
        let a2 = copier.copy(&a);
        let b2 = copier.copy(&b);

        let (Some(Value::Record(ia)), Some(Value::Record(ib))) =
            (a2.get_path(&["inner"]), b2.get_path(&["inner"]))
        else {
            panic!("expected record children");
        };
        assert!(ia.ptr_eq(&ib), "copies must keep the shared record shared");
    }

    #[test]
    fn deep_copy_reproduces_cycles() {
        let node = RecordRef::new("Node", BTreeMap::new());
        node.set_field("next", Value::Record(node.clone()));
        let copy = Value::Record(node.clone()).deep_copy();
        let Value::Record(copied) = &copy else {
            panic!("expected record");
        };
        assert!(!copied.ptr_eq(&node));
        let Some(Value::Record(next)) = copied.field("next") else {
            panic!("expected self reference");
        };
        assert!(next.ptr_eq(copied));
    }

    #[test]
    fn set_path_through_list_and_map() {
        let mut value = Value::Map(BTreeMap::from([(
            "items".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2)]),
        )]));
        assert!(value.set_path(&["items", "1"], Value::Int(7)));
        assert_eq!(value.get_path(&["items", "1"]), Some(Value::Int(7)));
        assert!(!value.set_path(&["items", "5"], Value::Int(0)));
        assert!(!value.set_path(&["missing", "0"], Value::Int(0)));
    }

    #[test]
    fn children_skip_furniture_fields() {
        let value = Value::record(
            "Service",
            vec![
                ("port", Value::Int(80)),
                ("handler", Value::Callable(CallableRef::function("handle"))),
                ("__dict__", Value::Map(BTreeMap::new())),
            ],
        );
        let names: Vec<String> = value.children().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["port".to_string()]);
    }

    #[test]
    fn enum_value_bounds() {
        assert!(EnumValue::new("Color", &["Red", "Green"], 2).is_none());
        let red = EnumValue::new("Color", &["Red", "Green"], 0).unwrap();
        assert_eq!(red.member(), "Red");
        assert_eq!(red.with_index(1).unwrap().member(), "Green");
    }

    #[test]
    fn to_json_marks_revisited_records() {
        let node = RecordRef::new("Node", BTreeMap::new());
        node.set_field("me", Value::Record(node.clone()));
        let json = Value::Record(node).to_json();
        assert!(json["me"].get("$ref").is_some());
    }
}
