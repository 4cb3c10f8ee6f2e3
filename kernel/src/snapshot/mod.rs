//! Canonical snapshots: the comparable form of a runtime value.
//!
//! A snapshot is an arena of nodes with a root. Construction is memoized by
//! record identity, so a shared record becomes one node referenced from
//! several parents and a cycle becomes a back edge to a node that was
//! reserved before its children were visited. The arena is therefore
//! finite for any value graph.
//!
//! # Module layout
//!
//! - [`compare`]: `StructuralEq` and binding diffs
//! - [`encode`]: deterministic byte encoding
//! - [`hash`]: domain-separated content hashes over the encoding

pub mod compare;
pub mod encode;
pub mod hash;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::value::{is_environment_binding, Bindings, Value};

/// Index of a node inside a [`CanonicalSnapshot`] arena.
pub type NodeId = usize;

/// Natively comparable payload of an atomic node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Atom {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Member { member: String, index: usize },
}

/// How a composite node's children are keyed and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Sequence,
    Set,
    Map,
    Record,
}

/// One node of a snapshot arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotNode {
    Atomic {
        type_tag: String,
        atom: Atom,
    },
    Composite {
        type_tag: String,
        shape: Shape,
        children: BTreeMap<String, NodeId>,
    },
    /// Could not be introspected; only the type is known.
    Opaque { type_tag: String },
}

impl SnapshotNode {
    #[must_use]
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Atomic { type_tag, .. }
            | Self::Composite { type_tag, .. }
            | Self::Opaque { type_tag } => type_tag,
        }
    }
}

/// Canonical, comparable form of one value graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSnapshot {
    nodes: Vec<SnapshotNode>,
    root: NodeId,
}

impl CanonicalSnapshot {
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_node(&self) -> &SnapshotNode {
        &self.nodes[self.root]
    }

    /// # Panics
    ///
    /// Panics if `id` did not come from this snapshot.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SnapshotNode {
        &self.nodes[id]
    }

    /// Number of distinct nodes. Shared records count once.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Walk child keys from the root (`["field", "0"]`).
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<NodeId> {
        let mut current = self.root;
        for key in path {
            match &self.nodes[current] {
                SnapshotNode::Composite { children, .. } => current = *children.get(*key)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

/// Canonicalize a single value.
#[must_use]
pub fn canonicalize(value: &Value) -> CanonicalSnapshot {
    let mut builder = SnapshotBuilder::default();
    let root = builder.visit(value);
    CanonicalSnapshot {
        nodes: builder.nodes,
        root,
    }
}

/// Canonicalize every binding. Each binding gets its own snapshot, the same
/// way each variable is compared independently.
#[must_use]
pub fn canonicalize_bindings(bindings: &Bindings) -> BTreeMap<String, CanonicalSnapshot> {
    bindings
        .iter()
        .map(|(name, value)| (name.clone(), canonicalize(value)))
        .collect()
}

#[derive(Default)]
struct SnapshotBuilder {
    nodes: Vec<SnapshotNode>,
    /// record identity → reserved node
    memo: HashMap<usize, NodeId>,
}

impl SnapshotBuilder {
    fn push(&mut self, node: SnapshotNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn atomic(&mut self, type_tag: &str, atom: Atom) -> NodeId {
        self.push(SnapshotNode::Atomic {
            type_tag: type_tag.to_string(),
            atom,
        })
    }

    fn visit(&mut self, value: &Value) -> NodeId {
        match value {
            Value::None => self.atomic("NoneType", Atom::None),
            Value::Bool(b) => self.atomic("bool", Atom::Bool(*b)),
            Value::Int(i) => self.atomic("int", Atom::Int(*i)),
            Value::Float(f) => self.atomic("float", Atom::Float(*f)),
            Value::Text(s) => self.atomic("str", Atom::Text(s.clone())),
            Value::Bytes(b) => self.atomic("bytes", Atom::Bytes(b.clone())),
            Value::Enum(e) => self.atomic(
                e.enumeration(),
                Atom::Member {
                    member: e.member().to_string(),
                    index: e.index(),
                },
            ),
            Value::List(items) => self.sequence("list", Shape::Sequence, items),
            Value::Set(items) => self.sequence("set", Shape::Set, items),
            Value::Map(_) => {
                let id = self.push(SnapshotNode::Opaque {
                    type_tag: String::new(),
                });
                let children = value
                    .children()
                    .iter()
                    .map(|(k, v)| (k.clone(), self.visit(v)))
                    .collect();
                self.nodes[id] = SnapshotNode::Composite {
                    type_tag: "dict".into(),
                    shape: Shape::Map,
                    children,
                };
                id
            }
            Value::Record(r) => {
                if let Some(&id) = self.memo.get(&r.id()) {
                    return id;
                }
                // Reserve before visiting children so a back edge finds it.
                let id = self.push(SnapshotNode::Opaque {
                    type_tag: String::new(),
                });
                self.memo.insert(r.id(), id);
                let type_tag = r.type_name();
                let fields: Vec<(String, Value)> = r
                    .borrow()
                    .fields
                    .iter()
                    .filter(|(k, v)| !is_environment_binding(k, v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let children = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.visit(v)))
                    .collect();
                self.nodes[id] = SnapshotNode::Composite {
                    type_tag,
                    shape: Shape::Record,
                    children,
                };
                id
            }
            Value::Callable(c) => self.push(SnapshotNode::Opaque {
                type_tag: c.kind.type_tag().to_string(),
            }),
            Value::Opaque(o) => match o.canonical_bytes() {
                Some(bytes) => self.atomic(&o.type_tag, Atom::Bytes(bytes)),
                None => self.push(SnapshotNode::Opaque {
                    type_tag: o.type_tag.clone(),
                }),
            },
        }
    }

    fn sequence(&mut self, type_tag: &str, shape: Shape, items: &[Value]) -> NodeId {
        let id = self.push(SnapshotNode::Opaque {
            type_tag: String::new(),
        });
        let children = items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_furniture())
            .map(|(i, v)| (i.to_string(), self.visit(v)))
            .collect();
        self.nodes[id] = SnapshotNode::Composite {
            type_tag: type_tag.to_string(),
            shape,
            children,
        };
        id
    }
}
