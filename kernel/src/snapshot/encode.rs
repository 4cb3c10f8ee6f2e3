//! Canonical snapshot bytes: the single serialization-for-hashing path.
//!
//! # Encoding rules
//!
//! 1. Nodes are written depth-first from the root, children in key order.
//! 2. Each composite node gets an ordinal when first written. A node reached
//!    again (sharing or a cycle) is written as `@<ordinal>`, so two snapshots
//!    with the same graph shape encode identically regardless of arena ids.
//! 3. Strings are quoted and escaped; floats are written as their IEEE-754
//!    bit pattern with every NaN collapsed to one pattern.
//! 4. Output is always valid UTF-8 and contains no whitespace.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use super::{Atom, CanonicalSnapshot, NodeId, Shape, SnapshotNode};

/// Produce canonical bytes for one snapshot.
#[must_use]
pub fn canonical_snapshot_bytes(snapshot: &CanonicalSnapshot) -> Vec<u8> {
    let mut buf = Vec::new();
    Encoder {
        snapshot,
        ordinals: HashMap::new(),
    }
    .write_node(&mut buf, snapshot.root());
    buf
}

/// Produce canonical bytes for a set of named snapshots, in name order.
#[must_use]
pub fn canonical_bindings_bytes(bindings: &BTreeMap<String, CanonicalSnapshot>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(b'{');
    for (i, (name, snapshot)) in bindings.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        write_string(&mut buf, name);
        buf.push(b':');
        buf.extend_from_slice(&canonical_snapshot_bytes(snapshot));
    }
    buf.push(b'}');
    buf
}

struct Encoder<'a> {
    snapshot: &'a CanonicalSnapshot,
    ordinals: HashMap<NodeId, usize>,
}

impl Encoder<'_> {
    fn write_node(&mut self, buf: &mut Vec<u8>, id: NodeId) {
        match self.snapshot.node(id) {
            SnapshotNode::Atomic { type_tag, atom } => {
                buf.push(b'(');
                write_string(buf, type_tag);
                buf.push(b' ');
                write_atom(buf, atom);
                buf.push(b')');
            }
            SnapshotNode::Opaque { type_tag } => {
                buf.push(b'?');
                write_string(buf, type_tag);
            }
            SnapshotNode::Composite {
                type_tag,
                shape,
                children,
            } => {
                if let Some(ordinal) = self.ordinals.get(&id) {
                    let _ = write!(buf, "@{ordinal}");
                    return;
                }
                let ordinal = self.ordinals.len();
                self.ordinals.insert(id, ordinal);

                buf.push(b'{');
                write_string(buf, type_tag);
                buf.push(shape_byte(*shape));
                for (i, (key, &child)) in children.iter().enumerate() {
                    if i > 0 {
                        buf.push(b',');
                    }
                    write_string(buf, key);
                    buf.push(b':');
                    self.write_node(buf, child);
                }
                buf.push(b'}');
            }
        }
    }
}

fn shape_byte(shape: Shape) -> u8 {
    match shape {
        Shape::Sequence => b'L',
        Shape::Set => b'S',
        Shape::Map => b'M',
        Shape::Record => b'R',
    }
}

fn write_atom(buf: &mut Vec<u8>, atom: &Atom) {
    match atom {
        Atom::None => buf.push(b'n'),
        Atom::Bool(true) => buf.push(b't'),
        Atom::Bool(false) => buf.push(b'f'),
        Atom::Int(i) => {
            let _ = write!(buf, "i{i}");
        }
        Atom::Float(f) => {
            let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
            let _ = write!(buf, "d{bits:016x}");
        }
        Atom::Text(s) => {
            buf.push(b's');
            write_string(buf, s);
        }
        Atom::Bytes(b) => {
            buf.push(b'x');
            buf.extend_from_slice(hex::encode(b).as_bytes());
        }
        Atom::Member { member, index } => {
            buf.push(b'm');
            write_string(buf, member);
            let _ = write!(buf, "#{index}");
        }
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(buf, "\\u{:04x}", c as u32);
            }
            c => {
                let mut utf8_buf = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8_buf).as_bytes());
            }
        }
    }
    buf.push(b'"');
}
