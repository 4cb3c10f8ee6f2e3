//! Shared, identity-bearing records.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::Value;

/// Record payload: a type name plus named fields.
#[derive(Debug, Clone)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

/// Handle to a shared record.
///
/// Cloning the handle shares the record; identity is the allocation
/// address. Field accessors never hold a borrow across calls, so walking a
/// cyclic graph through them cannot trip a `RefCell` double borrow.
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    #[must_use]
    pub fn new(type_name: &str, fields: BTreeMap<String, Value>) -> Self {
        Self(Rc::new(RefCell::new(Record {
            type_name: type_name.to_string(),
            fields,
        })))
    }

    /// Stable identity for the lifetime of the record.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn type_name(&self) -> String {
        self.0.borrow().type_name.clone()
    }

    /// Shallow clone of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.borrow().fields.get(name).cloned()
    }

    /// Insert or replace a field.
    pub fn set_field(&self, name: &str, value: Value) {
        self.0.borrow_mut().fields.insert(name.to_string(), value);
    }

    /// Remove a field and hand it to the caller.
    pub fn take_field(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().fields.remove(name)
    }

    /// # Panics
    ///
    /// Panics if the record is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    /// # Panics
    ///
    /// Panics if the record is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }
}

impl fmt::Debug for RecordRef {
    // Fields are omitted: a cyclic record would recurse forever.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => write!(
                f,
                "RecordRef({} #{:x}, {} fields)",
                inner.type_name,
                self.id(),
                inner.fields.len()
            ),
            Err(_) => write!(f, "RecordRef(#{:x}, borrowed)", self.id()),
        }
    }
}
