//! Heap object kinds.

use crate::dict::{Dictionary, ENTRY_BYTES};
use crate::heap::{Trace, Tracer};
use crate::value::{ObjectRef, Value};

#[derive(Debug)]
pub(crate) struct ObjectHeader {
    /// Assigned once at allocation; stands in for a storage address when an
    /// object has no value-based hash.
    pub(crate) identity: u32,
    pub(crate) marked: bool,
}

#[derive(Debug)]
pub struct Object {
    pub(crate) header: ObjectHeader,
    pub(crate) kind: ObjectKind,
}

impl Object {
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn identity(&self) -> u32 {
        self.header.identity
    }

    pub fn as_string(&self) -> Option<&StringObject> {
        match &self.kind {
            ObjectKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match &self.kind {
            ObjectKind::Dict(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ObjectKind {
    String(StringObject),
    Class(ClassObject),
    Range(RangeObject),
    Module(ModuleObject),
    Instance(InstanceObject),
    /// A dictionary owned by the heap. Its entry array is charged to the
    /// heap and released when the dictionary is swept.
    Dict(Dictionary),
}

impl ObjectKind {
    /// Bytes charged against the heap limit for an object of this shape.
    pub(crate) fn heap_size(&self) -> usize {
        let payload = match self {
            ObjectKind::String(s) => s.text.len(),
            ObjectKind::Instance(i) => i.fields.len() * core::mem::size_of::<Value>(),
            ObjectKind::Dict(d) => d.capacity() * ENTRY_BYTES,
            ObjectKind::Class(_) | ObjectKind::Range(_) | ObjectKind::Module(_) => 0,
        };
        core::mem::size_of::<Object>() + payload
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer) {
        match self {
            ObjectKind::String(_) | ObjectKind::Range(_) => {}
            ObjectKind::Class(c) => tracer.visit_object(c.name),
            ObjectKind::Module(m) => {
                if let Some(name) = m.name {
                    tracer.visit_object(name);
                }
            }
            ObjectKind::Instance(i) => {
                tracer.visit_object(i.class);
                for &field in i.fields.iter() {
                    tracer.visit(field);
                }
            }
            ObjectKind::Dict(d) => d.trace(tracer),
        }
    }
}

/// Immutable string with its hash computed once at creation.
#[derive(Debug)]
pub struct StringObject {
    pub(crate) text: Box<str>,
    pub(crate) hash: u32,
}

impl StringObject {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

#[derive(Debug)]
pub struct ClassObject {
    /// Always a string object.
    pub(crate) name: ObjectRef,
}

impl ClassObject {
    pub fn name(&self) -> ObjectRef {
        self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeObject {
    pub from: i64,
    pub to: i64,
    pub inclusive: bool,
}

#[derive(Debug)]
pub struct ModuleObject {
    pub(crate) name: Option<ObjectRef>,
}

impl ModuleObject {
    /// `None` for the core module.
    pub fn name(&self) -> Option<ObjectRef> {
        self.name
    }
}

#[derive(Debug)]
pub struct InstanceObject {
    pub(crate) class: ObjectRef,
    pub(crate) fields: Box<[Value]>,
}

impl InstanceObject {
    pub fn class(&self) -> ObjectRef {
        self.class
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}
