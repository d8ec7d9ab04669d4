//! Hashing for runtime values.
//!
//! Equal values (in the sense of [`crate::equality::values_equal`]) always
//! hash equal. Hashes are 32 bits wide; the dictionary reduces them modulo
//! its capacity.

use crate::heap::Heap;
use crate::object::{Object, ObjectKind};
use crate::value::Value;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the string's bytes. Computed once per string object.
pub fn string_hash(text: &str) -> u32 {
    text.bytes().fold(FNV_OFFSET_BASIS, |h, b| {
        (h ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Hash a value for dictionary placement.
pub fn hash_value(heap: &Heap, value: Value) -> u32 {
    match value {
        Value::Null => 0,
        // Truncate rather than fold the halves together: folding maps -1 onto 0.
        Value::Integer(i) => i as u32,
        Value::Object(r) => heap.get(r).map_or(0, |obj| hash_object(heap, obj)),
        Value::Undefined | Value::Bool(_) => 0,
    }
}

/// Hash a heap object, dispatching on its kind.
pub fn hash_object(heap: &Heap, obj: &Object) -> u32 {
    match obj.kind() {
        ObjectKind::String(s) => s.hash(),
        // A class hashes like its name so either can be used to look it up.
        ObjectKind::Class(c) => heap
            .get(c.name())
            .and_then(Object::as_string)
            .map_or(obj.identity(), |name| name.hash()),
        ObjectKind::Range(r) => (r.from as u32) ^ (r.to as u32),
        ObjectKind::Module(_) | ObjectKind::Instance(_) | ObjectKind::Dict(_) => obj.identity(),
    }
}
