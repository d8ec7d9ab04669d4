//! Runtime value equality.

use crate::heap::Heap;
use crate::object::ObjectKind;
use crate::value::{ObjectRef, Value};

/// Equality as the language sees it: immediates compare by value, strings
/// and ranges by content, every other object by identity.
pub fn values_equal(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x == y || objects_equal(heap, x, y),
        _ => a == b,
    }
}

fn objects_equal(heap: &Heap, x: ObjectRef, y: ObjectRef) -> bool {
    let (Some(x), Some(y)) = (heap.get(x), heap.get(y)) else {
        return false;
    };
    match (x.kind(), y.kind()) {
        (ObjectKind::String(s), ObjectKind::String(t)) => {
            s.hash() == t.hash() && s.as_str() == t.as_str()
        }
        (ObjectKind::Range(r), ObjectKind::Range(q)) => r == q,
        _ => false,
    }
}
