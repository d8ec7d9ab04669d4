//! Tagged runtime values.

slotmap::new_key_type! {
    /// Reference to an object living in a [`Heap`](crate::heap::Heap).
    ///
    /// Generational: a reference to a collected object never resolves to a
    /// later allocation that happens to reuse the same slot.
    pub struct ObjectRef;
}

/// A tagged value as seen by the runtime.
///
/// `Undefined` is reserved for the dictionary's internal slot markers and is
/// never handed back to callers as a stored value.
///
/// The derived `PartialEq` is identity equality (two object references are
/// equal only if they name the same object). Runtime equality, which compares
/// strings and ranges by content, lives in [`crate::equality`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Integer(i64),
    Object(ObjectRef),
}

impl Value {
    pub const NULL: Value = Value::Null;
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match *self {
            Value::Object(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Object(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_undefined() {
        assert!(Value::default().is_undefined());
        assert!(!Value::NULL.is_undefined());
        assert!(!Value::FALSE.is_undefined());
    }

    #[test]
    fn conversions_pick_the_matching_variant() {
        assert_eq!(Value::from(7), Value::Integer(7));
        assert_eq!(Value::from(true), Value::TRUE);
        assert_eq!(Value::from(-1).as_integer(), Some(-1));
        assert_eq!(Value::NULL.as_object(), None);
    }
}
