#![cfg(test)]

// Deterministic collaborators for dictionary tests: pluggable hashing,
// scripted allocation failures, and a recorded root stack.

use crate::context::{Allocator, KeyContext, RootStack};
use crate::error::AllocError;
use crate::heap::{Trace, Tracer};
use crate::value::{ObjectRef, Value};
use slotmap::SlotMap;

pub(crate) fn integer_hash(v: Value) -> u32 {
    match v {
        Value::Integer(i) => i as u32,
        _ => 0,
    }
}

/// Every key lands in the same home slot.
pub(crate) fn const_hash(_: Value) -> u32 {
    0
}

pub(crate) struct TestContext {
    hash: fn(Value) -> u32,
    objects: SlotMap<ObjectRef, ()>,
    /// Remaining allocations that succeed; `None` means unlimited.
    budget: Option<usize>,
    pub(crate) allocated_bytes: usize,
    pub(crate) allocations: usize,
    pub(crate) failed_allocations: usize,
    pub(crate) roots: Vec<Value>,
    pub(crate) max_root_depth: usize,
    /// Root stack contents observed at each `allocate` call.
    pub(crate) roots_at_allocate: Vec<Vec<Value>>,
    /// Objects the table reported as live at each `allocate` call.
    pub(crate) traced_at_allocate: Vec<Vec<ObjectRef>>,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        Self::with_hash(integer_hash)
    }

    pub(crate) fn with_hash(hash: fn(Value) -> u32) -> Self {
        Self {
            hash,
            objects: SlotMap::with_key(),
            budget: None,
            allocated_bytes: 0,
            allocations: 0,
            failed_allocations: 0,
            roots: Vec::new(),
            max_root_depth: 0,
            roots_at_allocate: Vec::new(),
            traced_at_allocate: Vec::new(),
        }
    }

    /// Let the next `n` allocations succeed and fail every one after.
    pub(crate) fn fail_after(&mut self, n: usize) {
        self.budget = Some(n);
    }

    pub(crate) fn allow_all(&mut self) {
        self.budget = None;
    }

    pub(crate) fn new_object(&mut self) -> Value {
        Value::Object(self.objects.insert(()))
    }
}

impl KeyContext for TestContext {
    fn hash_key(&self, key: Value) -> u32 {
        (self.hash)(key)
    }

    fn keys_equal(&self, a: Value, b: Value) -> bool {
        a == b
    }
}

impl Allocator for TestContext {
    fn allocate(&mut self, bytes: usize, roots: &dyn Trace) -> Result<(), AllocError> {
        self.allocations += 1;
        self.roots_at_allocate.push(self.roots.clone());
        let mut tracer = Tracer::default();
        roots.trace(&mut tracer);
        self.traced_at_allocate.push(tracer.drain_pending());

        if let Some(left) = self.budget.as_mut() {
            if *left == 0 {
                self.failed_allocations += 1;
                return Err(AllocError::OutOfMemory {
                    requested: bytes,
                    used: self.allocated_bytes,
                    limit: self.allocated_bytes,
                });
            }
            *left -= 1;
        }
        self.allocated_bytes += bytes;
        Ok(())
    }

    fn free(&mut self, bytes: usize) {
        assert!(bytes <= self.allocated_bytes, "freed more than allocated");
        self.allocated_bytes -= bytes;
    }
}

impl RootStack for TestContext {
    fn push_root(&mut self, value: Value) {
        self.roots.push(value);
        self.max_root_depth = self.max_root_depth.max(self.roots.len());
    }

    fn pop_root(&mut self) {
        self.roots.pop().expect("pop_root without push_root");
    }
}
