//! Object heap: slot storage, byte accounting, string interning, a LIFO root
//! stack and a stop-the-world mark-sweep collector.
//!
//! Objects never move. References are generational slot keys, so a stale
//! reference to a collected object resolves to `None` instead of aliasing a
//! newer object.
//!
//! Collection only happens inside an allocation that would cross
//! [`HeapLimits::gc_threshold`], or that would otherwise fail against
//! [`HeapLimits::max_bytes`]. The live set is everything reachable from the
//! persistent roots, the root stack, and the `roots: &dyn Trace` each
//! allocating method takes for the caller's temporaries.
//!
//! Dictionaries are heap objects. Their entry arrays are charged to the heap
//! while they grow and released when the dictionary is swept, and their
//! entries are traced like any other object's references.

use crate::context::{Allocator, KeyContext, RootStack};
use crate::dict::Dictionary;
use crate::equality::values_equal;
use crate::error::AllocError;
use crate::hash::{hash_value, string_hash};
use crate::object::{
    ClassObject, InstanceObject, ModuleObject, Object, ObjectHeader, ObjectKind, RangeObject,
    StringObject,
};
use crate::value::{ObjectRef, Value};
use hashbrown::HashTable;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a persistent root created by [`Heap::add_root`].
    pub struct RootId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLimits {
    /// Hard cap on accounted bytes. Allocations beyond it fail.
    pub max_bytes: usize,
    /// Allocations that would push usage past this collect first.
    pub gc_threshold: usize,
}

impl HeapLimits {
    pub fn new(max_bytes: usize, gc_threshold: usize) -> Self {
        Self {
            max_bytes,
            gc_threshold,
        }
    }
}

impl Default for HeapLimits {
    /// Unbounded, never collects on its own.
    fn default() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }
}

/// Something that can report the object references it keeps alive.
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer);
}

/// Mark-phase worklist.
#[derive(Debug, Default)]
pub struct Tracer {
    pending: Vec<ObjectRef>,
}

impl Tracer {
    #[inline]
    pub fn visit(&mut self, value: Value) {
        if let Value::Object(r) = value {
            self.pending.push(r);
        }
    }

    #[inline]
    pub fn visit_object(&mut self, r: ObjectRef) {
        self.pending.push(r);
    }

    #[cfg(test)]
    pub(crate) fn drain_pending(&mut self) -> Vec<ObjectRef> {
        core::mem::take(&mut self.pending)
    }
}

impl Trace for () {
    fn trace(&self, _tracer: &mut Tracer) {}
}

impl Trace for Value {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(*self);
    }
}

impl Trace for [Value] {
    fn trace(&self, tracer: &mut Tracer) {
        for &v in self {
            tracer.visit(v);
        }
    }
}

impl<A: Trace, B: Trace> Trace for (A, B) {
    fn trace(&self, tracer: &mut Tracer) {
        self.0.trace(tracer);
        self.1.trace(tracer);
    }
}

impl<T: Trace + ?Sized> Trace for &T {
    fn trace(&self, tracer: &mut Tracer) {
        (**self).trace(tracer);
    }
}

#[derive(Debug)]
pub struct Heap {
    limits: HeapLimits,
    objects: SlotMap<ObjectRef, Object>,
    // Weak: entries whose string was collected are dropped after each sweep.
    strings: HashTable<ObjectRef>,
    root_stack: Vec<Value>,
    persistent_roots: SlotMap<RootId, Value>,
    used_bytes: usize,
    next_identity: u32,
    gc_runs: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapLimits::default())
    }
}

impl Heap {
    pub fn new(limits: HeapLimits) -> Self {
        Self {
            limits,
            objects: SlotMap::with_key(),
            strings: HashTable::new(),
            root_stack: Vec::new(),
            persistent_roots: SlotMap::with_key(),
            used_bytes: 0,
            next_identity: 1,
            gc_runs: 0,
        }
    }

    pub fn limits(&self) -> HeapLimits {
        self.limits
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn gc_runs(&self) -> u64 {
        self.gc_runs
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, r: ObjectRef) -> Option<&Object> {
        self.objects.get(r)
    }

    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.objects.contains_key(r)
    }

    /// Text of a string object, or `None` if `value` is not a live string.
    pub fn str(&self, value: Value) -> Option<&str> {
        self.get(value.as_object()?)
            .and_then(Object::as_string)
            .map(StringObject::as_str)
    }

    /// The live interned string for `text`, without allocating.
    pub fn interned(&self, text: &str) -> Option<ObjectRef> {
        self.find_interned(text, string_hash(text))
    }

    pub fn root_depth(&self) -> usize {
        self.root_stack.len()
    }

    pub fn push_root(&mut self, value: Value) {
        self.root_stack.push(value);
    }

    pub fn pop_root(&mut self) {
        let popped = self.root_stack.pop();
        debug_assert!(popped.is_some(), "root stack underflow");
    }

    /// Keep `value` alive until [`Heap::remove_root`] is called with the
    /// returned id. For values held by the host across many calls.
    pub fn add_root(&mut self, value: Value) -> RootId {
        self.persistent_roots.insert(value)
    }

    /// Drop a persistent root, returning the value it held.
    pub fn remove_root(&mut self, id: RootId) -> Option<Value> {
        self.persistent_roots.remove(id)
    }

    pub fn root(&self, id: RootId) -> Option<Value> {
        self.persistent_roots.get(id).copied()
    }

    /// Intern `text`. Equal texts yield the same object while it is alive.
    pub fn alloc_string(&mut self, text: &str, roots: &dyn Trace) -> Result<ObjectRef, AllocError> {
        let hash = string_hash(text);
        if let Some(r) = self.find_interned(text, hash) {
            return Ok(r);
        }
        let kind = ObjectKind::String(StringObject {
            text: text.into(),
            hash,
        });
        let r = self.alloc_object(kind, roots)?;
        let objects = &self.objects;
        self.strings
            .insert_unique(u64::from(hash), r, |&k| interned_hash(objects, k));
        Ok(r)
    }

    pub fn alloc_class(&mut self, name: &str, roots: &dyn Trace) -> Result<ObjectRef, AllocError> {
        let name = self.alloc_string(name, roots)?;
        self.alloc_rooted(Value::Object(name), ObjectKind::Class(ClassObject { name }), roots)
    }

    pub fn alloc_range(
        &mut self,
        from: i64,
        to: i64,
        inclusive: bool,
        roots: &dyn Trace,
    ) -> Result<ObjectRef, AllocError> {
        let kind = ObjectKind::Range(RangeObject {
            from,
            to,
            inclusive,
        });
        self.alloc_object(kind, roots)
    }

    /// Allocate a module. The core module has no name.
    pub fn alloc_module(
        &mut self,
        name: Option<&str>,
        roots: &dyn Trace,
    ) -> Result<ObjectRef, AllocError> {
        let name = match name {
            Some(n) => Some(self.alloc_string(n, roots)?),
            None => None,
        };
        let held = name.map_or(Value::Null, Value::Object);
        self.alloc_rooted(held, ObjectKind::Module(ModuleObject { name }), roots)
    }

    pub fn alloc_instance(
        &mut self,
        class: ObjectRef,
        fields: Vec<Value>,
        roots: &dyn Trace,
    ) -> Result<ObjectRef, AllocError> {
        // The new instance's own references are not reachable from anywhere yet.
        let depth = self.root_stack.len();
        self.root_stack.push(Value::Object(class));
        self.root_stack.extend_from_slice(&fields);
        let kind = ObjectKind::Instance(InstanceObject {
            class,
            fields: fields.into_boxed_slice(),
        });
        let res = self.alloc_object(kind, roots);
        self.root_stack.truncate(depth);
        res
    }

    /// Allocate an empty dictionary. Its entry array is allocated on the
    /// first insert.
    pub fn alloc_dict(&mut self, roots: &dyn Trace) -> Result<ObjectRef, AllocError> {
        self.alloc_object(ObjectKind::Dict(Dictionary::new()), roots)
    }

    /// The dictionary `dict` refers to, if it is a live dictionary.
    pub fn dict(&self, dict: ObjectRef) -> Option<&Dictionary> {
        self.get(dict)?.as_dict()
    }

    pub fn dict_get(&self, dict: ObjectRef, key: Value) -> Option<Value> {
        self.dict(dict)?.get(self, key)
    }

    /// [`Dictionary::set`] on a heap dictionary. `key` and `value` are rooted
    /// for the duration, so freshly allocated objects may be passed directly.
    ///
    /// `dict` must be a live dictionary; anything else is ignored.
    pub fn dict_set(&mut self, dict: ObjectRef, key: Value, value: Value, roots: &dyn Trace) {
        let done = self.with_dict(dict, &[key, value], roots, |d, m| d.set(m, key, value));
        debug_assert!(done.is_some(), "not a live dictionary");
    }

    /// [`Dictionary::try_set`] on a heap dictionary, rooting `key` and
    /// `value` like [`Heap::dict_set`].
    pub fn dict_try_set(
        &mut self,
        dict: ObjectRef,
        key: Value,
        value: Value,
        roots: &dyn Trace,
    ) -> Result<(), AllocError> {
        match self.with_dict(dict, &[key, value], roots, |d, m| d.try_set(m, key, value)) {
            Some(res) => res,
            None => {
                debug_assert!(false, "not a live dictionary");
                Ok(())
            }
        }
    }

    /// [`Dictionary::remove`] on a heap dictionary. Returns `Null` when the
    /// key is absent or `dict` is not a live dictionary.
    pub fn dict_remove(&mut self, dict: ObjectRef, key: Value, roots: &dyn Trace) -> Value {
        self.with_dict(dict, &[], roots, |d, m| d.remove(m, key))
            .unwrap_or(Value::NULL)
    }

    /// Drop every entry of a heap dictionary and release its entry array.
    pub fn dict_clear(&mut self, dict: ObjectRef) {
        self.with_dict(dict, &[], &(), |d, m| d.clear(m));
    }

    /// Run a full collection now.
    pub fn collect_garbage(&mut self, roots: &dyn Trace) {
        let mut tracer = Tracer::default();
        for &v in &self.root_stack {
            tracer.visit(v);
        }
        for &v in self.persistent_roots.values() {
            tracer.visit(v);
        }
        roots.trace(&mut tracer);

        while let Some(r) = tracer.pending.pop() {
            let Some(obj) = self.objects.get_mut(r) else {
                continue;
            };
            if obj.header.marked {
                continue;
            }
            obj.header.marked = true;
            obj.kind.trace(&mut tracer);
        }

        let mut freed = 0usize;
        let mut freed_bytes = 0usize;
        self.objects.retain(|_, obj| {
            if obj.header.marked {
                obj.header.marked = false;
                true
            } else {
                freed += 1;
                freed_bytes += obj.kind.heap_size();
                false
            }
        });
        self.used_bytes = self.used_bytes.saturating_sub(freed_bytes);

        let objects = &self.objects;
        self.strings.retain(|r| objects.contains_key(*r));

        self.gc_runs += 1;
        log::debug!(
            "gc #{}: freed {} objects ({} bytes), {} live, {} bytes in use",
            self.gc_runs,
            freed,
            freed_bytes,
            self.objects.len(),
            self.used_bytes
        );
    }

    /// Charge `bytes` against the limits, collecting first if the threshold
    /// or the hard limit would be crossed.
    fn reserve(&mut self, bytes: usize, roots: &dyn Trace) -> Result<(), AllocError> {
        let wanted = self.used_bytes.saturating_add(bytes);
        if wanted > self.limits.gc_threshold || wanted > self.limits.max_bytes {
            self.collect_garbage(roots);
        }
        let wanted = self.used_bytes.saturating_add(bytes);
        if wanted > self.limits.max_bytes {
            log::debug!(
                "heap limit reached: {} bytes requested, {} of {} in use",
                bytes,
                self.used_bytes,
                self.limits.max_bytes
            );
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                used: self.used_bytes,
                limit: self.limits.max_bytes,
            });
        }
        self.used_bytes = wanted;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.used_bytes, "released more than allocated");
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    fn alloc_object(&mut self, kind: ObjectKind, roots: &dyn Trace) -> Result<ObjectRef, AllocError> {
        self.reserve(kind.heap_size(), roots)?;
        let identity = self.next_identity;
        self.next_identity = self.next_identity.wrapping_add(1);
        Ok(self.objects.insert(Object {
            header: ObjectHeader {
                identity,
                marked: false,
            },
            kind,
        }))
    }

    /// Allocate while `held` is kept on the root stack.
    fn alloc_rooted(
        &mut self,
        held: Value,
        kind: ObjectKind,
        roots: &dyn Trace,
    ) -> Result<ObjectRef, AllocError> {
        self.push_root(held);
        let res = self.alloc_object(kind, roots);
        self.pop_root();
        res
    }

    /// Run `op` on the dictionary stored in `dict` with an allocator bound
    /// to this heap.
    ///
    /// The table is moved out of its slot for the call; it is traced as the
    /// `roots` of its own resizes, and the dictionary object plus `held` stay
    /// on the root stack until it is put back.
    fn with_dict<R>(
        &mut self,
        dict: ObjectRef,
        held: &[Value],
        roots: &dyn Trace,
        op: impl FnOnce(&mut Dictionary, &mut Mutator<'_>) -> R,
    ) -> Option<R> {
        let mut table = match self.objects.get_mut(dict).map(|o| &mut o.kind) {
            Some(ObjectKind::Dict(d)) => core::mem::take(d),
            _ => return None,
        };
        let depth = self.root_stack.len();
        self.root_stack.push(Value::Object(dict));
        self.root_stack.extend_from_slice(held);

        let out = op(&mut table, &mut Mutator { heap: self, roots });

        self.root_stack.truncate(depth);
        match self.objects.get_mut(dict).map(|o| &mut o.kind) {
            Some(ObjectKind::Dict(d)) => *d = table,
            _ => debug_assert!(false, "rooted dictionary was collected"),
        }
        Some(out)
    }

    fn find_interned(&self, text: &str, hash: u32) -> Option<ObjectRef> {
        self.strings
            .find(u64::from(hash), |&r| {
                self.objects
                    .get(r)
                    .and_then(Object::as_string)
                    .map(|s| s.as_str() == text)
                    .unwrap_or(false)
            })
            .copied()
    }
}

fn interned_hash(objects: &SlotMap<ObjectRef, Object>, r: ObjectRef) -> u64 {
    objects
        .get(r)
        .and_then(Object::as_string)
        .map_or(0, |s| u64::from(s.hash()))
}

impl KeyContext for Heap {
    #[inline]
    fn hash_key(&self, key: Value) -> u32 {
        hash_value(self, key)
    }

    #[inline]
    fn keys_equal(&self, a: Value, b: Value) -> bool {
        values_equal(self, a, b)
    }
}

impl RootStack for Heap {
    fn push_root(&mut self, value: Value) {
        Heap::push_root(self, value);
    }

    fn pop_root(&mut self) {
        Heap::pop_root(self);
    }
}

/// Allocator handed to a heap dictionary for one operation. Every
/// collection it triggers also traces the caller's `roots`.
struct Mutator<'h> {
    heap: &'h mut Heap,
    roots: &'h dyn Trace,
}

impl KeyContext for Mutator<'_> {
    #[inline]
    fn hash_key(&self, key: Value) -> u32 {
        self.heap.hash_key(key)
    }

    #[inline]
    fn keys_equal(&self, a: Value, b: Value) -> bool {
        self.heap.keys_equal(a, b)
    }
}

impl RootStack for Mutator<'_> {
    fn push_root(&mut self, value: Value) {
        self.heap.push_root(value);
    }

    fn pop_root(&mut self) {
        self.heap.pop_root();
    }
}

impl Allocator for Mutator<'_> {
    fn allocate(&mut self, bytes: usize, table: &dyn Trace) -> Result<(), AllocError> {
        self.heap.reserve(bytes, &(table, self.roots))
    }

    fn free(&mut self, bytes: usize) {
        self.heap.release(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_interned() {
        let mut heap = Heap::default();
        let a = heap.alloc_string("hello", &()).unwrap();
        let b = heap.alloc_string("hello", &()).unwrap();
        let c = heap.alloc_string("world", &()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.str(Value::Object(a)), Some("hello"));
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let mut heap = Heap::default();
        let keep = heap.alloc_string("keep", &()).unwrap();
        let drop_me = heap.alloc_string("drop", &()).unwrap();
        let before = heap.used_bytes();

        heap.collect_garbage(&Value::Object(keep));
        assert!(heap.is_live(keep));
        assert!(!heap.is_live(drop_me));
        assert!(heap.used_bytes() < before);
        assert_eq!(heap.gc_runs(), 1);

        // The interned entry went with the object; a new one is minted.
        let again = heap.alloc_string("drop", &()).unwrap();
        assert_ne!(again, drop_me);
        assert!(heap.is_live(again));
    }

    #[test]
    fn root_stack_keeps_objects_alive() {
        let mut heap = Heap::default();
        let r = heap.alloc_range(1, 5, false, &()).unwrap();
        heap.push_root(Value::Object(r));
        heap.collect_garbage(&());
        assert!(heap.is_live(r));
        heap.pop_root();
        heap.collect_garbage(&());
        assert!(!heap.is_live(r));
    }

    #[test]
    fn class_keeps_its_name_alive() {
        let mut heap = Heap::default();
        let class = heap.alloc_class("Point", &()).unwrap();
        heap.collect_garbage(&Value::Object(class));
        let name = match heap.get(class).unwrap().kind() {
            ObjectKind::Class(c) => c.name(),
            other => panic!("unexpected kind: {:?}", other),
        };
        assert_eq!(heap.str(Value::Object(name)), Some("Point"));
    }

    #[test]
    fn instance_fields_survive_allocation_pressure() {
        // Collect on every allocation.
        let mut heap = Heap::new(HeapLimits::new(usize::MAX, 0));
        let class = heap.alloc_class("Box", &()).unwrap();
        let field = heap.alloc_string("payload", &Value::Object(class)).unwrap();
        let inst = heap
            .alloc_instance(class, vec![Value::Object(field), Value::Integer(1)], &())
            .unwrap();
        assert!(heap.is_live(class));
        assert!(heap.is_live(field));
        assert!(heap.is_live(inst));
        assert_eq!(heap.root_depth(), 0);
    }

    #[test]
    fn limit_exceeded_reports_out_of_memory() {
        let mut heap = Heap::new(HeapLimits::new(64, usize::MAX));
        let err = heap.reserve(128, &()).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                requested: 128,
                used: 0,
                limit: 64
            }
        );
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn collection_can_make_room() {
        let size = ObjectKind::Range(RangeObject {
            from: 0,
            to: 0,
            inclusive: false,
        })
        .heap_size();
        let mut heap = Heap::new(HeapLimits::new(size, 0));
        let first = heap.alloc_range(0, 1, false, &()).unwrap();
        // `first` is unreachable, so the collection frees its bytes.
        let second = heap.alloc_range(2, 3, false, &()).unwrap();
        assert!(!heap.is_live(first));
        assert!(heap.is_live(second));
        assert_eq!(heap.used_bytes(), size);
    }

    #[test]
    fn persistent_roots_survive_until_removed() {
        let mut heap = Heap::default();
        let s = heap.alloc_string("pinned", &()).unwrap();
        let id = heap.add_root(Value::Object(s));
        heap.collect_garbage(&());
        assert!(heap.is_live(s));
        assert_eq!(heap.root(id), Some(Value::Object(s)));

        assert_eq!(heap.remove_root(id), Some(Value::Object(s)));
        assert_eq!(heap.root(id), None);
        heap.collect_garbage(&());
        assert!(!heap.is_live(s));
    }

    #[test]
    fn dictionary_entries_are_traced() {
        let mut heap = Heap::default();
        let d = heap.alloc_dict(&()).unwrap();
        let key = heap.alloc_string("k", &()).unwrap();
        let value = heap.alloc_range(0, 9, true, &()).unwrap();
        heap.dict_set(d, Value::Object(key), Value::Object(value), &());

        heap.collect_garbage(&Value::Object(d));
        assert!(heap.is_live(key));
        assert!(heap.is_live(value));
        assert_eq!(heap.dict_get(d, Value::Object(key)), Some(Value::Object(value)));
    }

    #[test]
    fn swept_dictionary_releases_its_entries() {
        let mut heap = Heap::default();
        let d = heap.alloc_dict(&()).unwrap();
        for i in 0..40 {
            heap.dict_set(d, Value::Integer(i), Value::Integer(i), &());
        }
        assert!(heap.used_bytes() > 64 * crate::dict::ENTRY_BYTES);

        heap.collect_garbage(&());
        assert!(!heap.is_live(d));
        assert_eq!(heap.used_bytes(), 0);
        assert_eq!(heap.dict_get(d, Value::Integer(1)), None);
        assert_eq!(heap.dict_remove(d, Value::Integer(1), &()), Value::NULL);
    }

    #[test]
    fn dictionary_is_rooted_while_it_grows() {
        // Collect on every allocation. Inside `dict_set` only the operation
        // itself holds the dictionary and the new value.
        let mut heap = Heap::new(HeapLimits::new(usize::MAX, 0));
        let d = heap.alloc_dict(&()).unwrap();
        for i in 0..13 {
            let v = heap.alloc_string(&format!("v{}", i), &Value::Object(d)).unwrap();
            heap.dict_set(d, Value::Integer(i), Value::Object(v), &());
            assert!(heap.is_live(d));
        }
        assert_eq!(heap.dict(d).map(Dictionary::capacity), Some(32));
        for i in 0..13 {
            let v = heap.dict_get(d, Value::Integer(i)).unwrap();
            assert_eq!(heap.str(v), Some(format!("v{}", i).as_str()));
        }
        assert_eq!(heap.root_depth(), 0);
    }
}
