//! Dictionary: open-addressing hash table keyed by runtime values.
//!
//! Slots hold a `(key, value)` pair in one of three states:
//! - Empty: both `Undefined`. Terminates a probe.
//! - Tombstone: key `Undefined`, value `true`. Probes continue past it.
//! - Live: any non-`Undefined` key.
//!
//! Collisions are resolved by linear probing from `hash % capacity`. Every
//! probe is bounded by the capacity, so a table left completely full by
//! failed growth still terminates.
//!
//! Allocation failures never escape `get`/`set`/`remove`: a failed grow
//! leaves the table over its load factor but usable, and a failed shrink
//! leaves it as it was. `try_set` is the strict variant that reports them.

use crate::context::{Allocator, KeyContext, RootGuard};
use crate::error::AllocError;
use crate::heap::{Trace, Tracer};
use crate::value::Value;

/// Smallest non-zero capacity.
pub const MIN_CAPACITY: usize = 16;

/// Maximum fill before growing, in 1024ths (768 = 75%).
pub const LOAD_FACTOR: usize = 768;

/// Capacity multiplier on growth, and divisor on shrink.
pub const GROW_FACTOR: usize = 2;

/// The table shrinks once it is this many times emptier than the grow
/// threshold. It then shrinks by `GROW_FACTOR`, leaving headroom.
pub const SHRINK_FACTOR: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Entry {
    key: Value,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: Value::Undefined,
        value: Value::Undefined,
    };

    const TOMBSTONE: Entry = Entry {
        key: Value::Undefined,
        value: Value::TRUE,
    };

    #[inline]
    fn is_live(&self) -> bool {
        !self.key.is_undefined()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.key.is_undefined() && self.value.is_undefined()
    }
}

pub(crate) const ENTRY_BYTES: usize = core::mem::size_of::<Entry>();

#[inline]
fn max_load(capacity: usize) -> usize {
    capacity * LOAD_FACTOR / 1024
}

#[derive(Debug, Default)]
pub struct Dictionary {
    entries: Vec<Entry>,
    count: usize,
}

impl Dictionary {
    /// An empty dictionary. Nothing is allocated until the first `set`.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots in the entry array.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Look up `key`. `None` means no entry exists for it.
    pub fn get<C: KeyContext + ?Sized>(&self, cx: &C, key: Value) -> Option<Value> {
        self.find(cx, key).map(|i| self.entries[i].value)
    }

    pub fn contains_key<C: KeyContext + ?Sized>(&self, cx: &C, key: Value) -> bool {
        self.find(cx, key).is_some()
    }

    /// Insert or overwrite `key`. Grows first when the new entry would push
    /// the table past its load factor.
    ///
    /// Never fails: if growth cannot allocate, the entry goes into the
    /// current array, and if that array is completely full it is dropped.
    /// If `alloc` can collect garbage, `key` and `value` must be reachable
    /// from the caller's roots.
    pub fn set<A: Allocator + ?Sized>(&mut self, alloc: &mut A, key: Value, value: Value) {
        debug_assert!(!key.is_undefined(), "undefined is not a valid key");
        if key.is_undefined() {
            return;
        }
        if self.count + 1 > max_load(self.capacity()) {
            let capacity = (self.capacity() * GROW_FACTOR).max(MIN_CAPACITY);
            if let Err(err) = self.resize(alloc, capacity) {
                log::debug!(
                    "dictionary grow {} -> {} failed, continuing over load: {}",
                    self.capacity(),
                    capacity,
                    err
                );
            }
        }
        if add_entry(&mut self.entries, &*alloc, key, value) {
            self.count += 1;
        }
    }

    /// Strict `set`: overwrites never allocate; a new key that needs the
    /// table to grow reports the allocation failure and leaves the
    /// dictionary unchanged.
    pub fn try_set<A: Allocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        key: Value,
        value: Value,
    ) -> Result<(), AllocError> {
        debug_assert!(!key.is_undefined(), "undefined is not a valid key");
        if key.is_undefined() {
            return Ok(());
        }
        if let Some(i) = self.find(&*alloc, key) {
            self.entries[i].value = value;
            return Ok(());
        }
        if self.count + 1 > max_load(self.capacity()) {
            let capacity = (self.capacity() * GROW_FACTOR).max(MIN_CAPACITY);
            self.resize(alloc, capacity)?;
        }
        let added = add_entry(&mut self.entries, &*alloc, key, value);
        debug_assert!(added, "table below its load factor must have room");
        if added {
            self.count += 1;
        }
        Ok(())
    }

    /// Remove `key`, returning its value, or `Null` if it was absent.
    ///
    /// May shrink the table. The returned value is no longer reachable
    /// through the dictionary, so it is held on the allocator's root stack
    /// for the duration of the shrink.
    pub fn remove<A: Allocator + ?Sized>(&mut self, alloc: &mut A, key: Value) -> Value {
        let Some(index) = self.find(&*alloc, key) else {
            return Value::NULL;
        };
        let value = self.entries[index].value;
        self.entries[index] = Entry::TOMBSTONE;
        self.count -= 1;

        if self.should_shrink() {
            let capacity = (self.capacity() / GROW_FACTOR).max(MIN_CAPACITY);
            if capacity != self.capacity() {
                let mut rooted = RootGuard::new(alloc, value);
                if let Err(err) = self.resize(&mut *rooted, capacity) {
                    log::debug!(
                        "dictionary shrink {} -> {} failed: {}",
                        self.capacity(),
                        capacity,
                        err
                    );
                }
            }
        }
        value
    }

    /// Drop every entry and release the entry array.
    pub fn clear<A: Allocator + ?Sized>(&mut self, alloc: &mut A) {
        if !self.entries.is_empty() {
            alloc.free(self.capacity() * ENTRY_BYTES);
        }
        self.entries = Vec::new();
        self.count = 0;
    }

    /// Live entries in slot order. The order carries no meaning.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            it: self.entries.iter(),
        }
    }

    fn should_shrink(&self) -> bool {
        let capacity = self.capacity();
        if capacity <= MIN_CAPACITY {
            return false;
        }
        let high_water = max_load(capacity / SHRINK_FACTOR);
        high_water > 0 && self.count / high_water == 0
    }

    fn find<C: KeyContext + ?Sized>(&self, cx: &C, key: Value) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = cx.hash_key(key) as usize % capacity;
        for _ in 0..capacity {
            let entry = &self.entries[index];
            if entry.is_live() {
                if cx.keys_equal(entry.key, key) {
                    return Some(index);
                }
            } else if entry.is_empty() {
                return None;
            }
            index += 1;
            if index == capacity {
                index = 0;
            }
        }
        None
    }

    /// Move every live entry into a fresh array of `new_capacity` slots.
    /// On failure nothing changes.
    fn resize<A: Allocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        new_capacity: usize,
    ) -> Result<(), AllocError> {
        debug_assert!(new_capacity > self.count);
        let bytes = new_capacity
            .checked_mul(ENTRY_BYTES)
            .ok_or(AllocError::Exhausted { bytes: usize::MAX })?;
        alloc.allocate(bytes, &*self)?;

        let mut entries = Vec::new();
        if entries.try_reserve_exact(new_capacity).is_err() {
            alloc.free(bytes);
            return Err(AllocError::Exhausted { bytes });
        }
        entries.resize(new_capacity, Entry::EMPTY);

        let mut moved = 0;
        for old in self.entries.iter().filter(|e| e.is_live()) {
            if add_entry(&mut entries, &*alloc, old.key, old.value) {
                moved += 1;
            }
        }
        debug_assert_eq!(moved, self.count);

        let old_capacity = self.capacity();
        if old_capacity > 0 {
            alloc.free(old_capacity * ENTRY_BYTES);
        }
        log::trace!(
            "dictionary resized {} -> {} ({} live)",
            old_capacity,
            new_capacity,
            self.count
        );
        self.entries = entries;
        Ok(())
    }
}

/// Insert or overwrite in a raw entry array. Returns true if `key` is new.
///
/// The first tombstone on the probe path is reused, but only once the probe
/// has reached an Empty slot (or wrapped) without finding `key`, so a key
/// never ends up stored twice.
fn add_entry<C: KeyContext + ?Sized>(
    entries: &mut [Entry],
    cx: &C,
    key: Value,
    value: Value,
) -> bool {
    let capacity = entries.len();
    if capacity == 0 {
        return false;
    }
    let mut index = cx.hash_key(key) as usize % capacity;
    let mut reusable = None;
    for _ in 0..capacity {
        let entry = &mut entries[index];
        if entry.is_live() {
            if cx.keys_equal(entry.key, key) {
                entry.value = value;
                return false;
            }
        } else if entry.is_empty() {
            entries[reusable.unwrap_or(index)] = Entry { key, value };
            return true;
        } else if reusable.is_none() {
            reusable = Some(index);
        }
        index += 1;
        if index == capacity {
            index = 0;
        }
    }
    match reusable {
        Some(slot) => {
            entries[slot] = Entry { key, value };
            true
        }
        // Completely full of live entries.
        None => false,
    }
}

/// Iterator over `(key, value)` pairs of a [`Dictionary`].
pub struct Iter<'a> {
    it: core::slice::Iter<'a, Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Value, Value);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .by_ref()
            .find(|e| e.is_live())
            .map(|e| (e.key, e.value))
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (Value, Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Trace for Dictionary {
    fn trace(&self, tracer: &mut Tracer) {
        for (key, value) in self.iter() {
            tracer.visit(key);
            tracer.visit(value);
        }
    }
}
