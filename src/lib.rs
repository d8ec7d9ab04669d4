//! chalk-dict: the dictionary primitive of a small dynamically-typed
//! runtime, an open-addressing hash table keyed by tagged values.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a table that a managed runtime can mutate under memory pressure
//!   and garbage collection without ever leaving it torn.
//! - Layers:
//!   - Value / Object: the closed set of tagged values and heap object
//!     kinds a key may be.
//!   - hash / equality: 32-bit hashing dispatched on the value variant,
//!     consistent with the runtime's equality predicate.
//!   - context: the seams the table depends on. `KeyContext` hashes and
//!     compares keys; `Allocator` hands out table storage and, through
//!     `RootStack`, roots values across calls that may collect. `RootGuard`
//!     scopes a root.
//!   - Heap: the concrete collaborator. Slot-based object storage, byte
//!     accounting against `HeapLimits`, weak string interning, a LIFO root
//!     stack, persistent roots and mark-sweep collection. Dictionaries that
//!     allocate from the heap are heap objects (`alloc_dict`, `dict_set`,
//!     ...), so their storage lives and dies with them.
//!   - Dictionary: linear probing with tombstones, growth at 75% load,
//!     shrink with hysteresis.
//!
//! Constraints
//! - Single-threaded: one mutator, no interior mutability in the table.
//! - No operation of `Dictionary` panics or reports an error on allocation
//!   failure except the strict `try_set`.
//! - Keys are never `Value::Undefined`; that value marks empty and deleted
//!   slots.
//!
//! GC interaction
//! - Resizing asks the allocator for memory, and the allocator may collect.
//!   The table passes itself as a root, so everything still stored survives.
//!   Every other live heap dictionary is traced through the object graph.
//! - `remove` takes a value out of the table before it may shrink. That
//!   value is held by a `RootGuard` until the shrink is done.
//! - `Heap::dict_set` roots the key and value it is given. With a bare
//!   `Dictionary` and a custom `Allocator`, they are the caller's to keep
//!   reachable.
//!
//! Identity hashing
//! - Objects without a value-based hash (modules, instances) hash by an
//!   identity number fixed at allocation and stored in the object header.
//!   Heap slots are not stable addresses, so no address is ever hashed.
//!
//! Notes and non-goals
//! - Iteration order is slot order and carries no meaning.
//! - `Heap` is not itself an `Allocator`: a table charged to the heap is
//!   always a heap object, and sweeping it returns its bytes.

pub mod context;
pub mod dict;
mod dict_proptest;
pub mod equality;
pub mod error;
pub mod hash;
pub mod heap;
pub mod object;
mod test_support;
pub mod value;
pub mod vm;

// Public surface
pub use context::{Allocator, KeyContext, RootGuard, RootStack};
pub use dict::Dictionary;
pub use error::AllocError;
pub use heap::{Heap, HeapLimits, RootId, Trace, Tracer};
pub use value::{ObjectRef, Value};
pub use vm::Vm;
