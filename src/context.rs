//! Collaborator seams for the dictionary.
//!
//! The table itself never touches the heap directly. It hashes and compares
//! keys through a [`KeyContext`] and obtains memory and GC rooting through an
//! [`Allocator`]. The heap hands its dictionaries an allocator scoped to one
//! operation; tests plug in contexts with degenerate hashes or failing
//! allocations.

use crate::error::AllocError;
use crate::heap::Trace;
use crate::value::Value;
use core::ops::{Deref, DerefMut};

/// Hashing and equality for dictionary keys. `keys_equal(a, b)` must imply
/// `hash_key(a) == hash_key(b)`.
pub trait KeyContext {
    fn hash_key(&self, key: Value) -> u32;
    fn keys_equal(&self, a: Value, b: Value) -> bool;
}

/// LIFO stack of values protected from collection.
pub trait RootStack {
    /// Protect a value from collection until the matching `pop_root`.
    fn push_root(&mut self, value: Value);

    fn pop_root(&mut self);
}

/// Memory and rooting services needed while a table is resized.
pub trait Allocator: KeyContext + RootStack {
    /// Account for `bytes` of table storage. May collect garbage first;
    /// anything reachable from `roots` or the collector's own roots survives.
    fn allocate(&mut self, bytes: usize, roots: &dyn Trace) -> Result<(), AllocError>;

    /// Return `bytes` previously obtained from [`Allocator::allocate`].
    fn free(&mut self, bytes: usize);
}

/// Scoped GC root. Pushes the value on creation when it is an object
/// reference and pops it when dropped, so every exit path unroots.
///
/// The guard borrows the root stack mutably and derefs to it, so work that
/// must happen under the root is done through the guard.
pub struct RootGuard<'a, A: RootStack + ?Sized> {
    alloc: &'a mut A,
    pushed: bool,
}

impl<'a, A: RootStack + ?Sized> RootGuard<'a, A> {
    pub fn new(alloc: &'a mut A, value: Value) -> Self {
        let pushed = value.is_object();
        if pushed {
            alloc.push_root(value);
        }
        Self { alloc, pushed }
    }
}

impl<'a, A: RootStack + ?Sized> Deref for RootGuard<'a, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.alloc
    }
}

impl<'a, A: RootStack + ?Sized> DerefMut for RootGuard<'a, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.alloc
    }
}

impl<'a, A: RootStack + ?Sized> Drop for RootGuard<'a, A> {
    fn drop(&mut self) {
        if self.pushed {
            self.alloc.pop_root();
        }
    }
}
