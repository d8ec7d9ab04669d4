//! Minimal virtual machine shell: a heap plus the module registry.

use crate::dict::Dictionary;
use crate::error::AllocError;
use crate::heap::{Heap, HeapLimits};
use crate::object::{Object, ObjectKind};
use crate::value::{ObjectRef, Value};

/// Owns the heap and the module registry. The registry is a heap dictionary
/// held by a persistent root; modules are keyed by name string and the core
/// module is registered under `Null`.
#[derive(Debug)]
pub struct Vm {
    heap: Heap,
    modules: ObjectRef,
}

impl Vm {
    pub fn new(limits: HeapLimits) -> Result<Self, AllocError> {
        let mut heap = Heap::new(limits);
        let modules = heap.alloc_dict(&())?;
        heap.add_root(Value::Object(modules));
        Ok(Self { heap, modules })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The registry dictionary.
    pub fn modules(&self) -> ObjectRef {
        self.modules
    }

    pub fn module_count(&self) -> usize {
        self.heap.dict(self.modules).map_or(0, Dictionary::len)
    }

    /// Create the core module and register it.
    pub fn initialize_core(&mut self) -> Result<ObjectRef, AllocError> {
        let module = self.heap.alloc_module(None, &())?;
        self.heap
            .dict_try_set(self.modules, Value::NULL, Value::Object(module), &())?;
        Ok(module)
    }

    pub fn core_module(&self) -> Option<ObjectRef> {
        self.heap.dict_get(self.modules, Value::NULL)?.as_object()
    }

    /// Create and register a named module, replacing any module of the same
    /// name.
    pub fn register_module(&mut self, name: &str) -> Result<ObjectRef, AllocError> {
        let module = self.heap.alloc_module(Some(name), &())?;
        let key = self.module_name(module);
        self.heap
            .dict_try_set(self.modules, key, Value::Object(module), &())?;
        Ok(module)
    }

    pub fn find_module(&self, name: &str) -> Option<ObjectRef> {
        // A name that was never interned cannot be a registered key.
        let key = Value::Object(self.heap.interned(name)?);
        self.heap.dict_get(self.modules, key)?.as_object()
    }

    pub fn unregister_module(&mut self, name: &str) -> Option<ObjectRef> {
        let key = Value::Object(self.heap.interned(name)?);
        self.heap.dict_remove(self.modules, key, &()).as_object()
    }

    /// Collect everything not reachable from the module registry.
    pub fn collect_garbage(&mut self) {
        self.heap.collect_garbage(&());
    }

    fn module_name(&self, module: ObjectRef) -> Value {
        match self.heap.get(module).map(Object::kind) {
            Some(ObjectKind::Module(m)) => m.name().map_or(Value::NULL, Value::Object),
            _ => Value::NULL,
        }
    }
}
