// Module registry on top of the dictionary.
use chalk_dict::object::ObjectKind;
use chalk_dict::{AllocError, HeapLimits, Value, Vm};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn core_module_is_registered_under_null() {
    init_logging();
    let mut vm = Vm::new(HeapLimits::default()).unwrap();
    assert_eq!(vm.core_module(), None);

    let core = vm.initialize_core().unwrap();
    assert_eq!(vm.core_module(), Some(core));
    assert_eq!(vm.module_count(), 1);
    assert_eq!(
        vm.heap().dict_get(vm.modules(), Value::NULL),
        Some(Value::Object(core))
    );
    match vm.heap().get(core).map(|o| o.kind()) {
        Some(ObjectKind::Module(m)) => assert_eq!(m.name(), None),
        other => panic!("core is not a module: {:?}", other),
    }
}

#[test]
fn named_modules_are_found_by_text() {
    init_logging();
    let mut vm = Vm::new(HeapLimits::default()).unwrap();
    vm.initialize_core().unwrap();
    let names: Vec<String> = (0..30).map(|i| format!("module_{}", i)).collect();
    let modules: Vec<_> = names
        .iter()
        .map(|n| vm.register_module(n).unwrap())
        .collect();

    assert_eq!(vm.module_count(), 31);
    for (name, &module) in names.iter().zip(&modules) {
        assert_eq!(vm.find_module(name), Some(module));
    }
    assert_eq!(vm.find_module("missing"), None);
}

#[test]
fn registering_again_replaces() {
    let mut vm = Vm::new(HeapLimits::default()).unwrap();
    let first = vm.register_module("io").unwrap();
    let second = vm.register_module("io").unwrap();
    assert_ne!(first, second);
    assert_eq!(vm.module_count(), 1);
    assert_eq!(vm.find_module("io"), Some(second));
}

#[test]
fn unregister_then_collect() {
    init_logging();
    let mut vm = Vm::new(HeapLimits::new(usize::MAX, 0)).unwrap();
    let core = vm.initialize_core().unwrap();
    let math = vm.register_module("math").unwrap();
    vm.register_module("os").unwrap();

    assert_eq!(vm.unregister_module("math"), Some(math));
    assert_eq!(vm.unregister_module("math"), None);
    assert_eq!(vm.module_count(), 2);

    vm.collect_garbage();
    assert!(!vm.heap().is_live(math));
    assert!(vm.heap().is_live(core));
    assert!(vm.find_module("os").is_some());
    // The name string went with its module.
    assert_eq!(vm.heap().interned("math"), None);
    assert_eq!(vm.heap().root_depth(), 0);
}

#[test]
fn registry_reports_exhaustion() {
    // Enough for the core module and the first table, nothing more.
    let mut probe = Vm::new(HeapLimits::default()).unwrap();
    probe.initialize_core().unwrap();
    let limit = probe.heap().used_bytes();

    let mut vm = Vm::new(HeapLimits::new(limit, usize::MAX)).unwrap();
    vm.initialize_core().unwrap();
    match vm.register_module("net") {
        Err(AllocError::OutOfMemory { limit: l, .. }) => assert_eq!(l, limit),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(vm.module_count(), 1);
    assert!(vm.core_module().is_some());
}
