#![cfg(test)]

// Property tests for Dictionary kept inside the crate so they can use the
// scripted test allocator and inspect capacity accounting.

use crate::context::KeyContext;
use crate::dict::{Dictionary, ENTRY_BYTES, LOAD_FACTOR, MIN_CAPACITY};
use crate::test_support::{const_hash, TestContext};
use crate::value::Value;
use proptest::prelude::*;
use std::collections::HashMap;

// Pool-indexed operations: indices shrink toward earlier keys, op lists
// shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Set(usize, i64),
    TrySet(usize, i64),
    Remove(usize),
    Get(usize),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<i64>, Vec<Op>)> {
    proptest::collection::hash_set(-200i64..200, 1..=40).prop_flat_map(|pool| {
        let pool: Vec<i64> = pool.into_iter().collect();
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i64>()).prop_map(|(i, v)| Op::Set(i, v)),
            1 => (idx.clone(), any::<i64>()).prop_map(|(i, v)| Op::TrySet(i, v)),
            3 => idx.clone().prop_map(Op::Remove),
            2 => idx.clone().prop_map(Op::Get),
        ];
        proptest::collection::vec(op, 1..200).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn valid_capacity(c: usize) -> bool {
    c == 0 || (c >= MIN_CAPACITY && (c / MIN_CAPACITY).is_power_of_two() && c % MIN_CAPACITY == 0)
}

/// Drive `sut` with `ops` and check it against a `HashMap` model.
///
/// With `budget` set, allocations start failing after that many succeed;
/// a `set` may then be dropped, in which case the key must not have been
/// present before.
fn run(
    cx: &mut TestContext,
    pool: &[i64],
    ops: Vec<Op>,
    budget: Option<usize>,
) -> Result<(), TestCaseError> {
    if let Some(n) = budget {
        cx.fail_after(n);
    }
    let mut sut = Dictionary::new();
    let mut model: HashMap<i64, i64> = HashMap::new();

    for op in ops {
        match op {
            Op::Set(i, v) => {
                let k = pool[i];
                sut.set(cx, Value::Integer(k), Value::Integer(v));
                match sut.get(&*cx, Value::Integer(k)) {
                    Some(got) => {
                        prop_assert_eq!(got, Value::Integer(v));
                        model.insert(k, v);
                    }
                    None => {
                        prop_assert!(budget.is_some(), "set dropped without allocation failure");
                        prop_assert!(!model.contains_key(&k), "overwrite must never be dropped");
                    }
                }
                if cx.failed_allocations == 0 {
                    prop_assert!(sut.len() <= sut.capacity() * LOAD_FACTOR / 1024);
                }
            }
            Op::TrySet(i, v) => {
                let k = pool[i];
                let len = sut.len();
                match sut.try_set(cx, Value::Integer(k), Value::Integer(v)) {
                    Ok(()) => {
                        prop_assert_eq!(sut.get(&*cx, Value::Integer(k)), Some(Value::Integer(v)));
                        model.insert(k, v);
                    }
                    Err(_) => {
                        prop_assert!(budget.is_some());
                        prop_assert_eq!(sut.len(), len);
                        prop_assert!(!model.contains_key(&k));
                    }
                }
            }
            Op::Remove(i) => {
                let k = pool[i];
                let got = sut.remove(cx, Value::Integer(k));
                let expected = model.remove(&k).map_or(Value::NULL, Value::Integer);
                prop_assert_eq!(got, expected);
            }
            Op::Get(i) => {
                let k = pool[i];
                let got = sut.get(&*cx, Value::Integer(k));
                prop_assert_eq!(got, model.get(&k).copied().map(Value::Integer));
            }
        }

        // Post-conditions after each op
        prop_assert_eq!(sut.len(), model.len());
        prop_assert!(sut.len() <= sut.capacity());
        prop_assert!(valid_capacity(sut.capacity()), "capacity {}", sut.capacity());
        prop_assert_eq!(cx.allocated_bytes, sut.capacity() * ENTRY_BYTES);
        prop_assert_eq!(sut.iter().count(), model.len());
        prop_assert!(cx.roots.is_empty());
    }

    for &k in pool {
        let expected = model.get(&k).copied().map(Value::Integer);
        prop_assert_eq!(sut.get(&*cx, Value::Integer(k)), expected);
        prop_assert_eq!(sut.contains_key(&*cx, Value::Integer(k)), expected.is_some());
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - `get` after `set` returns the value just written.
// - `remove` returns the stored value or `Null`, and absent keys stay absent.
// - count <= capacity * 0.75 after every `set` when no allocation failed.
// - capacity is 0 or 16 * 2^n, and accounted bytes match the entry array.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut cx = TestContext::new();
        run(&mut cx, &pool, ops, None)?;
    }
}

// Property: same invariants when every key shares one home slot, so all
// behavior rests on equality probing and tombstone handling.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let mut cx = TestContext::with_hash(const_hash);
        prop_assert_eq!(cx.hash_key(Value::Integer(pool[0])), 0);
        run(&mut cx, &pool, ops, None)?;
    }
}

// Property: with allocations failing after a random point, operations never
// panic, overwrites are never lost, and the model agrees on every key.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_allocation_failures(
        (pool, ops) in arb_scenario(),
        budget in 0usize..4,
    ) {
        let mut cx = TestContext::new();
        run(&mut cx, &pool, ops, Some(budget))?;
    }
}
