#![cfg(test)]

// Model-based property tests for ConcurrentSet kept inside the crate so
// they can check internal state (instance ids) alongside the public API.

use crate::concurrent_set::{ConcurrentSet, LocalSet};
use parking_lot::lock_api::RawRwLock;
use proptest::prelude::*;
use std::collections::hash_map::RandomState;
use std::collections::BTreeSet;

// Pool-indexed operations: indices shrink to earlier values, op lists shrink
// in length.
#[derive(Clone, Debug)]
enum Op {
    Add(Vec<usize>),
    AddIfAbsent(usize),
    Remove(usize),
    Contains(usize),
    Clear,
    Pop,
    Walk(u8),
    Snapshot,
}

fn arb_op(pool: usize) -> impl Strategy<Value = Op> {
    let idx = 0..pool;
    prop_oneof![
        4 => proptest::collection::vec(idx.clone(), 0..6).prop_map(Op::Add),
        2 => idx.clone().prop_map(Op::AddIfAbsent),
        3 => idx.clone().prop_map(Op::Remove),
        3 => idx.prop_map(Op::Contains),
        1 => Just(Op::Clear),
        1 => Just(Op::Pop),
        1 => (1u8..4).prop_map(Op::Walk),
        2 => Just(Op::Snapshot),
    ]
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=12).prop_flat_map(|pool| (Just(pool), proptest::collection::vec(arb_op(pool), 1..80)))
}

fn run_against_model<R>(s: &ConcurrentSet<u32, RandomState, R>, ops: Vec<Op>) -> Result<(), TestCaseError>
where
    R: RawRwLock,
{
    let mut model: BTreeSet<u32> = BTreeSet::new();
    for op in ops {
        match op {
            Op::Add(items) => {
                let items: Vec<u32> = items.into_iter().map(|i| i as u32).collect();
                s.add(items.iter().copied());
                model.extend(items);
            }
            Op::AddIfAbsent(i) => {
                let inserted = s.add_if_absent(i as u32);
                prop_assert_eq!(inserted, model.insert(i as u32));
            }
            Op::Remove(i) => {
                s.remove(&(i as u32));
                model.remove(&(i as u32));
            }
            Op::Contains(i) => {
                prop_assert_eq!(s.contains(&(i as u32)), model.contains(&(i as u32)));
            }
            Op::Clear => {
                s.clear();
                model.clear();
            }
            Op::Pop => match s.pop() {
                Some(x) => {
                    prop_assert!(model.remove(&x));
                }
                None => {
                    prop_assert!(model.is_empty());
                }
            },
            Op::Walk(d) => {
                s.walk(|x| x / d as u32);
                model = model.iter().map(|x| x / d as u32).collect();
            }
            Op::Snapshot => {
                let snap = s.to_vec();
                prop_assert_eq!(snap.len(), s.len());
                prop_assert!(snap.iter().all(|x| s.contains(x)));
                let as_set: BTreeSet<u32> = snap.into_iter().collect();
                prop_assert_eq!(&as_set, &model);
            }
        }
        prop_assert_eq!(s.len(), model.len());
        prop_assert_eq!(s.is_empty(), model.is_empty());
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_synchronized_set_matches_model((_pool, ops) in arb_scenario()) {
        let s: ConcurrentSet<u32> = ConcurrentSet::new();
        run_against_model(&s, ops)?;
    }

    #[test]
    fn prop_local_set_matches_model((_pool, ops) in arb_scenario()) {
        let s: LocalSet<u32> = ConcurrentSet::unsynchronized();
        run_against_model(&s, ops)?;
    }

    #[test]
    fn prop_derived_sets_get_fresh_ids(a in proptest::collection::vec(0u8..20, 0..10), b in proptest::collection::vec(0u8..20, 0..10)) {
        let a: ConcurrentSet<u8> = a.into_iter().collect();
        let b: ConcurrentSet<u8> = b.into_iter().collect();
        let derived = [a.union(&[&b]), a.diff(&[&b]), a.intersect(&[&b]), a.complement(&b), a.clone()];
        let mut ids: BTreeSet<u64> = derived.iter().map(|d| d.id).collect();
        ids.insert(a.id);
        ids.insert(b.id);
        prop_assert_eq!(ids.len(), derived.len() + 2);
    }
}
