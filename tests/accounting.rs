mod common;

use atomicref::{AtomicCell, Strong};
use common::{Tracked, TrackedHeap};
use proptest::prelude::*;

const POOL: usize = 4;

#[derive(Clone, Debug)]
enum Op {
    Get,
    Set(Option<usize>),
    SetMutable,
    CompareAndSwap(Option<usize>, Option<usize>),
    CompareAndSet(Option<usize>, Option<usize>),
    Replace(Option<usize>),
    Take,
    DropHeld,
}

fn slot() -> impl Strategy<Value = Option<usize>> {
    proptest::option::weighted(0.8, 0..POOL)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Get),
        slot().prop_map(Op::Set),
        Just(Op::SetMutable),
        (slot(), slot()).prop_map(|(e, n)| Op::CompareAndSwap(e, n)),
        (slot(), slot()).prop_map(|(e, n)| Op::CompareAndSet(e, n)),
        slot().prop_map(Op::Replace),
        Just(Op::Take),
        Just(Op::DropHeld),
    ]
}

fn same(a: Option<&Strong<Tracked>>, b: Option<&Strong<Tracked>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Strong::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every object's count equals the units the test holds plus one if the cell holds it.
    #[test]
    fn counts_match_ownership(ops in proptest::collection::vec(op(), 1..64)) {
        let heap = TrackedHeap::new();
        let pool: Vec<Strong<Tracked>> = (0..POOL).map(|_| heap.frozen()).collect();
        let pick = |index: Option<usize>| index.map(|index| &pool[index]);

        let cell = AtomicCell::empty();
        let mut model: Option<usize> = None;
        let mut held: Vec<Strong<Tracked>> = Vec::new();

        for op in ops {
            match op {
                Op::Get => held.extend(cell.get()),
                Op::Set(new) => {
                    cell.set(pick(new)).unwrap();
                    model = new;
                }
                Op::SetMutable => {
                    let mutable = heap.mutable();
                    prop_assert!(cell.set(Some(&mutable)).is_err());
                    prop_assert!(cell.compare_and_set(pick(model), Some(&mutable)).is_err());
                }
                Op::CompareAndSwap(expected, new) => {
                    let returned = cell.compare_and_swap(pick(expected), pick(new)).unwrap();
                    prop_assert!(same(returned.as_ref(), pick(model)));
                    if expected == model {
                        model = new;
                    }
                    held.extend(returned);
                }
                Op::CompareAndSet(expected, new) => {
                    let replaced = cell.compare_and_set(pick(expected), pick(new)).unwrap();
                    prop_assert_eq!(replaced, expected == model);
                    if replaced {
                        model = new;
                    }
                }
                Op::Replace(new) => {
                    let previous = cell.replace(pick(new)).unwrap();
                    prop_assert!(same(previous.as_ref(), pick(model)));
                    model = new;
                    held.extend(previous);
                }
                Op::Take => {
                    let previous = cell.take();
                    prop_assert!(same(previous.as_ref(), pick(model)));
                    model = None;
                    held.extend(previous);
                }
                Op::DropHeld => {
                    held.pop();
                }
            }

            for (index, object) in pool.iter().enumerate() {
                let in_hand = held.iter().filter(|h| Strong::ptr_eq(*h, object)).count();
                let in_cell = usize::from(model == Some(index));
                prop_assert_eq!(object.count(), (1 + in_hand + in_cell) as isize);
            }
            prop_assert!(same(cell.get().as_ref(), pick(model)));
        }

        drop(held);
        drop(cell);
        drop(pool);

        prop_assert_eq!(heap.violations(), 0);
        prop_assert_eq!(heap.outstanding(), 0);
        prop_assert_eq!(heap.balance(), 0);
        prop_assert_eq!(heap.destroyed(), heap.allocated());
    }
}
