#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reaktive::{ReactiveCollection, ReactiveValue, reactive_set};

#[derive(Arbitrary, Debug)]
enum Op {
    Add { left: bool, value: u8 },
    Remove { left: bool, value: u8 },
    AddAll { left: bool, values: Vec<u8> },
    Clear { left: bool },
    DropOuterPart,
    RestoreOuterPart,
}

fuzz_target!(|ops: Vec<Op>| {
    let left = reactive_set(Vec::<u8>::new());
    let right = reactive_set(Vec::<u8>::new());
    let union = &left + &right;
    let difference = &left - &right;
    let intersection = left.intersect(&right);
    let mapped = union.map(|v| v / 4);
    let outer = reactive_set([left.as_set(), right.as_set()]);
    let flat = outer.flatten();
    let total = union.fold_with_inverse(0u32, |a, v| a + u32::from(*v), |a, v| a - u32::from(*v));

    let mut right_in_outer = true;
    for op in ops.iter().take(512) {
        match op {
            Op::Add { left: l, value } => {
                if *l { left.add(*value) } else { right.add(*value) };
            }
            Op::Remove { left: l, value } => {
                if *l { left.remove(value) } else { right.remove(value) };
            }
            Op::AddAll { left: l, values } => {
                let target = if *l { &left } else { &right };
                target.add_all(values.iter().copied().take(32));
            }
            Op::Clear { left: l } => {
                if *l { left.clear() } else { right.clear() }
            }
            Op::DropOuterPart => {
                outer.remove(&right.as_set());
                right_in_outer = false;
            }
            Op::RestoreOuterPart => {
                outer.add(right.as_set());
                right_in_outer = true;
            }
        }

        let l: HashSet<u8> = left.now().into_iter().collect();
        let r: HashSet<u8> = right.now().into_iter().collect();

        let u: HashSet<u8> = union.now().into_iter().collect();
        assert_eq!(u, l.union(&r).copied().collect::<HashSet<u8>>());
        let d: HashSet<u8> = difference.now().into_iter().collect();
        assert_eq!(d, l.difference(&r).copied().collect::<HashSet<u8>>());
        let i: HashSet<u8> = intersection.now().into_iter().collect();
        assert_eq!(i, l.intersection(&r).copied().collect::<HashSet<u8>>());
        let m: HashSet<u8> = mapped.now().into_iter().collect();
        assert_eq!(m, u.iter().map(|v| v / 4).collect::<HashSet<u8>>());

        let mut expected_flat = l.clone();
        if right_in_outer {
            expected_flat.extend(r.iter().copied());
        }
        let f: HashSet<u8> = flat.now().into_iter().collect();
        assert_eq!(f, expected_flat);
        assert_eq!(total.now(), u.iter().map(|v| u32::from(*v)).sum::<u32>());
    }
});
