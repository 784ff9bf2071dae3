#![forbid(unsafe_code)]

//! Property-based invariant tests for mutations made from inside handlers.
//!
//! A handler on the root reacts to every small element it sees added by
//! adding a twin (`e + 100`) to the same root and an echo to a second root,
//! and to every removal by dropping the twin again. For **any** script:
//!
//! 1. Every view equals its recomputation over the roots' actual contents
//!    after each top-level mutation, and its change stream replays it.
//! 2. Inside the handler, right after an effective mutation of the root
//!    returned, the views it reads are already consistent.
//! 3. Every small element of the root has been echoed.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;
use proptest::prelude::*;
use reaktive::{
    ListChange, ReactiveCollection, ReactiveValue, SetChange, reactive_list, reactive_set,
};
use reaktive_harness::{ListRecorder, SetRecorder, element, list_script, naive, set_script};

const TWIN: u8 = 100;

// ── Strategies ──────────────────────────────────────────────────────────

fn initial() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(element(), 0..8)
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn total(elements: impl IntoIterator<Item = u8>) -> u64 {
    elements.into_iter().map(u64::from).sum()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Sets
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn set_views_settle_under_handler_mutations(start in initial(), script in set_script(40)) {
        let root = reactive_set(start.clone());
        let echo = reactive_set(start);
        let union = &root + &echo;
        let difference = &root - &echo;
        let halves = union.map(|e| e / 2);
        let sum = union.fold_with_inverse(0u64, |a, e| a + u64::from(*e), |a, e| a - u64::from(*e));

        let rec_union = SetRecorder::new(&union);
        let rec_difference = SetRecorder::new(&difference);
        let rec_halves = SetRecorder::new(&halves);

        let settled_inside = Rc::new(RefCell::new(Vec::new()));
        let (r, e, u, s, seen) = (
            root.clone(),
            echo.clone(),
            union.clone(),
            sum.clone(),
            Rc::clone(&settled_inside),
        );
        let _reaction = root.observe(move |change| match change {
            SetChange::Added { element, .. } if *element < TWIN => {
                e.add(*element);
                if r.add(element + TWIN) {
                    let expected = naive::union(&r.now(), &e.now());
                    seen.borrow_mut().push(u.now() == expected && s.now() == total(expected));
                }
            }
            SetChange::Removed { element, .. } if *element < TWIN => {
                r.remove(&(element + TWIN));
            }
            _ => {}
        });

        for mutation in &script {
            mutation.apply(&root);

            let (now, echoed) = (root.now(), echo.now());
            let expected_union = naive::union(&now, &echoed);
            prop_assert_eq!(&rec_union.mirror(), &expected_union);
            prop_assert_eq!(&rec_difference.mirror(), &naive::difference(&now, &echoed));
            prop_assert_eq!(&rec_halves.mirror(), &naive::map(&expected_union, |e| e / 2));
            prop_assert_eq!(sum.now(), total(expected_union.iter().copied()));
            for recorder in [&rec_union, &rec_difference] {
                recorder.check().map_err(TestCaseError::fail)?;
            }
            rec_halves.check().map_err(TestCaseError::fail)?;
            prop_assert_eq!(rec_union.redundant(), 0);

            let small: AHashSet<u8> = now.iter().copied().filter(|e| *e < TWIN).collect();
            prop_assert!(small.is_subset(&echoed), "unechoed elements in {:?}", now);
        }
        prop_assert!(settled_inside.borrow().iter().all(|settled| *settled));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Lists
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn list_views_settle_under_handler_mutations(start in initial(), script in list_script(40)) {
        let list = reactive_list(start.clone());
        let echo = reactive_list(start);
        let mapped = list.map(|e| u32::from(*e) * 3);
        let filtered = list.filter(|e| e % 2 == 1);
        let expanded = list.flat_map(|e| reactive_list(vec![*e; usize::from(*e % 3)]));
        let sum = list.fold_with_inverse(0u64, |a, e| a + u64::from(*e), |a, e| a - u64::from(*e));

        let rec_list = ListRecorder::new(&list);
        let rec_mapped = ListRecorder::new(&mapped);
        let rec_filtered = ListRecorder::new(&filtered);
        let rec_expanded = ListRecorder::new(&expanded);

        let settled_inside = Rc::new(RefCell::new(Vec::new()));
        let (l, e, f, s, seen) = (
            list.clone(),
            echo.clone(),
            filtered.clone(),
            sum.clone(),
            Rc::clone(&settled_inside),
        );
        let _reaction = list.observe(move |change| match change {
            ListChange::Added { element, .. } if *element < TWIN => {
                l.add_at(0, element + TWIN);
                e.add(*element);
                let now = l.now();
                seen.borrow_mut().push(
                    f.now() == naive::list_filter(&now, |e| e % 2 == 1) && s.now() == total(now),
                );
            }
            ListChange::Removed { element, .. } if *element < TWIN => {
                l.remove(&(element + TWIN));
            }
            _ => {}
        });

        for mutation in &script {
            mutation.apply(&list);

            let now = list.now();
            prop_assert_eq!(rec_list.mirror(), now.clone());
            prop_assert_eq!(rec_mapped.mirror(), naive::list_map(&now, |e| u32::from(*e) * 3));
            prop_assert_eq!(rec_filtered.mirror(), naive::list_filter(&now, |e| e % 2 == 1));
            let flat: Vec<u8> = now
                .iter()
                .flat_map(|e| std::iter::repeat_n(*e, usize::from(*e % 3)))
                .collect();
            prop_assert_eq!(rec_expanded.mirror(), flat);
            prop_assert_eq!(sum.now(), total(now.iter().copied()));
            for recorder in [&rec_list, &rec_filtered, &rec_expanded] {
                recorder.check().map_err(TestCaseError::fail)?;
            }
            rec_mapped.check().map_err(TestCaseError::fail)?;
        }
        prop_assert!(settled_inside.borrow().iter().all(|settled| *settled));
    }
}
