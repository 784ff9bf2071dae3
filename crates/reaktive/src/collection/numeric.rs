#![forbid(unsafe_code)]

//! Folding bindings over collections.

use std::rc::Rc;

use super::ReactiveCollection;
use crate::value::{Binding, binding};

pub(super) fn fold_with_inverse<E, C, T>(
    collection: &C,
    initial: T,
    op: impl Fn(&T, &E) -> T + 'static,
    inverse: impl Fn(&T, &E) -> T + 'static,
) -> Binding<T>
where
    E: Clone + 'static,
    C: ReactiveCollection<E>,
    T: Clone + PartialEq + 'static,
{
    let initial = collection
        .elements()
        .iter()
        .fold(initial, |acc, e| op(&acc, e));
    let source = collection.clone();
    binding(initial, move |ctx| {
        let (on_added, on_removed) = (ctx.clone(), ctx.clone());
        ctx.add_observer(source.observe_collection(
            move |e| {
                on_added.update(|acc| op(acc, e));
            },
            move |e| {
                on_removed.update(|acc| inverse(acc, e));
            },
        ));
        ctx.anchor(source);
    })
}

pub(super) fn fold<E, C, T>(collection: &C, initial: T, op: impl Fn(T, &E) -> T + 'static) -> Binding<T>
where
    E: Clone + 'static,
    C: ReactiveCollection<E>,
    T: Clone + PartialEq + 'static,
{
    let source = collection.clone();
    let compute: Rc<dyn Fn() -> T> = Rc::new(move || {
        source
            .elements()
            .iter()
            .fold(initial.clone(), |acc, e| op(acc, e))
    });
    let source = collection.clone();
    binding(compute(), move |ctx| {
        let (on_added, added_compute) = (ctx.clone(), Rc::clone(&compute));
        let on_removed = ctx.clone();
        ctx.add_observer(source.observe_collection(
            move |_| {
                on_added.set(added_compute());
            },
            move |_| {
                on_removed.set(compute());
            },
        ));
        ctx.anchor(source);
    })
}

#[cfg(test)]
mod tests {
    use crate::collection::ReactiveCollection;
    use crate::list::reactive_list;
    use crate::set::reactive_set;
    use crate::value::ReactiveValue;

    #[test]
    fn sum_of_set() {
        let set = reactive_set([1, 2, 3, 4]);
        let sum = set.sum();
        assert_eq!(sum.now(), 10);

        set.add(7);
        assert_eq!(sum.now(), 17);
        set.add(-3);
        assert_eq!(sum.now(), 14);
        set.remove(&4);
        assert_eq!(sum.now(), 10);
        set.remove(&-3);
        assert_eq!(sum.now(), 13);
        set.add(7);
        assert_eq!(sum.now(), 13);
    }

    #[test]
    fn sum_of_list_follows_replacement_and_clear() {
        let list = reactive_list([1.5, 2.5]);
        let sum = list.sum();
        assert_eq!(sum.now(), 4.0);
        list.set(0, 10.0);
        assert_eq!(sum.now(), 12.5);
        list.clear();
        assert_eq!(sum.now(), 0.0);
    }

    #[test]
    fn fold_with_inverse_tracks_total_length() {
        let words = reactive_list(["a", "bcd"]);
        let total = words.fold_with_inverse(0usize, |acc, w| acc + w.len(), |acc, w| acc - w.len());
        assert_eq!(total.now(), 4);
        words.add("ef");
        words.remove_at(0);
        assert_eq!(total.now(), 5);
    }

    #[test]
    fn fold_rescans_on_change() {
        let set = reactive_set([3, 8, 1]);
        let max = set.fold(i32::MIN, |acc, e| acc.max(*e));
        assert_eq!(max.now(), 8);
        set.remove(&8);
        assert_eq!(max.now(), 3);
        set.add(12);
        assert_eq!(max.now(), 12);
    }
}
