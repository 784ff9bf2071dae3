#![forbid(unsafe_code)]

//! Existence bindings: `all`, `count` and the queries built on them.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;

use super::ReactiveCollection;
use crate::observer::Observer;
use crate::value::{Binding, BindingContext, ReactiveValue, binding};

pub(super) fn count<E, C>(collection: &C, predicate: impl Fn(&E) -> bool + 'static) -> Binding<usize>
where
    E: Clone + 'static,
    C: ReactiveCollection<E>,
{
    let initial = collection.elements().iter().filter(|e| predicate(e)).count();
    let source = collection.clone();
    binding(initial, move |ctx| {
        let predicate = Rc::new(predicate);
        let (on_added, on_removed) = (ctx.clone(), ctx.clone());
        let matches = Rc::clone(&predicate);
        ctx.add_observer(source.observe_collection(
            move |e| {
                if matches(e) {
                    on_added.update(|n| n + 1);
                }
            },
            move |e| {
                if predicate(e) {
                    on_removed.update(|n| n.saturating_sub(1));
                }
            },
        ));
        ctx.anchor(source);
    })
}

// ---------------------------------------------------------------------------
// all
// ---------------------------------------------------------------------------

struct Tracked<P> {
    fulfills: bool,
    _predicate: P,
    _observer: Observer,
}

/// Per-element predicate values of an `all` binding.
///
/// Elements are tracked per occurrence so lists with duplicates work.
struct AllState<E, P> {
    next_id: u64,
    tracked: AHashMap<u64, Tracked<P>>,
    by_element: AHashMap<E, Vec<u64>>,
    failing: usize,
}

impl<E: Eq + Hash, P> AllState<E, P> {
    fn new() -> Self {
        Self {
            next_id: 0,
            tracked: AHashMap::new(),
            by_element: AHashMap::new(),
            failing: 0,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, id: u64, element: E, entry: Tracked<P>) {
        if !entry.fulfills {
            self.failing += 1;
        }
        self.tracked.insert(id, entry);
        self.by_element.entry(element).or_default().push(id);
    }

    fn remove(&mut self, element: &E) -> Option<Tracked<P>> {
        let ids = self.by_element.get_mut(element)?;
        let id = ids.pop()?;
        if ids.is_empty() {
            self.by_element.remove(element);
        }
        let entry = self.tracked.remove(&id)?;
        if !entry.fulfills {
            self.failing -= 1;
        }
        Some(entry)
    }

    /// Record a new predicate value; `None` if the element is gone.
    fn update(&mut self, id: u64, fulfills: bool) -> Option<usize> {
        let entry = self.tracked.get_mut(&id)?;
        if entry.fulfills != fulfills {
            entry.fulfills = fulfills;
            if fulfills {
                self.failing -= 1;
            } else {
                self.failing += 1;
            }
        }
        Some(self.failing)
    }
}

fn track<E, P>(
    state: &Rc<RefCell<AllState<E, P>>>,
    ctx: &BindingContext<bool>,
    predicate: &dyn Fn(&E) -> P,
    element: E,
) where
    E: Eq + Hash + 'static,
    P: ReactiveValue<bool>,
{
    let value = predicate(&element);
    let id = state.borrow_mut().allocate();
    let (weak, target) = (Rc::downgrade(state), ctx.clone());
    let observer = value.observe(move |_, fulfills| {
        let Some(state) = weak.upgrade() else { return };
        let failing = state.borrow_mut().update(id, *fulfills);
        if let Some(failing) = failing {
            target.set(failing == 0);
        }
    });
    let entry = Tracked {
        fulfills: value.now(),
        _predicate: value,
        _observer: observer,
    };
    state.borrow_mut().insert(id, element, entry);
}

pub(super) fn all<E, C, P>(collection: &C, predicate: impl Fn(&E) -> P + 'static) -> Binding<bool>
where
    E: Clone + Eq + Hash + 'static,
    C: ReactiveCollection<E>,
    P: ReactiveValue<bool>,
{
    let state: Rc<RefCell<AllState<E, P>>> = Rc::new(RefCell::new(AllState::new()));
    let predicate: Rc<dyn Fn(&E) -> P> = Rc::new(predicate);
    binding(true, |ctx| {
        for element in collection.elements() {
            track(&state, ctx, &*predicate, element);
        }
        let failing = state.borrow().failing;
        ctx.set(failing == 0);

        let (on_added, added_state) = (ctx.clone(), Rc::downgrade(&state));
        let (on_removed, removed_state) = (ctx.clone(), Rc::downgrade(&state));
        ctx.add_observer(collection.observe_collection(
            move |e| {
                let Some(state) = added_state.upgrade() else { return };
                track(&state, &on_added, &*predicate, e.clone());
                let failing = state.borrow().failing;
                on_added.set(failing == 0);
            },
            move |e| {
                let Some(state) = removed_state.upgrade() else { return };
                let (entry, failing) = {
                    let mut state = state.borrow_mut();
                    (state.remove(e), state.failing)
                };
                drop(entry);
                on_removed.set(failing == 0);
            },
        ));
        ctx.anchor(state);
        ctx.anchor(collection.clone());
    })
}
