#![forbid(unsafe_code)]

//! Incremental list views.
//!
//! Views translate positional changes of their source into positional
//! changes of their own. Index translation only uses what the view has been
//! told so far (inclusion flags for `filter`, part lengths for `flat_map`),
//! never the live state of a source.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ListChange, MutableReactiveList, ReactiveList, WeakList};
use crate::observer::Observer;

/// Anything that can be viewed as a [`ReactiveList`].
pub trait AsReactiveList: 'static {
    /// Element type of the list.
    type Element: Clone + PartialEq + 'static;

    /// A handle to the list.
    fn as_reactive_list(&self) -> ReactiveList<Self::Element>;
}

impl<E: Clone + PartialEq + 'static> AsReactiveList for ReactiveList<E> {
    type Element = E;

    fn as_reactive_list(&self) -> ReactiveList<E> {
        self.clone()
    }
}

impl<E: Clone + PartialEq + 'static> AsReactiveList for MutableReactiveList<E> {
    type Element = E;

    fn as_reactive_list(&self) -> ReactiveList<E> {
        self.as_list()
    }
}

impl<E: Clone + PartialEq + 'static> ReactiveList<E> {
    /// A list of `f` applied to every element, position for position.
    pub fn map<U>(&self, f: impl Fn(&E) -> U + 'static) -> ReactiveList<U>
    where
        U: Clone + PartialEq + 'static,
    {
        let view = ReactiveList::from_elements(self.with(|elements| {
            elements.iter().map(&f).collect::<Vec<_>>()
        }));
        let target = view.downgrade();
        view.hold(self.observe(move |change| {
            let Some(target) = target.upgrade() else { return };
            match change {
                ListChange::Added { index, element } => {
                    target.insert(*index, f(element));
                }
                ListChange::Removed { index, .. } => {
                    target.remove_index(*index);
                }
                ListChange::Replaced { index, new, .. } => {
                    target.replace(*index, f(new));
                }
                ListChange::Cleared { .. } => {
                    target.clear_all();
                }
            }
        }));
        view.anchor(self.clone());
        tracing::trace!(view = "map", "derived list created");
        view
    }

    /// A list of the elements satisfying `predicate`, in source order.
    pub fn filter(&self, predicate: impl Fn(&E) -> bool + 'static) -> ReactiveList<E> {
        let (included, initial): (Vec<bool>, Vec<E>) = self.with(|elements| {
            let included: Vec<bool> = elements.iter().map(&predicate).collect();
            let kept = elements
                .iter()
                .zip(&included)
                .filter(|(_, keep)| **keep)
                .map(|(e, _)| e.clone())
                .collect();
            (included, kept)
        });
        let view = ReactiveList::from_elements(initial);
        let included = RefCell::new(included);
        let target = view.downgrade();
        view.hold(self.observe(move |change| {
            let Some(target) = target.upgrade() else { return };
            let position = |included: &[bool], index: usize| {
                included[..index.min(included.len())]
                    .iter()
                    .filter(|keep| **keep)
                    .count()
            };
            match change {
                ListChange::Added { index, element } => {
                    let keep = predicate(element);
                    let at = {
                        let mut included = included.borrow_mut();
                        let at = position(&included, *index);
                        let index = (*index).min(included.len());
                        included.insert(index, keep);
                        at
                    };
                    if keep {
                        target.insert(at, element.clone());
                    }
                }
                ListChange::Removed { index, .. } => {
                    let removed = {
                        let mut included = included.borrow_mut();
                        if *index >= included.len() {
                            return;
                        }
                        let at = position(&included, *index);
                        included.remove(*index).then_some(at)
                    };
                    if let Some(at) = removed {
                        target.remove_index(at);
                    }
                }
                ListChange::Replaced { index, new, .. } => {
                    let keep = predicate(new);
                    let (was, at) = {
                        let mut included = included.borrow_mut();
                        let Some(slot) = included.get_mut(*index) else { return };
                        let was = std::mem::replace(slot, keep);
                        (was, position(&included, *index))
                    };
                    match (was, keep) {
                        (true, true) => {
                            target.replace(at, new.clone());
                        }
                        (true, false) => {
                            target.remove_index(at);
                        }
                        (false, true) => {
                            target.insert(at, new.clone());
                        }
                        (false, false) => {}
                    }
                }
                ListChange::Cleared { .. } => {
                    included.borrow_mut().clear();
                    target.clear_all();
                }
            }
        }));
        view.anchor(self.clone());
        tracing::trace!(view = "filter", "derived list created");
        view
    }

    /// The concatenation of the lists `f` yields for every element.
    ///
    /// The list returned by `f` is captured when its element is inserted
    /// and observed until that element is removed or replaced.
    pub fn flat_map<L>(&self, f: impl Fn(&E) -> L + 'static) -> ReactiveList<L::Element>
    where
        L: AsReactiveList,
    {
        let view = ReactiveList::from_elements(std::iter::empty());
        let state = Rc::new(RefCell::new(Parts::new()));
        let target = view.downgrade();
        let elements = self.now();
        for (index, element) in elements.iter().enumerate() {
            let part = f(element).as_reactive_list();
            attach(&state, &target, &view, index, part);
        }

        let (weak_state, outer_target) = (Rc::downgrade(&state), view.downgrade());
        view.hold(self.observe(move |change| {
            let (Some(state), Some(view)) = (weak_state.upgrade(), outer_target.upgrade()) else {
                return;
            };
            match change {
                ListChange::Added { index, element } => {
                    let part = f(element).as_reactive_list();
                    attach(&state, &outer_target, &view, *index, part);
                }
                ListChange::Removed { index, .. } => {
                    detach(&state, &view, *index);
                }
                ListChange::Replaced { index, new, .. } => {
                    detach(&state, &view, *index);
                    let part = f(new).as_reactive_list();
                    attach(&state, &outer_target, &view, *index, part);
                }
                ListChange::Cleared { .. } => {
                    let parts = std::mem::take(&mut state.borrow_mut().parts);
                    drop(parts);
                    view.clear_all();
                }
            }
        }));
        view.anchor(state);
        view.anchor(self.clone());
        tracing::trace!(view = "flat_map", "derived list created");
        view
    }
}

// ---------------------------------------------------------------------------
// flat_map state
// ---------------------------------------------------------------------------

struct ListPart<U> {
    id: u64,
    len: usize,
    _list: ReactiveList<U>,
    _observer: Observer,
}

/// The parts of a flat-mapped list, in source order.
struct Parts<U> {
    parts: Vec<ListPart<U>>,
    next_id: u64,
}

impl<U> Parts<U> {
    fn new() -> Self {
        Self {
            parts: Vec::new(),
            next_id: 0,
        }
    }

    /// View offset of the part at `position`.
    fn offset(&self, position: usize) -> usize {
        self.parts[..position].iter().map(|p| p.len).sum()
    }

    /// Position and view offset of the part with `id`.
    fn locate(&self, id: u64) -> Option<(usize, usize)> {
        let position = self.parts.iter().position(|p| p.id == id)?;
        Some((position, self.offset(position)))
    }
}

fn attach<U: Clone + PartialEq + 'static>(
    state: &Rc<RefCell<Parts<U>>>,
    target: &WeakList<U>,
    view: &ReactiveList<U>,
    position: usize,
    part: ReactiveList<U>,
) {
    let id = {
        let mut state = state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        id
    };
    let (weak_state, target) = (Rc::downgrade(state), target.clone());
    let observer = part.observe(move |change| {
        let (Some(state), Some(target)) = (weak_state.upgrade(), target.upgrade()) else {
            return;
        };
        let offset = {
            let mut state = state.borrow_mut();
            let Some((position, offset)) = state.locate(id) else { return };
            let part = &mut state.parts[position];
            match change {
                ListChange::Added { .. } => part.len += 1,
                ListChange::Removed { .. } => part.len -= 1,
                ListChange::Replaced { .. } => {}
                ListChange::Cleared { removed } => part.len -= removed.len(),
            }
            offset
        };
        match change {
            ListChange::Added { index, element } => {
                target.insert(offset + index, element.clone());
            }
            ListChange::Removed { index, .. } => {
                target.remove_index(offset + index);
            }
            ListChange::Replaced { index, new, .. } => {
                target.replace(offset + index, new.clone());
            }
            ListChange::Cleared { removed } => {
                for _ in 0..removed.len() {
                    target.remove_index(offset);
                }
            }
        }
    });
    let elements = part.now();
    let offset = {
        let mut state = state.borrow_mut();
        let position = position.min(state.parts.len());
        let offset = state.offset(position);
        state.parts.insert(
            position,
            ListPart {
                id,
                len: elements.len(),
                _list: part,
                _observer: observer,
            },
        );
        offset
    };
    for (i, element) in elements.into_iter().enumerate() {
        view.insert(offset + i, element);
    }
}

fn detach<U: Clone + PartialEq + 'static>(
    state: &Rc<RefCell<Parts<U>>>,
    view: &ReactiveList<U>,
    position: usize,
) {
    let (part, offset) = {
        let mut state = state.borrow_mut();
        if position >= state.parts.len() {
            return;
        }
        let offset = state.offset(position);
        (state.parts.remove(position), offset)
    };
    let len = part.len;
    drop(part);
    for _ in 0..len {
        view.remove_index(offset);
    }
}
