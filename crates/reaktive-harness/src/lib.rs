#![forbid(unsafe_code)]

//! Test harness for reaktive.
//!
//! - [`SetRecorder`] / [`ListRecorder`]: observe a collection, replay every
//!   change onto a plain mirror and keep the change log.
//! - [`SetMutation`] / [`ListMutation`]: scripted mutations of root
//!   collections, with [`proptest`] strategies to generate them.
//! - [`naive`]: from-scratch recomputation of every view, used as the
//!   oracle in property tests.
//!
//! # Invariants Checked
//!
//! A recorder's mirror equals its collection's `now()` after every
//! top-level mutation, and its log never holds a redundant change (an
//! `Added` for a present element or a `Removed` for an absent one).

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashSet;
use proptest::prelude::*;
use reaktive::{ListChange, MutableReactiveList, MutableReactiveSet, Observer, ReactiveList, ReactiveSet};

// ---------------------------------------------------------------------------
// SetRecorder
// ---------------------------------------------------------------------------

struct SetLog<E> {
    mirror: AHashSet<E>,
    changes: Vec<(bool, E)>,
    redundant: usize,
}

/// Mirrors a reactive set from its change stream.
pub struct SetRecorder<E> {
    set: ReactiveSet<E>,
    log: Rc<RefCell<SetLog<E>>>,
    _observer: Observer,
}

impl<E: Clone + Eq + Hash + fmt::Debug + 'static> SetRecorder<E> {
    /// Start recording `set`; the mirror starts from its current elements.
    pub fn new(set: &ReactiveSet<E>) -> Self {
        let log = Rc::new(RefCell::new(SetLog {
            mirror: set.now(),
            changes: Vec::new(),
            redundant: 0,
        }));
        let sink = Rc::clone(&log);
        let observer = set.observe(move |change| {
            let mut log = sink.borrow_mut();
            let element = change.element().clone();
            let effective = if change.is_added() {
                log.mirror.insert(element.clone())
            } else {
                log.mirror.remove(&element)
            };
            if !effective {
                tracing::warn!(?element, added = change.is_added(), "redundant set change");
                log.redundant += 1;
            }
            log.changes.push((change.is_added(), element));
        });
        Self {
            set: set.clone(),
            log,
            _observer: observer,
        }
    }

    /// The elements rebuilt from the changes seen so far.
    pub fn mirror(&self) -> AHashSet<E> {
        self.log.borrow().mirror.clone()
    }

    /// Every change seen so far as `(added, element)`.
    pub fn changes(&self) -> Vec<(bool, E)> {
        self.log.borrow().changes.clone()
    }

    /// Forget the change log; the mirror is kept.
    pub fn clear_changes(&self) {
        self.log.borrow_mut().changes.clear();
    }

    /// Number of changes that did not alter the mirror.
    pub fn redundant(&self) -> usize {
        self.log.borrow().redundant
    }

    /// Check the mirror against the recorded set's current contents.
    ///
    /// # Errors
    ///
    /// A description of the mismatch or of redundant changes.
    pub fn check(&self) -> Result<(), String> {
        let log = self.log.borrow();
        let actual = self.set.now();
        if log.mirror != actual {
            return Err(format!(
                "mirror diverged: mirror {:?}, set {:?}",
                sorted_debug(&log.mirror),
                sorted_debug(&actual)
            ));
        }
        if log.redundant > 0 {
            return Err(format!("{} redundant changes", log.redundant));
        }
        Ok(())
    }
}

fn sorted_debug<E: fmt::Debug>(set: &AHashSet<E>) -> Vec<String> {
    let mut out: Vec<String> = set.iter().map(|e| format!("{e:?}")).collect();
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// ListRecorder
// ---------------------------------------------------------------------------

struct ListLog<E> {
    mirror: Vec<E>,
    changes: Vec<ListChange<E>>,
}

/// Mirrors a reactive list from its change stream.
pub struct ListRecorder<E> {
    list: ReactiveList<E>,
    log: Rc<RefCell<ListLog<E>>>,
    _observer: Observer,
}

impl<E: Clone + PartialEq + fmt::Debug + 'static> ListRecorder<E> {
    /// Start recording `list`; the mirror starts from its current elements.
    pub fn new(list: &ReactiveList<E>) -> Self {
        let log = Rc::new(RefCell::new(ListLog {
            mirror: list.now(),
            changes: Vec::new(),
        }));
        let sink = Rc::clone(&log);
        let observer = list.observe(move |change| {
            let mut log = sink.borrow_mut();
            change.apply_to(&mut log.mirror);
            log.changes.push(change.clone());
        });
        Self {
            list: list.clone(),
            log,
            _observer: observer,
        }
    }

    /// The elements rebuilt from the changes seen so far.
    pub fn mirror(&self) -> Vec<E> {
        self.log.borrow().mirror.clone()
    }

    /// Every change seen so far.
    pub fn changes(&self) -> Vec<ListChange<E>> {
        self.log.borrow().changes.clone()
    }

    /// Forget the change log; the mirror is kept.
    pub fn clear_changes(&self) {
        self.log.borrow_mut().changes.clear();
    }

    /// Check the mirror against the recorded list's current contents.
    ///
    /// # Errors
    ///
    /// A description of the mismatch.
    pub fn check(&self) -> Result<(), String> {
        let log = self.log.borrow();
        let actual = self.list.now();
        if log.mirror == actual {
            Ok(())
        } else {
            Err(format!("mirror diverged: mirror {:?}, list {:?}", log.mirror, actual))
        }
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// One scripted mutation of a [`MutableReactiveSet`].
#[derive(Clone, Debug)]
pub enum SetMutation<E> {
    Add(E),
    Remove(E),
    AddAll(Vec<E>),
    RemoveAll(Vec<E>),
    Clear,
}

impl<E: Clone + Eq + Hash + fmt::Debug + 'static> SetMutation<E> {
    /// Apply to `set`.
    pub fn apply(&self, set: &MutableReactiveSet<E>) {
        tracing::trace!(mutation = ?self, "apply set mutation");
        match self {
            Self::Add(e) => {
                set.add(e.clone());
            }
            Self::Remove(e) => {
                set.remove(e);
            }
            Self::AddAll(es) => {
                set.add_all(es.iter().cloned());
            }
            Self::RemoveAll(es) => {
                set.remove_all(es);
            }
            Self::Clear => set.clear(),
        }
    }

    /// Apply to a plain set.
    pub fn apply_naive(&self, set: &mut AHashSet<E>) {
        match self {
            Self::Add(e) => {
                set.insert(e.clone());
            }
            Self::Remove(e) => {
                set.remove(e);
            }
            Self::AddAll(es) => set.extend(es.iter().cloned()),
            Self::RemoveAll(es) => {
                for e in es {
                    set.remove(e);
                }
            }
            Self::Clear => set.clear(),
        }
    }
}

/// One scripted mutation of a [`MutableReactiveList`].
///
/// Indices are taken modulo the list length (plus one for insertion), so
/// every generated mutation is in range.
#[derive(Clone, Debug)]
pub enum ListMutation<E> {
    Push(E),
    Insert(usize, E),
    RemoveAt(usize),
    Set(usize, E),
    RemoveValue(E),
    InsertAll(usize, Vec<E>),
    Clear,
}

impl<E: Clone + PartialEq + fmt::Debug + 'static> ListMutation<E> {
    /// Apply to `list`.
    pub fn apply(&self, list: &MutableReactiveList<E>) {
        tracing::trace!(mutation = ?self, "apply list mutation");
        let len = list.with(<[E]>::len);
        match self {
            Self::Push(e) => list.add(e.clone()),
            Self::Insert(i, e) => {
                list.add_at(i % (len + 1), e.clone());
            }
            Self::RemoveAt(i) if len > 0 => {
                list.remove_at(i % len);
            }
            Self::Set(i, e) if len > 0 => {
                list.set(i % len, e.clone());
            }
            Self::RemoveValue(e) => {
                list.remove(e);
            }
            Self::InsertAll(i, es) => {
                list.add_all_at(i % (len + 1), es.iter().cloned());
            }
            Self::Clear => list.clear(),
            Self::RemoveAt(_) | Self::Set(..) => {}
        }
    }

    /// Apply to a plain vector.
    pub fn apply_naive(&self, list: &mut Vec<E>) {
        let len = list.len();
        match self {
            Self::Push(e) => list.push(e.clone()),
            Self::Insert(i, e) => list.insert(i % (len + 1), e.clone()),
            Self::RemoveAt(i) if len > 0 => {
                list.remove(i % len);
            }
            Self::Set(i, e) if len > 0 => list[i % len] = e.clone(),
            Self::RemoveValue(e) => {
                if let Some(index) = list.iter().position(|x| x == e) {
                    list.remove(index);
                }
            }
            Self::InsertAll(i, es) => {
                let at = i % (len + 1);
                list.splice(at..at, es.iter().cloned());
            }
            Self::Clear => list.clear(),
            Self::RemoveAt(_) | Self::Set(..) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Small element domain so that mutations collide often.
pub fn element() -> impl Strategy<Value = u8> {
    0u8..24
}

/// A single set mutation over [`element`]s.
pub fn set_mutation() -> impl Strategy<Value = SetMutation<u8>> {
    prop_oneof![
        4 => element().prop_map(SetMutation::Add),
        3 => element().prop_map(SetMutation::Remove),
        1 => proptest::collection::vec(element(), 0..6).prop_map(SetMutation::AddAll),
        1 => proptest::collection::vec(element(), 0..6).prop_map(SetMutation::RemoveAll),
        1 => Just(SetMutation::Clear),
    ]
}

/// A script of set mutations.
pub fn set_script(max_len: usize) -> impl Strategy<Value = Vec<SetMutation<u8>>> {
    proptest::collection::vec(set_mutation(), 0..max_len)
}

/// A single list mutation over [`element`]s.
pub fn list_mutation() -> impl Strategy<Value = ListMutation<u8>> {
    prop_oneof![
        3 => element().prop_map(ListMutation::Push),
        3 => (any::<usize>(), element()).prop_map(|(i, e)| ListMutation::Insert(i, e)),
        3 => any::<usize>().prop_map(ListMutation::RemoveAt),
        2 => (any::<usize>(), element()).prop_map(|(i, e)| ListMutation::Set(i, e)),
        1 => element().prop_map(ListMutation::RemoveValue),
        1 => (any::<usize>(), proptest::collection::vec(element(), 0..4))
            .prop_map(|(i, es)| ListMutation::InsertAll(i, es)),
        1 => Just(ListMutation::Clear),
    ]
}

/// A script of list mutations.
pub fn list_script(max_len: usize) -> impl Strategy<Value = Vec<ListMutation<u8>>> {
    proptest::collection::vec(list_mutation(), 0..max_len)
}

// ---------------------------------------------------------------------------
// Naive oracles
// ---------------------------------------------------------------------------

/// From-scratch recomputation of every view.
pub mod naive {
    use std::hash::Hash;

    use ahash::AHashSet;

    pub fn map<E, U: Eq + Hash>(set: &AHashSet<E>, f: impl Fn(&E) -> U) -> AHashSet<U> {
        set.iter().map(f).collect()
    }

    pub fn filter<E: Clone + Eq + Hash>(set: &AHashSet<E>, p: impl Fn(&E) -> bool) -> AHashSet<E> {
        set.iter().filter(|e| p(e)).cloned().collect()
    }

    pub fn union<E: Clone + Eq + Hash>(a: &AHashSet<E>, b: &AHashSet<E>) -> AHashSet<E> {
        a.union(b).cloned().collect()
    }

    pub fn difference<E: Clone + Eq + Hash>(a: &AHashSet<E>, b: &AHashSet<E>) -> AHashSet<E> {
        a.difference(b).cloned().collect()
    }

    pub fn intersection<E: Clone + Eq + Hash>(a: &AHashSet<E>, b: &AHashSet<E>) -> AHashSet<E> {
        a.intersection(b).cloned().collect()
    }

    pub fn flatten<'a, E: Clone + Eq + Hash + 'a>(
        parts: impl IntoIterator<Item = &'a AHashSet<E>>,
    ) -> AHashSet<E> {
        parts.into_iter().flatten().cloned().collect()
    }

    pub fn list_map<E, U>(list: &[E], f: impl Fn(&E) -> U) -> Vec<U> {
        list.iter().map(f).collect()
    }

    pub fn list_filter<E: Clone>(list: &[E], p: impl Fn(&E) -> bool) -> Vec<E> {
        list.iter().filter(|e| p(e)).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
