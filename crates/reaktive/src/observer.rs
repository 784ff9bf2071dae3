#![forbid(unsafe_code)]

//! Observer handles and the per-entity observer registry.
//!
//! # Design
//!
//! Every reactive entity owns a [`Registry`] of handler slots. The registry
//! only holds `Weak` references to its slots; the strong reference lives in
//! the [`Observer`] handle returned to whoever registered the handler. An
//! observer therefore never keeps its source alive, and a source never keeps
//! its observers alive.
//!
//! Dead slots are swept lazily: on every fire, and eagerly once more than
//! half of the registry is dead, which keeps removal amortized O(1).
//!
//! A fire appends one delivery (the event plus the slots live at that
//! moment) to the registry's backlog and queues a job that delivers the
//! backlog in order. A handler that makes the same registry fire again
//! therefore never lets a later event overtake an earlier one for any slot.
//!
//! # Invariants
//!
//! 1. Handlers run in registration order.
//! 2. A handler registered during a fire does not see that fire.
//! 3. A handler killed during a fire, before its turn, does not run.
//! 4. Killing is idempotent; a killed observer never runs again.
//! 5. Dropping the last clone of an [`Observer`] kills it.
//! 6. Every slot receives the events of one registry in fire order.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::propagation;

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

struct ObserverInner {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ObserverInner {
    fn cancel(&self) {
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            tracing::trace!("observer killed");
            cancel();
        }
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.get_mut().take() {
            tracing::trace!("observer dropped");
            cancel();
        }
    }
}

/// A live registration of interest in the changes of a reactive entity.
///
/// Cloning an `Observer` creates another handle to the **same**
/// registration. The registration ends when [`kill`](Observer::kill) is
/// called on any handle, or when the last handle is dropped.
#[must_use = "dropping the last handle of an Observer cancels it"]
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    /// Build an observer whose cancellation runs `cancel` exactly once.
    pub fn from_cancel(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                cancel: RefCell::new(Some(Box::new(cancel))),
            }),
        }
    }

    /// An observer with nothing to cancel. It reports itself as dead.
    pub fn noop() -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                cancel: RefCell::new(None),
            }),
        }
    }

    /// Combine several observers into one handle; killing it kills all.
    pub fn combine(observers: impl IntoIterator<Item = Observer>) -> Self {
        let observers: Vec<Observer> = observers.into_iter().collect();
        Self::from_cancel(move || {
            for observer in observers {
                observer.kill();
            }
        })
    }

    /// Stop observing. Idempotent.
    pub fn kill(&self) {
        self.inner.cancel();
    }

    /// Whether this observer has not been killed yet.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.cancel.borrow().is_some()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// An [`Observer`] registered on an [`EventStream`](crate::EventStream).
#[must_use = "dropping a Subscription cancels it"]
#[derive(Clone, Debug)]
pub struct Subscription {
    observer: Observer,
}

impl Subscription {
    pub(crate) fn new(observer: Observer) -> Self {
        Self { observer }
    }

    /// Stop receiving events. Idempotent.
    pub fn kill(&self) {
        self.observer.kill();
    }

    /// Whether this subscription still receives events.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.observer.is_alive()
    }

    /// View this subscription as a generic [`Observer`].
    ///
    /// The returned handle shares the registration; killing either kills
    /// both.
    pub fn as_observer(&self) -> Observer {
        self.observer.clone()
    }
}

impl From<Subscription> for Observer {
    fn from(subscription: Subscription) -> Self {
        subscription.observer
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Slot<E> {
    live: Cell<bool>,
    handler: Box<dyn Fn(&E)>,
}

/// One fired event and the slots it has not reached yet.
struct Delivery<E> {
    event: Rc<E>,
    pending: VecDeque<Rc<Slot<E>>>,
}

struct RegistryInner<E> {
    slots: Vec<Weak<Slot<E>>>,
    dead: usize,
    backlog: VecDeque<Delivery<E>>,
}

impl<E> RegistryInner<E> {
    /// The oldest undelivered (slot, event) pair.
    fn next_delivery(&mut self) -> Option<(Rc<Slot<E>>, Rc<E>)> {
        while let Some(front) = self.backlog.front_mut() {
            if let Some(slot) = front.pending.pop_front() {
                let event = Rc::clone(&front.event);
                if front.pending.is_empty() {
                    self.backlog.pop_front();
                }
                return Some((slot, event));
            }
            self.backlog.pop_front();
        }
        None
    }

    fn sweep(&mut self) {
        let before = self.slots.len();
        self.slots
            .retain(|slot| slot.upgrade().is_some_and(|s| s.live.get()));
        self.dead = 0;
        let swept = before - self.slots.len();
        if swept > 0 {
            tracing::trace!(swept, remaining = self.slots.len(), "observer registry swept");
        }
    }

    fn note_dead(&mut self) {
        self.dead += 1;
        if self.dead * 2 > self.slots.len() {
            self.sweep();
        }
    }
}

/// The observers registered on one reactive entity.
///
/// Only the owning entity fires through its registry.
pub(crate) struct Registry<E> {
    inner: Rc<RefCell<RegistryInner<E>>>,
}

impl<E> Registry<E> {
    /// Number of registered slots, including dead ones not yet swept.
    pub(crate) fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}

impl<E: 'static> Registry<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                slots: Vec::new(),
                dead: 0,
                backlog: VecDeque::new(),
            })),
        }
    }

    /// Register `handler`; it runs on every subsequent fire until killed.
    pub(crate) fn register(&self, handler: impl Fn(&E) + 'static) -> Observer {
        let slot = Rc::new(Slot {
            live: Cell::new(true),
            handler: Box::new(handler),
        });
        self.inner.borrow_mut().slots.push(Rc::downgrade(&slot));
        let registry = Rc::downgrade(&self.inner);
        Observer::from_cancel(move || {
            slot.live.set(false);
            drop(slot);
            if let Some(registry) = registry.upgrade() {
                // A fire in progress on this registry never holds the borrow
                // while handlers run, so this cannot conflict.
                registry.borrow_mut().note_dead();
            }
        })
    }

    /// Deliver `event` to every observer live at this moment.
    ///
    /// Delivery happens in the current propagation frame, after any event
    /// this registry fired earlier and has not delivered yet.
    pub(crate) fn fire(&self, event: E) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dead > 0 {
                inner.sweep();
            }
            let pending: VecDeque<Rc<Slot<E>>> = inner
                .slots
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|slot| slot.live.get())
                .collect();
            if pending.is_empty() {
                return;
            }
            inner.backlog.push_back(Delivery {
                event: Rc::new(event),
                pending,
            });
        }
        let registry = Rc::clone(&self.inner);
        propagation::dispatch(move || deliver_backlog(&registry));
    }
}

/// Drops the undelivered backlog if a handler unwinds.
struct BacklogGuard<'a, E>(&'a RefCell<RegistryInner<E>>);

impl<E> Drop for BacklogGuard<'_, E> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        if let Ok(mut inner) = self.0.try_borrow_mut() {
            let dropped = std::mem::take(&mut inner.backlog);
            drop(inner);
            drop(dropped);
        }
    }
}

/// Run handlers until the registry's backlog is empty.
///
/// The borrow is released before each handler runs, so handlers may fire,
/// register and kill on the same registry.
fn deliver_backlog<E>(registry: &RefCell<RegistryInner<E>>) {
    let _guard = BacklogGuard(registry);
    loop {
        let next = registry.borrow_mut().next_delivery();
        let Some((slot, event)) = next else { break };
        if slot.live.get() {
            (slot.handler)(&event);
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyScope
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScopeInner {
    observers: Vec<Observer>,
    anchors: Vec<Box<dyn Any>>,
    disposed: bool,
}

/// The observers a derived entity registered on its dependencies.
///
/// The scope also anchors the sources the entity was built from, so
/// ownership flows from derived entities to their sources and never back.
/// Disposing the scope kills every observer and releases every anchor.
///
/// # Invariants
///
/// 1. After `dispose()`, no observer held by the scope can fire.
/// 2. Observers added after disposal are killed immediately.
/// 3. `dispose()` is idempotent.
pub(crate) struct DependencyScope {
    inner: RefCell<ScopeInner>,
}

impl DependencyScope {
    pub(crate) fn new() -> Self {
        Self {
            inner: RefCell::new(ScopeInner::default()),
        }
    }

    /// Hold `observer` until the scope is disposed.
    pub(crate) fn hold(&self, observer: Observer) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            drop(inner);
            observer.kill();
            return;
        }
        inner.observers.push(observer);
    }

    /// Keep `value` alive for as long as the scope is not disposed.
    pub(crate) fn anchor(&self, value: impl Any) {
        let mut inner = self.inner.borrow_mut();
        if !inner.disposed {
            inner.anchors.push(Box::new(value));
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    /// Kill every held observer and release the anchors.
    pub(crate) fn dispose(&self) -> bool {
        let (observers, anchors) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return false;
            }
            inner.disposed = true;
            (
                std::mem::take(&mut inner.observers),
                std::mem::take(&mut inner.anchors),
            )
        };
        // Killing may drop handlers that own other scopes; the borrow above
        // is released first.
        for observer in &observers {
            observer.kill();
        }
        drop(observers);
        drop(anchors);
        true
    }
}

impl Default for DependencyScope {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
