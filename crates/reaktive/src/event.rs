#![forbid(unsafe_code)]

//! Event streams: discrete, fire-and-forget notifications.
//!
//! An [`EventEmitter`] owns emission; the [`EventStream`] it hands out can
//! only be subscribed to. Emission is push-only: there is no buffering and
//! no replay for late subscribers.
//!
//! # Invariants
//!
//! 1. Subscribers receive each event once, in subscription order.
//! 2. A subscriber added during an emission does not receive it; one killed
//!    during an emission before its turn does not receive it either.
//! 3. [`EventStream::last_fired`] holds the most recent event, or `None`
//!    before the first one, no matter when it is first accessed.
//! 4. The `last_fired` binding only refers weakly back to the stream.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::observer::{DependencyScope, Observer, Registry, Subscription};
use crate::propagation;
use crate::value::{Binding, Dependency, binding};

struct StreamInner<T> {
    subscribers: Registry<T>,
    last: RefCell<Option<T>>,
    last_fired: OnceCell<Binding<Option<T>>>,
    /// Upstream subscriptions of derived streams.
    scope: DependencyScope,
}

impl<T: Clone + 'static> StreamInner<T> {
    fn new() -> Self {
        Self {
            subscribers: Registry::new(),
            last: RefCell::new(None),
            last_fired: OnceCell::new(),
            scope: DependencyScope::new(),
        }
    }

    fn emit(&self, value: T) {
        *self.last.borrow_mut() = Some(value.clone());
        self.subscribers.fire(value);
    }
}

// ---------------------------------------------------------------------------
// EventStream<T>
// ---------------------------------------------------------------------------

/// A subscribe-only source of events.
///
/// Cloning creates another handle to the **same** stream.
pub struct EventStream<T> {
    inner: Rc<StreamInner<T>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for EventStream<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for EventStream<T> {}

impl<T> Hash for EventStream<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.inner), state);
    }
}

impl<T: fmt::Debug> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("last", &*self.inner.last.borrow())
            .field("subscribers", &self.inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> EventStream<T> {
    /// Run `handler` for every subsequent event.
    pub fn subscribe(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        Subscription::new(self.inner.subscribers.register(handler))
    }

    /// A stream of `f` applied to every event of this one.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> EventStream<U> {
        self.derive(move |target, event| target.emit(f(event)))
    }

    /// A stream of the events of this one that satisfy `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> EventStream<T> {
        self.derive(move |target, event| {
            if predicate(event) {
                target.emit(event.clone());
            }
        })
    }

    /// Stop forwarding upstream events into this stream. Idempotent; a no-op
    /// for streams created by an [`EventEmitter`].
    pub fn dispose(&self) {
        if self.inner.scope.dispose() {
            tracing::debug!("event stream disposed");
        }
    }

    fn derive<U: Clone + 'static>(
        &self,
        forward: impl Fn(&StreamInner<U>, &T) + 'static,
    ) -> EventStream<U> {
        let derived = Rc::new(StreamInner::<U>::new());
        let target: Weak<StreamInner<U>> = Rc::downgrade(&derived);
        let upstream = self.inner.subscribers.register(move |event| {
            if let Some(target) = target.upgrade() {
                forward(&target, event);
            }
        });
        derived.scope.hold(upstream);
        derived.scope.anchor(self.clone());
        EventStream { inner: derived }
    }
}

impl<T: Clone + PartialEq + 'static> EventStream<T> {
    /// A reactive value holding the most recent event.
    ///
    /// Built on first access and then shared; it is `None` until the stream
    /// emits for the first time.
    pub fn last_fired(&self) -> Binding<Option<T>> {
        self.inner
            .last_fired
            .get_or_init(|| {
                let initial = self.inner.last.borrow().clone();
                binding(initial, |ctx| {
                    let target = ctx.clone();
                    ctx.add_observer(
                        self.inner
                            .subscribers
                            .register(move |event: &T| {
                                target.set(Some(event.clone()));
                            }),
                    );
                })
            })
            .clone()
    }
}

impl<T: Clone + 'static> Dependency for EventStream<T> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.inner.subscribers.register(move |_| on_invalidate())
    }
}

// ---------------------------------------------------------------------------
// EventEmitter<T>
// ---------------------------------------------------------------------------

/// The emitting side of an [`EventStream`].
pub struct EventEmitter<T> {
    stream: EventStream<T>,
}

impl<T: Clone + 'static> EventEmitter<T> {
    /// Create an emitter with a fresh stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: EventStream {
                inner: Rc::new(StreamInner::new()),
            },
        }
    }

    /// Deliver `value` to every current subscriber.
    pub fn emit(&self, value: T) {
        propagation::settle(|| self.stream.inner.emit(value));
    }

    /// The stream this emitter feeds.
    pub fn stream(&self) -> EventStream<T> {
        self.stream.clone()
    }
}

impl<T: Clone + 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("stream", &self.stream)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ReactiveValue;
    use std::cell::Cell;

    #[test]
    fn last_fired_starts_absent_then_tracks_emissions() {
        let emitter = EventEmitter::new();
        let last = emitter.stream().last_fired();
        assert_eq!(last.now(), None);
        emitter.emit(42);
        assert_eq!(last.now(), Some(42));
        emitter.emit(7);
        assert_eq!(last.now(), Some(7));
    }

    #[test]
    fn last_fired_accessed_late_reflects_earlier_emission() {
        let emitter = EventEmitter::new();
        emitter.emit("early");
        let last = emitter.stream().last_fired();
        assert_eq!(last.now(), Some("early"));
        assert_eq!(last, emitter.stream().last_fired());
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let emitter = EventEmitter::new();
        let stream = emitter.stream();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let _a = stream.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        let _b = stream.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        emitter.emit(1);
        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn killed_subscription_receives_nothing() {
        let emitter = EventEmitter::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = emitter.stream().subscribe(move |_: &i32| h.set(h.get() + 1));
        emitter.emit(1);
        sub.kill();
        sub.kill();
        emitter.emit(2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscriber_added_during_emit_misses_it() {
        let emitter = EventEmitter::new();
        let stream = emitter.stream();
        let late = Rc::new(Cell::new(0));
        let held: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let (s, l, h) = (stream.clone(), Rc::clone(&late), Rc::clone(&held));
        let _outer = stream.subscribe(move |_: &u8| {
            let l = Rc::clone(&l);
            h.borrow_mut().push(s.subscribe(move |_| l.set(l.get() + 1)));
        });

        emitter.emit(0);
        assert_eq!(late.get(), 0);
        emitter.emit(0);
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn map_and_filter_derive_streams() {
        let emitter = EventEmitter::new();
        let evens = emitter.stream().filter(|v: &i32| v % 2 == 0).map(|v| v * 10);
        let last = evens.last_fired();

        emitter.emit(1);
        assert_eq!(last.now(), None);
        emitter.emit(4);
        assert_eq!(last.now(), Some(40));

        evens.dispose();
        emitter.emit(6);
        assert_eq!(last.now(), Some(40));
    }

    #[test]
    fn stream_invalidates_dependencies() {
        let emitter = EventEmitter::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let clicks = crate::value::binding_on(crate::dependencies![emitter.stream()], move || {
            c.set(c.get() + 1);
            c.get()
        });
        emitter.emit(());
        emitter.emit(());
        assert_eq!(clicks.now(), 3);
    }

    #[test]
    fn debug_shows_last_event_and_subscribers() {
        let emitter = EventEmitter::new();
        let _sub = emitter.stream().subscribe(|_: &u8| {});
        emitter.emit(3u8);
        let shown = format!("{emitter:?}");
        assert!(shown.contains("last: Some(3)"));
        assert!(shown.contains("subscribers: 1"));
    }
}
