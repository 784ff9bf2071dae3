#![forbid(unsafe_code)]

//! Bindings: values derived from dependencies.
//!
//! A [`Binding<T>`] owns a value cell plus the [`DependencyScope`] holding the
//! observers its body registered. The body runs once, synchronously, at
//! construction; the closures it registers keep the binding up to date
//! afterwards through a [`BindingContext`].
//!
//! # Usage
//!
//! ```
//! use reaktive::{ReactiveValue, binding_on, dependencies, reactive_variable};
//!
//! let x = reactive_variable(3);
//! let source = x.clone();
//! let doubled = binding_on(dependencies![x], move || source.now() * 2);
//! assert_eq!(doubled.now(), 6);
//!
//! x.set(5);
//! assert_eq!(doubled.now(), 10);
//!
//! doubled.dispose();
//! x.set(7);
//! assert_eq!(doubled.now(), 10);
//! ```
//!
//! # Invariants
//!
//! 1. A binding recomputes whenever a dependency invalidates; observers of
//!    the binding are notified only when the recomputed value differs from
//!    the current one.
//! 2. `dispose()` kills every dependency observer; a disposed binding keeps
//!    its last value and never updates again.
//! 3. `dispose()` is idempotent.
//! 4. Dropping the last handle of a binding disposes it.
//!
//! # Failure Modes
//!
//! - Body panics during construction: the panic propagates out of
//!   [`binding`]; observers registered so far are released with the
//!   half-built binding.
//! - Dependency dropped: the observer on it becomes inert and the binding
//!   keeps its last value. Bindings built through this crate anchor their
//!   sources, so this only happens for hand-written bodies.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use super::ValueCell;
use super::dependencies::{Dependencies, Dependency};
use super::ReactiveValue;
use crate::observer::{DependencyScope, Observer};

// ---------------------------------------------------------------------------
// Binding<T>
// ---------------------------------------------------------------------------

/// A reactive value computed from other reactive entities.
///
/// Cloning a `Binding` creates a new handle to the **same** binding.
pub struct Binding<T> {
    cell: Rc<ValueCell<T>>,
    scope: Option<Rc<DependencyScope>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            scope: self.scope.clone(),
        }
    }
}

impl<T> PartialEq for Binding<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Eq for Binding<T> {}

impl<T> Hash for Binding<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.cell), state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("cell", &self.cell)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<T> Binding<T> {
    /// Whether [`dispose`](Self::dispose) has been called.
    ///
    /// Bindings without dependencies are never reported as disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.scope.as_ref().is_some_and(|s| s.is_disposed())
    }

    /// Number of dependency observers currently held.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.scope.as_ref().map_or(0, |s| s.observer_count())
    }
}

impl<T: Clone + PartialEq + 'static> Binding<T> {
    pub(crate) fn from_cell(cell: Rc<ValueCell<T>>) -> Self {
        Self { cell, scope: None }
    }

    /// Release every dependency observer. Idempotent.
    ///
    /// The binding keeps its current value but never updates again.
    pub fn dispose(&self) {
        let Some(scope) = &self.scope else { return };
        if scope.dispose() {
            tracing::debug!(
                observers = self.cell.observer_count(),
                "binding disposed"
            );
        }
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveValue<T> for Binding<T> {
    fn now(&self) -> T {
        self.cell.get()
    }

    fn with_now<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    fn observe(&self, handler: impl Fn(&T, &T) + 'static) -> Observer {
        self.cell.observe(handler)
    }

    fn as_binding(&self) -> Binding<T> {
        self.clone()
    }
}

impl<T: Clone + PartialEq + 'static> Dependency for Binding<T> {
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer {
        self.cell.observe(move |_, _| on_invalidate())
    }
}

// ---------------------------------------------------------------------------
// BindingContext<T>
// ---------------------------------------------------------------------------

/// Handle given to a binding body.
///
/// The context only refers weakly to its binding: closures that capture it
/// never keep the binding alive, and turn into no-ops once the binding is
/// disposed or dropped.
pub struct BindingContext<T> {
    cell: Weak<ValueCell<T>>,
    scope: Weak<DependencyScope>,
}

impl<T> Clone for BindingContext<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
            scope: Weak::clone(&self.scope),
        }
    }
}

impl<T> fmt::Debug for BindingContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("live", &(self.cell.strong_count() > 0))
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> BindingContext<T> {
    fn live(&self) -> Option<Rc<ValueCell<T>>> {
        let scope = self.scope.upgrade()?;
        if scope.is_disposed() {
            return None;
        }
        self.cell.upgrade()
    }

    /// Set the binding's value; observers run only if it changed.
    ///
    /// Returns `false` when nothing changed, including when the binding is
    /// disposed or gone.
    pub fn set(&self, value: T) -> bool {
        self.live().is_some_and(|cell| cell.set(value))
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        match self.live() {
            Some(cell) => {
                let next = cell.with(f);
                cell.set(next)
            }
            None => false,
        }
    }

    /// The binding's current value, if it is still live.
    #[must_use]
    pub fn now(&self) -> Option<T> {
        self.live().map(|cell| cell.get())
    }

    /// Register a dependency observer owned by the binding.
    ///
    /// The observer is killed when the binding is disposed, or immediately
    /// if that already happened.
    pub fn add_observer(&self, observer: impl Into<Observer>) {
        let observer = observer.into();
        match self.scope.upgrade() {
            Some(scope) => scope.hold(observer),
            None => observer.kill(),
        }
    }

    /// Keep `value` alive for as long as the binding is not disposed.
    pub fn anchor(&self, value: impl Any) {
        if let Some(scope) = self.scope.upgrade() {
            scope.anchor(value);
        }
    }

    /// Whether the binding is disposed or dropped.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.live().is_none()
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Create a binding initially holding `initial`, then run `body` once.
///
/// The body registers dependency observers with
/// [`BindingContext::add_observer`] and updates the value with
/// [`BindingContext::set`], typically from inside those observers.
pub fn binding<T, F>(initial: T, body: F) -> Binding<T>
where
    T: Clone + PartialEq + 'static,
    F: FnOnce(&BindingContext<T>),
{
    let cell = Rc::new(ValueCell::new(initial));
    let scope = Rc::new(DependencyScope::new());
    let ctx = BindingContext {
        cell: Rc::downgrade(&cell),
        scope: Rc::downgrade(&scope),
    };
    body(&ctx);
    tracing::trace!(dependencies = scope.observer_count(), "binding created");
    Binding {
        cell,
        scope: Some(scope),
    }
}

/// Create a binding evaluating `compute` now and after every invalidation
/// of `dependencies`.
pub fn binding_on<T>(dependencies: Dependencies, compute: impl Fn() -> T + 'static) -> Binding<T>
where
    T: Clone + PartialEq + 'static,
{
    binding(compute(), move |ctx| {
        let target = ctx.clone();
        ctx.add_observer(dependencies.observe(move || {
            target.set(compute());
        }));
        ctx.anchor(dependencies);
    })
}

/// A binding that always holds `value`. Disposing it has no effect.
pub fn constant_binding<T: Clone + PartialEq + 'static>(value: T) -> Binding<T> {
    Binding::from_cell(Rc::new(ValueCell::new(value)))
}

/// A read-only reactive value that never changes.
pub fn reactive_value<T: Clone + PartialEq + 'static>(value: T) -> Binding<T> {
    constant_binding(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::reactive_variable;
    use std::cell::{Cell, RefCell};

    #[test]
    fn binding_recomputes_on_dependency_change() {
        let x = reactive_variable(3);
        let source = x.clone();
        let doubled = binding_on(crate::dependencies![x], move || source.now() * 2);
        assert_eq!(doubled.now(), 6);

        x.set(5);
        assert_eq!(doubled.now(), 10);
    }

    #[test]
    fn body_runs_once_and_sets_initial_state() {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let b = binding(0, move |ctx| {
            r.set(r.get() + 1);
            ctx.set(7);
        });
        assert_eq!(runs.get(), 1);
        assert_eq!(b.now(), 7);
    }

    #[test]
    fn disposed_binding_keeps_last_value() {
        let x = reactive_variable(1);
        let source = x.clone();
        let b = binding_on(crate::dependencies![x], move || source.now() + 100);
        x.set(2);
        assert_eq!(b.now(), 102);

        b.dispose();
        assert!(b.is_disposed());
        assert_eq!(b.dependency_count(), 0);
        x.set(3);
        assert_eq!(b.now(), 102);
    }

    #[test]
    fn dispose_twice_is_harmless() {
        let x = reactive_variable(1);
        let b = x.map(|v| v * 3);
        b.dispose();
        b.dispose();
        assert_eq!(b.now(), 3);
    }

    #[test]
    fn observers_skip_equal_recomputation() {
        let x = reactive_variable(4);
        let parity = x.map(|v| v % 2);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _obs = parity.observe(move |_, _| h.set(h.get() + 1));

        x.set(6);
        assert_eq!(hits.get(), 0);
        x.set(7);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn add_observer_after_dispose_kills_it() {
        let x = reactive_variable(0);
        let saved: Rc<RefCell<Option<BindingContext<i32>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&saved);
        let b = binding(0, move |ctx| {
            *s.borrow_mut() = Some(ctx.clone());
        });
        b.dispose();

        let ctx = saved.borrow().clone().expect("context captured");
        let obs = x.observe(|_, _| {});
        ctx.add_observer(obs.clone());
        assert!(!obs.is_alive());
        assert!(!ctx.set(5));
        assert!(ctx.is_disposed());
    }

    #[test]
    fn dropping_binding_releases_dependency_observers() {
        let x = reactive_variable(0);
        let computed = Rc::new(Cell::new(0));
        {
            let c = Rc::clone(&computed);
            let source = x.clone();
            let _b = binding_on(crate::dependencies![x], move || {
                c.set(c.get() + 1);
                source.now()
            });
        }
        let before = computed.get();
        x.set(1);
        assert_eq!(computed.get(), before);
    }

    #[test]
    fn constant_binding_dispose_is_noop() {
        let c = constant_binding("fixed");
        c.dispose();
        assert!(!c.is_disposed());
        assert_eq!(c.now(), "fixed");
    }

    #[test]
    fn as_binding_shares_the_source_value() {
        let x = reactive_variable(1);
        let b = x.as_binding();
        x.set(9);
        assert_eq!(b.now(), 9);
        b.dispose();
        x.set(10);
        assert_eq!(b.now(), 10);
    }

    #[test]
    fn update_reads_current_value() {
        let x = reactive_variable(0);
        let clicks = binding(0, |ctx| {
            let target = ctx.clone();
            ctx.add_observer(x.observe(move |_, _| {
                target.update(|n| n + 1);
            }));
        });
        x.set(1);
        x.set(2);
        assert_eq!(clicks.now(), 2);
    }

    #[test]
    fn dispose_is_logged_once() {
        use std::sync::{Arc, Mutex};
        use tracing::field::{Field, Visit};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        struct Messages(Arc<Mutex<Vec<String>>>);

        struct MessageField<'a>(&'a mut String);

        impl Visit for MessageField<'_> {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    *self.0 = format!("{value:?}");
                }
            }
        }

        impl<S: tracing::Subscriber> Layer<S> for Messages {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                let mut message = String::new();
                event.record(&mut MessageField(&mut message));
                if let Ok(mut log) = self.0.lock() {
                    log.push(message);
                }
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Messages(Arc::clone(&log)));
        tracing::subscriber::with_default(subscriber, || {
            let x = reactive_variable(1);
            let b = x.map(|v| v + 1);
            b.dispose();
            b.dispose();
        });

        let log = log.lock().expect("log lock");
        let disposals = log.iter().filter(|m| m.as_str() == "binding disposed").count();
        assert_eq!(disposals, 1);
        assert!(log.iter().any(|m| m == "binding created"));
    }

    #[test]
    fn debug_reports_disposal() {
        let x = reactive_variable(1);
        let next = x.map(|v| v + 1);
        assert!(format!("{next:?}").contains("disposed: false"));
        next.dispose();
        assert!(format!("{next:?}").contains("disposed: true"));
    }
}
