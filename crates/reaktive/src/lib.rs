#![forbid(unsafe_code)]

//! Reactive values, sets and lists with incremental derived views.
//!
//! - [`Variable`] / [`Binding`]: single values; bindings recompute when a
//!   dependency invalidates and can be disposed.
//! - [`EventEmitter`] / [`EventStream`]: fire-and-forget events, with a
//!   [`last_fired`](EventStream::last_fired) value.
//! - [`ReactiveSet`] / [`ReactiveList`]: collections emitting structured
//!   [`SetChange`]s and [`ListChange`]s, plus standing views (`map`,
//!   `filter`, `flat_map`, `union`, ...) that update incrementally.
//! - [`ReactiveCollection`]: aggregates over any collection (`all`, `count`,
//!   `sum`, ...).
//!
//! # Architecture
//!
//! Everything is single-threaded and built on `Rc`. Each entity owns a
//! registry of observer slots that it references weakly; the strong end is
//! the [`Observer`] handle. Derived entities hold their sources strongly and
//! are reached from them only through those weak slots, so ownership always
//! flows from derived to source.
//!
//! Notifications are delivered through thread-local propagation frames.
//! All observers of one change run before any view change they cause is
//! delivered, and every mutation, including one made from inside a
//! handler, returns only once its whole cascade has settled.
//!
//! # Example
//!
//! ```
//! use reaktive::{ReactiveCollection, ReactiveValue, reactive_set, reactive_variable};
//!
//! let set1 = reactive_set([1, 2, 3]);
//! let set2 = reactive_set([3, 4, 5]);
//! let union = &set1 + &set2;
//! let total = union.sum();
//! assert_eq!(total.now(), 15);
//!
//! set2.remove(&3);
//! assert_eq!(total.now(), 15);
//! set1.remove(&3);
//! assert_eq!(total.now(), 12);
//!
//! let factor = reactive_variable(2);
//! let scaled = total.zip_with(&factor, |t, f| t * f);
//! factor.set(10);
//! assert_eq!(scaled.now(), 120);
//! ```
//!
//! # Feature Flags
//!
//! - `tracing`: wrap every propagation job in a `trace` span.

pub mod collection;
pub mod error;
pub mod event;
pub mod list;
pub mod observer;
pub mod propagation;
pub mod set;
pub mod value;

pub use collection::ReactiveCollection;
pub use error::{ReactiveError, Result};
pub use event::{EventEmitter, EventStream};
pub use list::{
    AsReactiveList, ListChange, MutableReactiveList, ReactiveList, reactive_list,
    unmodifiable_reactive_list,
};
pub use observer::{Observer, Subscription};
pub use propagation::is_propagating;
pub use set::{
    AsReactiveSet, MutableReactiveSet, ReactiveSet, SetChange, reactive_set,
    unmodifiable_reactive_set,
};
pub use value::{
    Binding, BindingContext, Dependencies, Dependency, ReactiveValue, Variable, VariableSetter,
    binding, binding_on, constant_binding, reactive_value, reactive_variable,
};
