#![forbid(unsafe_code)]

//! Uniform invalidation view over heterogeneous reactive entities.

use std::fmt;
use std::rc::Rc;

use crate::observer::Observer;

/// Anything whose changes can invalidate a computation.
pub trait Dependency {
    /// Run `on_invalidate` after every change of this entity.
    fn observe_invalidation(&self, on_invalidate: Rc<dyn Fn()>) -> Observer;
}

/// A set of dependencies observed as one.
///
/// Build it with [`Dependencies::on`] or the [`dependencies!`](crate::dependencies)
/// macro. The set keeps every dependency it holds alive.
#[derive(Clone, Default)]
pub struct Dependencies {
    items: Vec<Rc<dyn Dependency>>,
}

impl Dependencies {
    /// An empty dependency set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `dependency` to the set.
    #[must_use]
    pub fn on<D: Dependency + Clone + 'static>(mut self, dependency: &D) -> Self {
        self.items.push(Rc::new(dependency.clone()));
        self
    }

    /// Observe every dependency; `on_invalidate` runs after each change of
    /// any of them. Killing the returned observer stops all of them.
    pub fn observe(&self, on_invalidate: impl Fn() + 'static) -> Observer {
        let on_invalidate: Rc<dyn Fn()> = Rc::new(on_invalidate);
        Observer::combine(
            self.items
                .iter()
                .map(|dependency| dependency.observe_invalidation(Rc::clone(&on_invalidate))),
        )
    }

    /// Number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("len", &self.items.len())
            .finish()
    }
}

/// Build a [`Dependencies`] set from reactive entities.
///
/// # Examples
///
/// ```
/// use reaktive::{dependencies, reactive_set, reactive_variable};
///
/// let x = reactive_variable(1);
/// let items = reactive_set([1, 2]);
/// let deps = dependencies![x, items];
/// assert_eq!(deps.len(), 2);
/// ```
#[macro_export]
macro_rules! dependencies {
    ($($dependency:expr),* $(,)?) => {
        $crate::Dependencies::new()$(.on(&$dependency))*
    };
}
