#![forbid(unsafe_code)]

//! Thread-local propagation frames.
//!
//! A public mutation (a root collection edit, a value `set`, an emitter
//! `emit`) opens a frame with [`settle`] and drains it before returning.
//! Every registry fire made while the frame is open becomes a job queued
//! in that frame, so the notifications of one mutation run breadth-first.
//! A mutation performed by a handler opens a nested frame and settles its
//! own cascade before the handler continues, so chained mutations run
//! depth-first.
//!
//! # Invariants
//!
//! 1. All observers of one emission run before any observer of an emission
//!    that one of them queued (breadth-first per source event).
//! 2. A mutating call returns only after its own frame is empty, so a
//!    mutation settles every dependent entity before it returns, including
//!    when the mutation is made from inside a handler.
//! 3. Jobs of one frame run in the order their emissions happened.
//! 4. A panicking handler leaves propagation usable: the frame it ran in is
//!    popped and its remaining jobs are discarded.

use std::cell::RefCell;
use std::collections::VecDeque;

type Job = Box<dyn FnOnce()>;

thread_local! {
    static FRAMES: RefCell<Vec<VecDeque<Job>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the innermost frame, also when a handler unwinds.
struct FrameGuard;

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let frame = FRAMES.with(|f| f.borrow_mut().pop());
        if std::thread::panicking() {
            let discarded = frame.as_ref().map_or(0, VecDeque::len);
            tracing::warn!(
                discarded,
                "handler panicked during propagation; pending jobs discarded"
            );
        }
        drop(frame);
    }
}

/// Whether a propagation frame is currently open on this thread.
#[must_use]
pub fn is_propagating() -> bool {
    FRAMES.with(|f| !f.borrow().is_empty())
}

/// Run `mutation` in a fresh frame, then drain that frame.
///
/// Returns only after every job queued by `mutation`, and every job those
/// jobs queue, has run.
pub(crate) fn settle<R>(mutation: impl FnOnce() -> R) -> R {
    let depth = FRAMES.with(|f| {
        let mut frames = f.borrow_mut();
        frames.push(VecDeque::new());
        frames.len()
    });
    let _guard = FrameGuard;
    let result = mutation();
    let mut jobs = 0usize;
    loop {
        let next = FRAMES.with(|f| f.borrow_mut().last_mut().and_then(VecDeque::pop_front));
        let Some(job) = next else { break };
        #[cfg(feature = "tracing")]
        let _span = tracing::trace_span!(
            "propagate",
            depth,
            queued = FRAMES.with(|f| f.borrow().last().map_or(0, VecDeque::len))
        )
        .entered();
        job();
        jobs += 1;
    }
    tracing::trace!(jobs, depth, "propagation settled");
    result
}

/// Queue `job` in the innermost open frame, or settle it in a frame of its
/// own when none is open.
pub(crate) fn dispatch(job: impl FnOnce() + 'static) {
    let unqueued = FRAMES.with(|f| match f.borrow_mut().last_mut() {
        Some(frame) => {
            frame.push_back(Box::new(job));
            None
        }
        None => Some(job),
    });
    if let Some(job) = unqueued {
        settle(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn top_level_dispatch_runs_immediately() {
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        dispatch(move || h.set(true));
        assert!(hit.get());
        assert!(!is_propagating());
    }

    #[test]
    fn dispatch_inside_a_job_is_breadth_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        dispatch(move || {
            l.borrow_mut().push("a");
            let l2 = Rc::clone(&l);
            dispatch(move || l2.borrow_mut().push("c"));
            assert!(is_propagating());
            l.borrow_mut().push("b");
        });
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn nested_settle_drains_before_returning() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        dispatch(move || {
            l.borrow_mut().push("a");
            let (outer, inner) = (Rc::clone(&l), Rc::clone(&l));
            dispatch(move || outer.borrow_mut().push("queued"));
            settle(move || {
                let cascade = Rc::clone(&inner);
                dispatch(move || cascade.borrow_mut().push("cascade"));
                inner.borrow_mut().push("nested");
            });
            l.borrow_mut().push("b");
        });
        assert_eq!(*log.borrow(), vec!["a", "nested", "cascade", "b", "queued"]);
    }

    #[test]
    fn queue_recovers_after_panic() {
        let result = std::panic::catch_unwind(|| {
            dispatch(|| {
                dispatch(|| {});
                panic!("boom");
            });
        });
        assert!(result.is_err());
        assert!(!is_propagating());

        let hit = Rc::new(Cell::new(0));
        let h = Rc::clone(&hit);
        dispatch(move || h.set(h.get() + 1));
        assert_eq!(hit.get(), 1);
    }
}
