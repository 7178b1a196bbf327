//! The `Task<T>` primitive.
//!
//! `spec.md` §9 frames the translation problem directly: "re-implement ...
//! as ... a library abstraction over a state-machine that is woken by the
//! ring loop" — `std::future::Future` *is* that state machine in Rust, so
//! `Task<T>` is a thin, type-erased wrapper around a boxed future rather
//! than a hand-rolled coroutine frame. Composable via `.await` (it
//! implements `Future` itself), movable, not `Copy`. Grounded conceptually
//! on `original_source/co_async/awaiter/concepts.hpp`'s
//! ready/suspend/resume triad, mapped onto `poll`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A not-yet-started or in-progress computation producing `T`.
///
/// A `Task` is lazy: nothing runs until it is polled, either directly via
/// `.await` inside another task, via [`crate::rt::Scheduler::spawn`], or via
/// [`crate::rt::Scheduler::join`].
pub struct Task<T> {
    fut: Pin<Box<dyn Future<Output = T>>>,
}

impl<T> Task<T> {
    /// Wrap any future as a `Task`.
    pub fn new<F>(fut: F) -> Task<T>
    where
        F: Future<Output = T> + 'static,
    {
        Task {
            fut: Box::pin(fut),
        }
    }

    pub(crate) fn into_inner(self) -> Pin<Box<dyn Future<Output = T>>> {
        self.fut
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        // `Task` has no `!Unpin` fields of its own (the boxed future is
        // already pinned internally), so projecting through `get_mut` is
        // sound.
        let this = self.get_mut();
        this.fut.as_mut().poll(cx)
    }
}

/// Join two tasks, resolving to both results once both have completed
/// (`spec.md` §3's "composable ... supports a `when_all`-style join").
pub fn when_all2<A, B>(a: Task<A>, b: Task<B>) -> Task<(A, B)>
where
    A: 'static,
    B: 'static,
{
    Task::new(futures_util::future::join(a, b))
}

/// Join a homogeneous collection of tasks.
pub fn when_all<T>(tasks: Vec<Task<T>>) -> Task<Vec<T>>
where
    T: 'static,
{
    Task::new(futures_util::future::join_all(tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Scheduler;

    #[test]
    fn task_runs_lazily_and_returns_value() {
        let sched = Scheduler::new(8).unwrap();
        let t = Task::new(async { 1 + 1 });
        assert_eq!(sched.join(t), 2);
    }

    #[test]
    fn when_all2_joins_both_results() {
        let sched = Scheduler::new(8).unwrap();
        let a = Task::new(async { 1 });
        let b = Task::new(async { "two" });
        let joined = when_all2(a, b);
        assert_eq!(sched.join(joined), (1, "two"));
    }

    #[test]
    fn when_all_joins_a_vec() {
        let sched = Scheduler::new(8).unwrap();
        let tasks = (0..4).map(|i| Task::new(async move { i * i })).collect();
        let joined = when_all(tasks);
        assert_eq!(sched.join(joined), vec![0, 1, 4, 9]);
    }
}
