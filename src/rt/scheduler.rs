//! The single-threaded ready-queue scheduler.
//!
//! Grounded on `original_source/co_async/generic/queue.hpp` (the ready
//! queue) and `co_async/threading/basic_loop.hpp` (the run loop shape:
//! drain the queue, then block on the ring). `spec.md` §9's first Open
//! Question — "the original `Queue::pop` takes a parameter but ignores it
//! and shadows it" — doesn't apply here: [`Scheduler::run_until_idle`]'s
//! internal pop is a plain `VecDeque::pop_front()` with no parameter to drop.
//!
//! The raw-waker plumbing below is the standard hand-rolled pattern for a
//! `Rc`-based, single-threaded executor (there's no teacher file for this —
//! `hyper` always borrows an externally supplied [`tokio`] executor, it
//! never hosts its own ready queue — so this is learned from the general
//! async-Rust idiom rather than adapted line-for-line from one source).

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use slab::Slab;

use super::ring::RingContext;
use super::task::Task;

type BoxedFuture = Pin<Box<dyn Future<Output = ()>>>;

struct Inner {
    ring: Rc<RingContext>,
    ready: RefCell<VecDeque<usize>>,
    queued: RefCell<HashSet<usize>>,
    tasks: RefCell<Slab<Option<BoxedFuture>>>,
}

impl Inner {
    fn enqueue(&self, id: usize) {
        let mut queued = self.queued.borrow_mut();
        if queued.insert(id) {
            self.ready.borrow_mut().push_back(id);
        }
    }

    fn pop(&self) -> Option<usize> {
        let id = self.ready.borrow_mut().pop_front()?;
        self.queued.borrow_mut().remove(&id);
        Some(id)
    }
}

/// A process-wide (per-thread, by convention — see `spec.md` §9 "Global
/// singletons") ready queue of resumable task handles, paired with one ring
/// context.
///
/// Invariant: a handle is in the ready queue at most once (`spec.md` §3).
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl Scheduler {
    /// Create a scheduler backed by a ring with room for `ring_entries`
    /// in-flight submissions.
    pub fn new(ring_entries: u32) -> io::Result<Scheduler> {
        Ok(Scheduler {
            inner: Rc::new(Inner {
                ring: RingContext::new(ring_entries)?,
                ready: RefCell::new(VecDeque::new()),
                queued: RefCell::new(HashSet::new()),
                tasks: RefCell::new(Slab::new()),
            }),
        })
    }

    /// The ring context backing this scheduler, needed to construct
    /// filesystem/socket handles (`crate::fs`, `crate::net`) that submit
    /// through it.
    pub fn ring(&self) -> &Rc<RingContext> {
        &self.inner.ring
    }

    /// Detach a task: the scheduler owns it from here on and destroys its
    /// frame when it returns. Its result is discarded.
    pub fn spawn<T>(&self, task: Task<T>)
    where
        T: 'static,
    {
        let fut: BoxedFuture = Box::pin(async move {
            let _ = task.await;
        });
        let id = self.inner.tasks.borrow_mut().insert(Some(fut));
        self.inner.enqueue(id);
    }

    /// Pop and resume ready handles until the queue is empty.
    pub fn run_until_idle(&self) {
        while let Some(id) = self.inner.pop() {
            self.poll_one(id);
        }
    }

    fn poll_one(&self, id: usize) {
        let taken = self
            .inner
            .tasks
            .borrow_mut()
            .get_mut(id)
            .and_then(|slot| slot.take());
        let mut fut = match taken {
            Some(fut) => fut,
            None => return,
        };
        let waker = make_waker(self.inner.clone(), id);
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.inner.tasks.borrow_mut().remove(id);
            }
            Poll::Pending => {
                if let Some(slot) = self.inner.tasks.borrow_mut().get_mut(id) {
                    *slot = Some(fut);
                }
            }
        }
    }

    /// Drive the scheduler until `task` completes, returning its value.
    ///
    /// Per `spec.md` §4.1: repeatedly (a) drain the ready queue, then (b) if
    /// still pending, submit queued ring entries and block for at least one
    /// completion (each completion re-enqueues its awaiter).
    pub fn join<T>(&self, task: Task<T>) -> T {
        let mut fut = task.into_inner();
        let woken = Rc::new(Cell::new(true));
        let waker = local_waker(woken.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            self.run_until_idle();

            if woken.get() {
                woken.set(false);
                if let Poll::Ready(value) = fut.as_mut().poll(&mut cx) {
                    return value;
                }
            }

            if !self.inner.ready.borrow().is_empty() || woken.get() {
                continue;
            }

            // Nothing ready locally: ask the kernel for at least one
            // completion. If there is truly nothing in flight anywhere
            // (neither our joined task nor any spawned task submitted
            // anything), this would block forever — that is a deadlock in
            // the caller's task graph, not something this loop can recover
            // from, exactly as a real blocking `io_uring_enter` would.
            if self.inner.ring.submit_and_wait_one().is_err() {
                // A submit/wait error (e.g. EINTR) just gets retried; the
                // loop re-checks readiness on the next iteration.
                continue;
            }
        }
    }
}

// ===== Rc-based raw waker for spawned tasks =====

struct TaskWaker {
    inner: Rc<Inner>,
    id: usize,
}

static TASK_VTABLE: RawWakerVTable =
    RawWakerVTable::new(task_clone, task_wake, task_wake_by_ref, task_drop);

unsafe fn task_clone(data: *const ()) -> RawWaker {
    let rc = Rc::from_raw(data as *const TaskWaker);
    let cloned = rc.clone();
    std::mem::forget(rc);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &TASK_VTABLE)
}

unsafe fn task_wake(data: *const ()) {
    let rc = Rc::from_raw(data as *const TaskWaker);
    rc.inner.enqueue(rc.id);
}

unsafe fn task_wake_by_ref(data: *const ()) {
    let rc = Rc::from_raw(data as *const TaskWaker);
    rc.inner.enqueue(rc.id);
    std::mem::forget(rc);
}

unsafe fn task_drop(data: *const ()) {
    drop(Rc::from_raw(data as *const TaskWaker));
}

/// # Safety
///
/// The resulting `Waker` is built from an `Rc`, which is not thread-safe.
/// `std::task::Waker` carries no `Send`/`Sync` bound at the type-system
/// level (the safety contract is on the implementor of the vtable, not
/// enforced structurally), so this compiles without `unsafe impl`. Keeping
/// these wakers strictly on the single thread that owns this `Scheduler` —
/// which every caller in this crate does — is what makes it sound.
fn make_waker(inner: Rc<Inner>, id: usize) -> Waker {
    let tw = Rc::new(TaskWaker { inner, id });
    let raw = RawWaker::new(Rc::into_raw(tw) as *const (), &TASK_VTABLE);
    unsafe { Waker::from_raw(raw) }
}

// ===== Flag-based raw waker for `Scheduler::join`'s own future =====

static LOCAL_VTABLE: RawWakerVTable =
    RawWakerVTable::new(local_clone, local_wake, local_wake_by_ref, local_drop);

unsafe fn local_clone(data: *const ()) -> RawWaker {
    let rc = Rc::from_raw(data as *const Cell<bool>);
    let cloned = rc.clone();
    std::mem::forget(rc);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &LOCAL_VTABLE)
}

unsafe fn local_wake(data: *const ()) {
    let rc = Rc::from_raw(data as *const Cell<bool>);
    rc.set(true);
}

unsafe fn local_wake_by_ref(data: *const ()) {
    let rc = Rc::from_raw(data as *const Cell<bool>);
    rc.set(true);
    std::mem::forget(rc);
}

unsafe fn local_drop(data: *const ()) {
    drop(Rc::from_raw(data as *const Cell<bool>));
}

fn local_waker(flag: Rc<Cell<bool>>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(flag) as *const (), &LOCAL_VTABLE);
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_runs_detached_to_completion() {
        let sched = Scheduler::new(8).unwrap();
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        sched.spawn(Task::new(async move {
            ran2.set(true);
        }));
        sched.run_until_idle();
        assert!(ran.get());
    }

    #[test]
    fn join_drives_nested_awaits() {
        let sched = Scheduler::new(8).unwrap();
        let value = sched.join(Task::new(async { inner_task().await }));
        assert_eq!(value, 42);
    }

    async fn inner_task() -> i32 {
        42
    }
}
