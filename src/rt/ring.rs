//! The ring gateway: a thin binding over `io_uring`.
//!
//! Grounded on the submission/completion shape in
//! `examples/other_examples/83b5caab_tokio-rs-io-uring__src-submit.rs.rs`
//! (the `io-uring` crate's own `Submitter`) and
//! `examples/other_examples/350c3b23_DennisN22042003-Uring_Fast_Read__src-lib.rs.rs`
//! (the `IoUring::new` / `opcode::*::new(...).build().user_data(..)` /
//! `ring.submission().push(..)` / `ring.completion()` call shape). Linked
//! timeouts and cancellation follow `spec.md` §4.1/§4.2 and
//! `original_source/co_async/threading/basic_loop.hpp`.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::task::Waker;

use io_uring::{opcode, squeue, types, IoUring};
use slab::Slab;

/// One pending ring operation's bookkeeping: the waker to resume once its
/// completion arrives, and the completion result once it has.
enum Waiter {
    Pending(Option<Waker>),
    Done(i32),
}

/// Owns exactly one `io_uring` instance.
///
/// Invariant (`spec.md` §3 "Ring context"): each live [`Waiter`] slot
/// corresponds to exactly one in-flight submission; a linked chain is
/// submitted as consecutive entries sharing flags, and is tracked by the
/// slot of its *first* (non-timeout) entry only — the timeout entry itself
/// never has an awaiter of its own.
pub struct RingContext {
    ring: RefCell<IoUring>,
    waiters: RefCell<Slab<Waiter>>,
}

impl RingContext {
    pub(crate) fn new(entries: u32) -> io::Result<Rc<RingContext>> {
        let ring = IoUring::new(entries)?;
        Ok(Rc::new(RingContext {
            ring: RefCell::new(ring),
            waiters: RefCell::new(Slab::new()),
        }))
    }

    /// Reserve a waiter slot, returning the `user_data` value to stamp on the
    /// submission queue entry that will complete it.
    pub(crate) fn reserve(&self) -> u64 {
        self.waiters.borrow_mut().insert(Waiter::Pending(None)) as u64
    }

    /// Register (or replace) the waker for a reserved slot.
    pub(crate) fn set_waker(&self, user_data: u64, waker: Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if let Some(slot) = waiters.get_mut(user_data as usize) {
            if let Waiter::Pending(w) = slot {
                *w = Some(waker);
            }
        }
    }

    /// Take the completion result for a slot if it has arrived, freeing the
    /// slot. Returns `None` if still pending.
    pub(crate) fn take_result(&self, user_data: u64) -> Option<i32> {
        let mut waiters = self.waiters.borrow_mut();
        match waiters.get(user_data as usize) {
            Some(Waiter::Done(_)) => {
                if let Waiter::Done(res) = waiters.remove(user_data as usize) {
                    Some(res)
                } else {
                    unreachable!()
                }
            }
            _ => None,
        }
    }

    /// Push one submission queue entry, stamped with `user_data`.
    ///
    /// # Safety
    /// The caller must ensure any buffer pointers referenced by `entry`
    /// remain valid and unmoved until the matching completion is observed
    /// (this holds for `RingOp`, whose buffers live in owned `Vec<u8>`s that
    /// outlive the submission).
    pub(crate) unsafe fn push(&self, entry: &squeue::Entry) {
        let mut ring = self.ring.borrow_mut();
        // The SQ might be momentarily full under heavy pipelining; flush a
        // partial submit rather than panicking, matching the teacher-adjacent
        // io-uring examples' "push may fail, submit and retry" pattern.
        if ring.submission().push(entry).is_err() {
            let _ = ring.submit();
            let _ = ring.submission().push(entry);
        }
    }

    /// Submit a two-entry linked chain (`spec.md` §4.1 `link_ops`): `first`
    /// gets `IOSQE_IO_LINK` set, `second` (typically a `link_timeout`)
    /// follows immediately. Only `first`'s `user_data` is tracked as a
    /// waiter; `second` carries a sentinel `user_data` of `u64::MAX` that
    /// completions silently ignore.
    pub(crate) unsafe fn push_linked(&self, first: squeue::Entry, second: squeue::Entry) {
        let linked = first.flags(squeue::Flags::IO_LINK);
        self.push(&linked);
        self.push(&second);
    }

    /// Request cancellation of the in-flight (or not-yet-reaped) operation
    /// identified by `user_data`, per `spec.md` §4.2.
    pub(crate) fn cancel(&self, user_data: u64) {
        let entry = opcode::AsyncCancel::new(user_data).build().user_data(u64::MAX);
        unsafe {
            self.push(&entry);
        }
        let _ = self.ring.borrow_mut().submit();
    }

    /// Flush pending submissions to the kernel without blocking.
    pub(crate) fn submit(&self) -> io::Result<usize> {
        self.ring.borrow_mut().submit()
    }

    /// True if no local work is ready and we would have to ask the kernel.
    pub(crate) fn has_in_flight(&self) -> bool {
        !self.waiters.borrow().is_empty()
    }

    /// Submit and block until at least one completion arrives, then drain
    /// the completion queue, recording each result and waking its awaiter.
    /// This is the "block on the ring for at least one completion" half of
    /// `spec.md` §4.1's scheduler contract.
    pub(crate) fn submit_and_wait_one(&self) -> io::Result<()> {
        self.ring.borrow_mut().submit_and_wait(1)?;
        self.drain_completions();
        Ok(())
    }

    fn drain_completions(&self) {
        let mut ring = self.ring.borrow_mut();
        let mut woken = Vec::new();
        for cqe in ring.completion() {
            let user_data = cqe.user_data();
            if user_data == u64::MAX {
                // AsyncCancel / LinkTimeout bookkeeping entries: no awaiter.
                continue;
            }
            let mut waiters = self.waiters.borrow_mut();
            if let Some(slot) = waiters.get_mut(user_data as usize) {
                let waker = match std::mem::replace(slot, Waiter::Done(cqe.result())) {
                    Waiter::Pending(w) => w,
                    Waiter::Done(_) => None,
                };
                if let Some(w) = waker {
                    woken.push(w);
                }
            }
        }
        drop(ring);
        for waker in woken {
            waker.wake();
        }
    }
}

pub(crate) use types::Fd;
