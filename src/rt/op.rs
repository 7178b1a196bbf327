//! The ring operation awaitable — `spec.md` §4.1's "Ring operation
//! awaitable: encapsulates one submission entry with user-data pointing at
//! the awaiting task's continuation."
//!
//! `await_ready` is always false except for a pre-canceled token, in which
//! case the operation fails immediately without ever touching the ring
//! (`spec.md` §4.2's short-circuit invariant); `await_suspend` writes the
//! entry and records the continuation; `await_resume` returns the kernel
//! result. That triad maps directly onto `Future::poll`'s three outcomes
//! below.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use io_uring::{opcode, squeue, types};
use libc::ECANCELED;

use crate::error::{Error, Kind, Result};

use super::cancel::{CancelGuard, CancelToken};
use super::ring::RingContext;

/// One pending (or already resolved) ring submission.
///
/// `K` is an opaque "keepalive" payload — typically the `Vec<u8>` buffer a
/// read/write targets, or a boxed `Timespec` for a linked timeout — kept
/// alive inside the future so the kernel always sees a stable address for
/// as long as the operation might still be in flight.
pub(crate) enum RingOp<K> {
    PreCanceled,
    Active {
        ring: Rc<RingContext>,
        entry: Option<squeue::Entry>,
        linked_timeout: Option<squeue::Entry>,
        user_data: u64,
        keepalive: K,
        cancel_guard: Option<CancelGuard>,
    },
}

impl<K> RingOp<K> {
    /// Build a single (non-linked) ring operation.
    pub(crate) fn new(
        ring: Rc<RingContext>,
        entry: squeue::Entry,
        keepalive: K,
        cancel: Option<&CancelToken>,
    ) -> RingOp<K> {
        Self::build(ring, entry, None, keepalive, cancel)
    }

    /// Build a linked chain: `entry` gets `IOSQE_IO_LINK`, `timeout` follows
    /// immediately (`spec.md` §4.2 "Timeouts" / §9 "Linked ops and
    /// timeouts").
    pub(crate) fn new_linked(
        ring: Rc<RingContext>,
        entry: squeue::Entry,
        timeout: squeue::Entry,
        keepalive: K,
        cancel: Option<&CancelToken>,
    ) -> RingOp<K> {
        Self::build(ring, entry, Some(timeout), keepalive, cancel)
    }

    fn build(
        ring: Rc<RingContext>,
        entry: squeue::Entry,
        linked_timeout: Option<squeue::Entry>,
        keepalive: K,
        cancel: Option<&CancelToken>,
    ) -> RingOp<K> {
        if let Some(tok) = cancel {
            if tok.is_canceled() {
                return RingOp::PreCanceled;
            }
        }
        let user_data = ring.reserve();
        let cancel_guard = cancel.map(|tok| tok.register(ring.clone(), user_data));
        RingOp::Active {
            ring,
            entry: Some(entry.user_data(user_data)),
            linked_timeout,
            user_data,
            keepalive,
            cancel_guard,
        }
    }
}

/// Submit a single entry with no timeout and no cancellation, awaiting its
/// result. The common case for filesystem ops, which §4.4 doesn't describe
/// as cancelable or timeout-bearing.
pub(crate) async fn submit<K: Unpin>(ring: Rc<RingContext>, entry: squeue::Entry, keepalive: K) -> Result<i32> {
    RingOp::new(ring, entry, keepalive, None).await
}

/// Submit `entry`, optionally guarded by a link-timeout and/or a cancel
/// token (`spec.md` §4.2 "Timeouts": `socket_read`/`socket_connect`/
/// `listener_accept` and peers build a link chain `{op, link_timeout}`).
///
/// A `Canceled` result caused by the timeout link firing (rather than an
/// explicit `cancel.cancel()` call) is translated to `TimedOut` per §4.2 —
/// distinguished by: a timeout was requested, a `CancelToken` was *not*
/// independently canceled, and the op still failed with `Canceled`.
pub(crate) async fn submit_timed<K: Unpin>(
    ring: Rc<RingContext>,
    entry: squeue::Entry,
    keepalive: K,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> Result<i32> {
    let op = match timeout {
        None => RingOp::new(ring, entry, (keepalive, None::<Box<types::Timespec>>), cancel),
        Some(d) => {
            let ts = Box::new(*types::Timespec::new().sec(d.as_secs() as u64).nsec(d.subsec_nanos()));
            let ts_ptr = ts.as_ref() as *const types::Timespec;
            let timeout_entry = opcode::LinkTimeout::new(ts_ptr).build().user_data(u64::MAX);
            RingOp::new_linked(ring, entry, timeout_entry, (keepalive, Some(ts)), cancel)
        }
    };
    let result = op.await;
    let explicitly_canceled = cancel.map(|tok| tok.is_canceled()).unwrap_or(false);
    match result {
        Err(e) if timeout.is_some() && !explicitly_canceled && e.kind() == Kind::Canceled => {
            Err(Error::timed_out())
        }
        other => other,
    }
}

impl<K: Unpin> Future for RingOp<K> {
    type Output = Result<i32>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<i32>> {
        let this = self.get_mut();
        match this {
            RingOp::PreCanceled => Poll::Ready(Err(Error::canceled())),
            RingOp::Active {
                ring,
                entry,
                linked_timeout,
                user_data,
                cancel_guard,
                ..
            } => {
                if let Some(entry) = entry.take() {
                    unsafe {
                        match linked_timeout.take() {
                            Some(timeout) => ring.push_linked(entry, timeout),
                            None => ring.push(&entry),
                        }
                    }
                    ring.set_waker(*user_data, cx.waker().clone());
                    return Poll::Pending;
                }

                match ring.take_result(*user_data) {
                    Some(res) => {
                        cancel_guard.take();
                        if res < 0 {
                            let errno = -res;
                            if errno == ECANCELED {
                                Poll::Ready(Err(Error::canceled()))
                            } else {
                                Poll::Ready(Err(Error::from_errno(errno)))
                            }
                        } else {
                            Poll::Ready(Ok(res))
                        }
                    }
                    None => {
                        ring.set_waker(*user_data, cx.waker().clone());
                        Poll::Pending
                    }
                }
            }
        }
    }
}
