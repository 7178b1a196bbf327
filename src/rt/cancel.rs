//! Structured cancellation tokens.
//!
//! Ground: `spec.md` §4.2/§5 — no `cancel_token.hpp` survived the filtering
//! of `original_source/`, so this follows the spec's prose contract
//! directly: a shared `{canceled, cancellers}` record; `invoke` registers a
//! canceller; cancellation is idempotent and short-circuits future ops once
//! set.

use std::cell::RefCell;
use std::rc::Rc;

use super::ring::RingContext;

struct State {
    canceled: bool,
    cancellers: Vec<(Rc<RingContext>, u64)>,
}

/// A reference to shared `{canceled, cancellers}` state (`spec.md` §3).
///
/// Cloning a `CancelToken` shares the same underlying state — cancel one
/// handle and every clone observes it.
#[derive(Clone)]
pub struct CancelToken {
    state: Rc<RefCell<State>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken {
            state: Rc::new(RefCell::new(State {
                canceled: false,
                cancellers: Vec::new(),
            })),
        }
    }

    /// True once `cancel()` has been called.
    pub fn is_canceled(&self) -> bool {
        self.state.borrow().canceled
    }

    /// Mark canceled and request cancellation of every currently registered
    /// in-flight operation. Idempotent: calling this more than once, or on
    /// an already-canceled token, is a no-op beyond the first call.
    pub fn cancel(&self) {
        let cancellers = {
            let mut state = self.state.borrow_mut();
            if state.canceled {
                return;
            }
            state.canceled = true;
            std::mem::take(&mut state.cancellers)
        };
        for (ring, user_data) in cancellers {
            ring.cancel(user_data);
        }
    }

    /// Register an in-flight operation's `user_data` for cancellation.
    /// Returns a guard that deregisters it once the operation completes, so
    /// a late `cancel()` call doesn't target a reused slot.
    pub(crate) fn register(&self, ring: Rc<RingContext>, user_data: u64) -> CancelGuard {
        self.state
            .borrow_mut()
            .cancellers
            .push((ring.clone(), user_data));
        CancelGuard {
            state: self.state.clone(),
            user_data,
        }
    }
}

pub(crate) struct CancelGuard {
    state: Rc<RefCell<State>>,
    user_data: u64,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.state
            .borrow_mut()
            .cancellers
            .retain(|(_, ud)| *ud != self.user_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let tok = CancelToken::new();
        tok.cancel();
        tok.cancel();
        assert!(tok.is_canceled());
    }

    #[test]
    fn clone_shares_state() {
        let tok = CancelToken::new();
        let clone = tok.clone();
        clone.cancel();
        assert!(tok.is_canceled());
    }
}
