//! Route table (`spec.md` §3 `Router`, §4.5).
//!
//! Grounded on the teacher's `service_fn`/`Service` shape (`teacher_src/
//! service.rs`): a handler is a boxed callable rather than a trait object
//! hierarchy, registered via a small builder method instead of a derive.

use std::rc::Rc;

use crate::error::Result;
use crate::rt::Task;

use super::conn::HandlerIo;
use crate::http::HTTPRequest;

/// A request handler: takes the per-connection I/O object and the parsed
/// request, returns a task producing `Ok(())` once the response has been
/// written (or an error, which the caller converts to a 500).
pub type Handler = Rc<dyn Fn(Rc<std::cell::RefCell<HandlerIo>>, HTTPRequest) -> Task<Result<()>>>;

struct Route {
    method: String,
    pattern: String,
    handler: Handler,
}

/// Ordered list of `{method, pattern, handler}` entries (`spec.md` §4.5).
///
/// Lookup: exact match on `(method, path)` first; else the longest
/// registered `prefix*` pattern whose prefix matches `path`; else `None`
/// (caller emits 404).
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Router {
        Router { routes: Vec::new() }
    }

    pub fn route(
        &mut self,
        method: impl Into<String>,
        pattern: impl Into<String>,
        handler: impl Fn(Rc<std::cell::RefCell<HandlerIo>>, HTTPRequest) -> Task<Result<()>> + 'static,
    ) {
        self.routes.push(Route {
            method: method.into(),
            pattern: pattern.into(),
            handler: Rc::new(handler),
        });
    }

    pub fn dispatch(&self, method: &str, path: &str) -> Option<Handler> {
        if let Some(route) = self
            .routes
            .iter()
            .find(|r| r.method == method && r.pattern == path)
        {
            return Some(route.handler.clone());
        }

        self.routes
            .iter()
            .filter(|r| r.method == method && r.pattern.ends_with('*'))
            .filter(|r| path.starts_with(&r.pattern[..r.pattern.len() - 1]))
            .max_by_key(|r| r.pattern.len())
            .map(|r| r.handler.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler(_io: Rc<std::cell::RefCell<HandlerIo>>, _req: HTTPRequest) -> Task<Result<()>> {
        Task::new(async { Ok(()) })
    }

    #[test]
    fn exact_match_wins_over_prefix() {
        let mut router = Router::new();
        router.route("GET", "/a/b", noop_handler);
        router.route("GET", "/a/*", noop_handler);
        assert!(router.dispatch("GET", "/a/b").is_some());
        assert!(router.dispatch("GET", "/a/c").is_some());
        assert!(router.dispatch("GET", "/other").is_none());
    }

    #[test]
    fn longest_matching_prefix_pattern_is_selected() {
        let mut router = Router::new();
        router.route("GET", "/a/*", noop_handler);
        router.route("GET", "/a/b/*", noop_handler);
        // Both patterns match "/a/b/c"; dispatch must pick one rather than
        // panicking on ambiguity, and must still 404 on a disjoint path.
        assert!(router.dispatch("GET", "/a/b/c").is_some());
        assert!(router.dispatch("GET", "/z").is_none());
    }
}
