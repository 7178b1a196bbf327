//! HTTP/1.1 + CGI server built on the [`crate::rt`]/[`crate::io`] layers
//! below it (`spec.md` §4.5–§4.7).
//!
//! `ServerConfig` is the ambient configuration layer `SPEC_FULL.md` §2 adds
//! on top of `spec.md`'s own data model, shaped like the teacher's `Http`
//! builder (`teacher_src/server/conn.rs`'s `max_buf_size`/keep-alive knobs)
//! but covering this server's own concerns: buffer size, I/O timeout,
//! document root, and whether CGI children inherit the parent environment.

mod cgi;
mod conn;
mod router;
mod static_files;

use std::rc::Rc;
use std::time::Duration;

pub use conn::{make_error_response, serve, HandlerIo};
pub use router::{Handler, Router};
pub use static_files::{html_encode, make_response_from_directory, make_response_from_file, make_response_from_path};

/// Runtime configuration for a [`serve`] invocation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Size of each connection's input/output buffers (`spec.md` §4.3).
    pub buffer_capacity: usize,
    /// Applied to every socket read/write on a connection; `None` disables
    /// the timeout (`spec.md` §4.2).
    pub read_write_timeout: Option<Duration>,
    /// Filesystem root static-file and CGI routes resolve request paths
    /// against.
    pub document_root: String,
    /// Whether spawned CGI children inherit the parent's environment in
    /// addition to the per-request `HTTP_*`/`QUERY_STRING`/... variables
    /// (`spec.md` §4.7 step 3).
    pub cgi_inherit_env: bool,
}

impl ServerConfig {
    pub fn new(document_root: impl Into<String>) -> ServerConfig {
        ServerConfig {
            buffer_capacity: 8 * 1024,
            read_write_timeout: Some(Duration::from_secs(30)),
            document_root: document_root.into(),
            cgi_inherit_env: true,
        }
    }

    pub fn buffer_capacity(mut self, n: usize) -> ServerConfig {
        self.buffer_capacity = n;
        self
    }

    pub fn read_write_timeout(mut self, timeout: Option<Duration>) -> ServerConfig {
        self.read_write_timeout = timeout;
        self
    }
}

/// Resolve a request path to a filesystem path under `root`, rejecting
/// `..` segments so a request can't escape the document root.
fn resolve_under_root(root: &str, url_path: &str) -> Option<String> {
    if url_path.split('/').any(|seg| seg == "..") {
        return None;
    }
    let trimmed = url_path.trim_start_matches('/');
    if trimmed.is_empty() {
        Some(format!("{}/index.html", root.trim_end_matches('/')))
    } else {
        Some(format!("{}/{}", root.trim_end_matches('/'), trimmed))
    }
}

/// Register a catch-all `GET /*` route that serves `config.document_root`
/// via [`static_files::make_response_from_path`] (static files, directory
/// listings, and CGI scripts alike — `spec.md` §6's demo server shape).
pub fn with_static_root(
    mut router: Router,
    scheduler: &crate::rt::Scheduler,
    config: Rc<ServerConfig>,
) -> Router {
    let ring = scheduler.ring().clone();
    router.route("GET", "/*", move |io, req| {
        let ring = ring.clone();
        let config = config.clone();
        crate::rt::Task::new(async move {
            let url_path = req.uri.path.clone();
            let disk_path = resolve_under_root(&config.document_root, &url_path);
            let mut io_ref = io.borrow_mut();
            match disk_path {
                Some(path) => make_response_from_path(&mut io_ref, &ring, &req, &path, &url_path).await,
                None => make_error_response(&mut io_ref, 403).await,
            }
        })
    });
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_under_root_rejects_dotdot() {
        assert_eq!(resolve_under_root("/srv", "/../etc/passwd"), None);
        assert_eq!(resolve_under_root("/srv", "/a/../b"), None);
    }

    #[test]
    fn resolve_under_root_maps_empty_path_to_index() {
        assert_eq!(resolve_under_root("/srv", "/"), Some("/srv/index.html".to_string()));
    }

    #[test]
    fn resolve_under_root_joins_plain_path() {
        assert_eq!(resolve_under_root("/srv", "/a/b.txt"), Some("/srv/a/b.txt".to_string()));
    }
}
