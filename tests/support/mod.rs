//! Shared end-to-end test harness (`spec.md` §8 "End-to-end scenarios").
//!
//! Each test owns its own port and its own background server thread: the
//! scheduler/ring (`Rc`-based throughout) can't cross a thread boundary, so
//! every helper here builds one from scratch inside the spawned thread and
//! leaves it running detached for the lifetime of the test process rather
//! than trying to signal it to shut down from outside.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ringrt::net::{listener_bind, SocketAddress};
use ringrt::rt::{Scheduler, Task};
use ringrt::server::{serve, with_static_root, Router, ServerConfig};

/// Spin up a static-file/directory/CGI server over `document_root`.
pub fn start_static_server(port: u16, document_root: String) {
    start_custom_server(port, document_root, |router, scheduler, config| {
        *router = with_static_root(std::mem::take(router), scheduler, config.clone());
    });
}

/// Spin up a server whose routes `build` registers on an empty `Router`,
/// given the same `ServerConfig` (document root, buffer size, ...) the
/// connection loop itself uses.
pub fn start_custom_server<F>(port: u16, document_root: String, build: F)
where
    F: FnOnce(&mut Router, &Scheduler, &std::rc::Rc<ServerConfig>) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("ringrt-test-server-{}", port))
        .spawn(move || {
            let scheduler = Scheduler::new(256).expect("failed to create ring");
            let addr = SocketAddress::parse(&format!("127.0.0.1:{}", port)).expect("bad test address");
            let listener = listener_bind(scheduler.ring(), addr, 128).expect("bind failed");
            let config = std::rc::Rc::new(ServerConfig::new(document_root));
            let mut router = Router::new();
            build(&mut router, &scheduler, &config);
            let router = std::rc::Rc::new(router);
            scheduler.join(Task::new(serve(scheduler.clone(), listener, router, config, None)));
        })
        .expect("failed to spawn server thread");
    wait_for_port(port);
}

fn wait_for_port(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        if Instant::now() >= deadline {
            panic!("server on port {} never came up", port);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Send a minimal HTTP/1.1 request and parse a `Content-Length`-framed
/// response. Every handler in this server sets an explicit length, so a
/// chunked-decoder isn't needed here.
pub fn http_request(port: u16, method: &str, path: &str, body: &[u8]) -> RawResponse {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to test server");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut request = format!("{} {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n", method, path);
    if !body.is_empty() {
        request.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();
    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> RawResponse {
    let header_end = find_subslice(raw, b"\r\n\r\n").expect("response missing header terminator");
    let head = std::str::from_utf8(&raw[..header_end]).expect("non-utf8 response headers");
    let mut lines = head.split("\r\n");
    let status_line = lines.next().expect("missing status line");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .expect("missing status code")
        .parse()
        .expect("non-numeric status code");

    let mut headers = Vec::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let body = raw[header_end + 4..].to_vec();
    RawResponse { status, headers, body }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A throwaway directory under the OS temp dir, removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(label: &str) -> TempDir {
        let n = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("ringrt-test-{}-{}-{}", label, std::process::id(), n));
        std::fs::create_dir_all(&path).expect("create temp dir");
        TempDir(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
