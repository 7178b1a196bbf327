//! Static file and directory-listing handlers (`spec.md` §4.6).
//!
//! Grounded on `original_source/co_async/http/http_server_utils.hpp`'s
//! `make_response_from_*` trio. The missing-`co_await` bug noted in
//! `spec.md` §9 ("`make_response_from_directory` omits an explicit
//! `co_await` on some error paths") is deliberately not reproduced: every
//! fallible call below is awaited (see `DESIGN.md` Open Question #3).

use std::rc::Rc;

use crate::error::Result;
use crate::fs::{fs_open, fs_stat, DirectoryWalker, FileChannel, OpenMode};
use crate::http::{url_encode, HTTPRequest, HTTPResponse};
use crate::rt::RingContext;

use super::conn::{make_error_response, HandlerIo};

fn guess_content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html;charset=utf-8",
        "txt" => "text/plain;charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Encode `&`, `"`, `'`, `<`, `>`; every other byte passes through
/// (`spec.md` §4.6).
pub fn html_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// `stat → 404 if missing or directory → 403 if unreadable → 200 with
/// guessed Content-Type, body streamed from the open file` (`spec.md`
/// §4.6).
pub async fn make_response_from_file(io: &mut HandlerIo, ring: &Rc<RingContext>, disk_path: &str) -> Result<()> {
    let stat = match fs_stat(ring, None, disk_path).await {
        Ok(s) => s,
        Err(_) => return make_error_response(io, 404).await,
    };
    if stat.is_directory() {
        return make_error_response(io, 404).await;
    }
    if !stat.is_readable() {
        return make_error_response(io, 403).await;
    }

    let handle = fs_open(ring, None, disk_path, OpenMode::READ_ONLY, 0).await?;
    let mut channel = FileChannel::new(handle, true);
    let resp = HTTPResponse::new(200).with_header("Content-Type", guess_content_type(disk_path));
    io.write_header(&resp, Some(stat.size as usize)).await?;
    io.write_body_stream(&mut channel).await
}

/// Emits an HTML listing with a link to the parent directory and one link
/// per entry, skipping `.`/`..` (`spec.md` §4.6, §6).
pub async fn make_response_from_directory(io: &mut HandlerIo, ring: &Rc<RingContext>, disk_path: &str, url_path: &str) -> Result<()> {
    let handle = match fs_open(ring, None, disk_path, OpenMode::READ_ONLY, 0).await {
        Ok(h) => h,
        Err(_) => return make_error_response(io, 404).await,
    };
    let mut walker = DirectoryWalker::new(handle);

    let mut body = String::new();
    body.push_str(&format!("<h1>Files in {}:</h1>", html_encode(url_path)));
    let parent = parent_url(url_path);
    body.push_str(&format!("<a href=\"{}\">..</a><br>", url_encode(&parent)));

    loop {
        let entry = walker.next().await?;
        let name = match entry {
            Some(n) => n,
            None => break,
        };
        if name == "." || name == ".." {
            continue;
        }
        let href = format!("{}/{}", url_path.trim_end_matches('/'), url_encode(&name));
        body.push_str(&format!("<a href=\"{}\">{}</a><br>", href, html_encode(&name)));
    }

    let resp = HTTPResponse::new(200).with_header("Content-Type", "text/html;charset=utf-8");
    io.write_header(&resp, Some(body.len())).await?;
    io.write_body(body.as_bytes()).await
}

fn parent_url(url_path: &str) -> String {
    let trimmed = url_path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => format!("{}/", parent),
        _ => "/".to_string(),
    }
}

/// `stat → 404/403; if directory → directory listing; if executable →
/// CGI; else → file` (`spec.md` §4.6).
pub async fn make_response_from_path(
    io: &mut HandlerIo,
    ring: &Rc<RingContext>,
    req: &HTTPRequest,
    disk_path: &str,
    url_path: &str,
) -> Result<()> {
    let stat = match fs_stat(ring, None, disk_path).await {
        Ok(s) => s,
        Err(_) => return make_error_response(io, 404).await,
    };
    if !stat.is_readable() {
        return make_error_response(io, 403).await;
    }
    if stat.is_directory() {
        return make_response_from_directory(io, ring, disk_path, url_path).await;
    }
    if stat.is_executable() {
        return super::cgi::run_cgi(io, ring, req, disk_path).await;
    }
    make_response_from_file(io, ring, disk_path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_encode_is_identity_without_special_chars() {
        let s = "plain text 123";
        assert_eq!(html_encode(s), s);
    }

    #[test]
    fn html_encode_escapes_special_chars() {
        assert_eq!(html_encode("<a href=\"x\">y & 'z'</a>"), "&lt;a href=&quot;x&quot;&gt;y &amp; &apos;z&apos;&lt;/a&gt;");
    }

    #[test]
    fn parent_url_of_nested_dir() {
        assert_eq!(parent_url("/some/dir/"), "/some/");
        assert_eq!(parent_url("/top/"), "/");
    }
}
