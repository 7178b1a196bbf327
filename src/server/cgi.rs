//! CGI dispatch (`spec.md` §4.7).
//!
//! Steps, per `spec.md` §4.7: build an environment from the request (method,
//! path, query string, content length/type, `HTTP_*` headers), spawn the
//! script with stdin/stdout redirected through pipes, write the request body
//! to its stdin, read a CGI header block off its stdout followed by the
//! body, and translate that into an HTTP response. Grounded on
//! `original_source/co_async/http/http_server_utils.hpp`'s CGI handler and on
//! `crate::fs::process` for the spawn primitive.

use std::rc::Rc;

use crate::error::{Error, Kind, Result};
use crate::fs::{fs_pipe, FileChannel, ProcessBuilder};
use crate::http::{HTTPRequest, HTTPResponse, Headers};
use crate::io::{BufferedStream, RawChannel};
use crate::rt::RingContext;

use super::conn::{make_error_response, HandlerIo};

/// A GET-parameter key must consist entirely of ASCII letters and
/// underscores to be forwarded into the CGI environment (`DESIGN.md` Open
/// Question #2).
pub fn is_valid_get_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_')
}

/// A request header name, after `-` is remapped to `_`, must consist
/// entirely of lowercase ASCII letters and underscores to become an
/// `HTTP_*` environment variable (`DESIGN.md` Open Question #2).
pub fn is_valid_header_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}

fn header_env_name(key: &str) -> Option<String> {
    let remapped: String = key.chars().map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() }).collect();
    if is_valid_header_key(&remapped) {
        Some(format!("HTTP_HEADER_{}", remapped))
    } else {
        None
    }
}

/// `HTTP_PATH`, `HTTP_METHOD`, `HTTP_GET_{key}`, `HTTP_HEADER_{key}`
/// (`spec.md` §6).
fn build_env(req: &HTTPRequest) -> Vec<(String, String)> {
    let mut env = Vec::new();
    env.push(("HTTP_PATH".to_string(), req.uri.path.clone()));
    env.push(("HTTP_METHOD".to_string(), req.method.clone()));

    for (k, v) in &req.uri.params {
        if is_valid_get_key(k) {
            env.push((format!("HTTP_GET_{}", k), v.clone()));
        }
    }

    for (k, v) in req.headers.iter() {
        if let Some(name) = header_env_name(k) {
            env.push((name, v.to_string()));
        }
    }

    env
}

async fn read_cgi_header_block<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<(u16, Headers)> {
    let mut status = 200u16;
    let mut headers = Headers::new();
    loop {
        let mut line = Vec::new();
        stream.getline_delim(&mut line, b"\n").await?;
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Ok((status, headers));
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if key.eq_ignore_ascii_case("status") {
                if let Some(code) = value.split_whitespace().next() {
                    if let Ok(n) = code.parse::<u16>() {
                        status = n;
                    }
                }
            } else {
                headers.insert(key.to_string(), value.to_string());
            }
        } else {
            return Err(Error::new(Kind::ProtocolError));
        }
    }
}

/// Run `script_path` as a CGI program for `req` and write its output as the
/// HTTP response.
pub async fn run_cgi(io: &mut HandlerIo, ring: &Rc<RingContext>, req: &HTTPRequest, script_path: &str) -> Result<()> {
    let (stdin_r, stdin_w) = match fs_pipe(ring) {
        Ok(p) => p,
        Err(_) => return make_error_response(io, 500).await,
    };
    let (stdout_r, stdout_w) = match fs_pipe(ring) {
        Ok(p) => p,
        Err(_) => return make_error_response(io, 500).await,
    };

    let mut builder = ProcessBuilder::new(script_path).inherit_env(true);
    for (k, v) in build_env(req) {
        builder = builder.env(k, v);
    }
    let child = {
        let builder = builder.stdin(stdin_r.raw_fd()).stdout(stdout_w.raw_fd());
        builder.spawn()
    };
    drop(stdin_r);
    drop(stdout_w);

    let child = match child {
        Ok(c) => c,
        Err(_) => return make_error_response(io, 500).await,
    };

    let mut stdin_chan = FileChannel::new(stdin_w, false);
    let mut written = 0;
    while written < req.body.len() {
        let n = stdin_chan.write(&req.body[written..]).await?;
        if n == 0 {
            break;
        }
        written += n;
    }
    stdin_chan.close().await?;

    let stdout_chan = FileChannel::new(stdout_r, false);
    let mut stdout_stream = BufferedStream::new(stdout_chan);
    let (status, headers) = read_cgi_header_block(&mut stdout_stream).await?;

    let mut body = Vec::new();
    stdout_stream.getall(&mut body).await?;

    let status_code = child.wait().await?;
    if status_code != 0 {
        return make_error_response(io, 500).await;
    }

    let mut resp = HTTPResponse::new(status);
    for (k, v) in headers.iter() {
        resp = resp.with_header(k, v);
    }
    io.write_header(&resp, Some(body.len())).await?;
    io.write_body(&body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_key_validation_rejects_digits_and_punctuation() {
        assert!(is_valid_get_key("name"));
        assert!(is_valid_get_key("a_b"));
        assert!(!is_valid_get_key("na2me"));
        assert!(!is_valid_get_key("na-me"));
        assert!(!is_valid_get_key(""));
    }

    #[test]
    fn header_env_name_remaps_dash_and_lowercases() {
        assert_eq!(header_env_name("X-Forwarded-For"), Some("HTTP_HEADER_x_forwarded_for".to_string()));
        assert_eq!(header_env_name("Accept9"), None);
    }

    #[test]
    fn build_env_covers_path_method_get_and_headers() {
        let mut req = HTTPRequest {
            method: "GET".to_string(),
            uri: crate::http::URI::parse("/cgi.sh?foo=bar"),
            version: crate::http::HttpVersion::Http11,
            headers: Headers::new(),
            body: Vec::new(),
        };
        req.headers.insert("X-Custom", "value");
        let env = build_env(&req);
        assert!(env.contains(&("HTTP_PATH".to_string(), "/cgi.sh".to_string())));
        assert!(env.contains(&("HTTP_METHOD".to_string(), "GET".to_string())));
        assert!(env.contains(&("HTTP_GET_foo".to_string(), "bar".to_string())));
        assert!(env.contains(&("HTTP_HEADER_x_custom".to_string(), "value".to_string())));
    }
}
