//! Request/response line+header parsing and chunked/fixed body framing
//! (`spec.md` §4.5, §6).
//!
//! Grounded on `teacher_src/http.rs`'s old (pre-`std::future`)
//! `HttpReader`/`HttpWriter` chunked-framing shape, re-expressed directly on
//! top of [`crate::io::BufferedStream`]'s line-oriented `getline_delim`
//! rather than pulling in `httparse` — the stream layer's whole reason to
//! carry line-oriented reads (`spec.md` §4.3) is exactly this: request
//! lines and header lines are CRLF-terminated text, so there is no
//! standalone buffer to hand to a byte-slice parser without double-buffering.

use crate::error::{Error, Kind, Result};
use crate::io::{BufferedStream, RawChannel};

use super::message::{HTTPRequest, HTTPResponse, Headers, HttpVersion};
use super::uri::URI;

const MAX_HEADER_LINE: usize = 16 * 1024;
const MAX_HEADERS: usize = 128;

fn parse_version(s: &str) -> Result<HttpVersion> {
    match s {
        "HTTP/1.1" => Ok(HttpVersion::Http11),
        "HTTP/1.0" => Ok(HttpVersion::Http10),
        _ => Err(Error::protocol(format!("unsupported HTTP version {:?}", s))),
    }
}

async fn read_crlf_line<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    stream.getline_delim(&mut line, b"\r\n").await?;
    if line.len() > MAX_HEADER_LINE {
        return Err(Error::protocol("header line too long"));
    }
    Ok(line)
}

async fn read_headers<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<Headers> {
    let mut headers = Headers::new();
    loop {
        let line = read_crlf_line(stream).await?;
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.iter().count() >= MAX_HEADERS {
            return Err(Error::protocol("too many headers"));
        }
        let text = String::from_utf8_lossy(&line);
        let (key, value) = text
            .split_once(':')
            .ok_or_else(|| Error::protocol(format!("malformed header line {:?}", text)))?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
}

/// Read one full request: request-line, headers, and (per `Content-Length`
/// or `Transfer-Encoding: chunked`) the body.
pub async fn read_request<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<HTTPRequest> {
    let line = read_crlf_line(stream).await?;
    let text = String::from_utf8_lossy(&line);
    let mut parts = text.splitn(3, ' ');
    let method = parts.next().ok_or_else(|| Error::protocol("missing method"))?.to_string();
    let target = parts.next().ok_or_else(|| Error::protocol("missing request target"))?;
    let version_str = parts.next().ok_or_else(|| Error::protocol("missing HTTP version"))?;
    let version = parse_version(version_str)?;
    let uri = URI::parse(target);

    let headers = read_headers(stream).await?;
    let body = read_request_body(stream, &headers).await?;

    Ok(HTTPRequest {
        method,
        uri,
        version,
        headers,
        body,
    })
}

async fn read_request_body<C: RawChannel>(stream: &mut BufferedStream<C>, headers: &Headers) -> Result<Vec<u8>> {
    if is_chunked(headers) {
        read_chunked_body(stream).await
    } else if let Some(len) = content_length(headers)? {
        stream.getn(len).await
    } else {
        Ok(Vec::new())
    }
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &Headers) -> Result<Option<usize>> {
    match headers.get("content-length") {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::protocol(format!("bad Content-Length {:?}", v))),
    }
}

async fn read_chunked_body<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let size_line = read_crlf_line(stream).await?;
        let size_text = String::from_utf8_lossy(&size_line);
        let size_hex = size_text.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| Error::protocol(format!("bad chunk size {:?}", size_text)))?;
        if size == 0 {
            // Trailer headers, if any, then the terminating blank line.
            loop {
                let trailer = read_crlf_line(stream).await?;
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(body);
        }
        let chunk = stream.getn(size).await?;
        body.extend_from_slice(&chunk);
        let trailing = read_crlf_line(stream).await?;
        if !trailing.is_empty() {
            return Err(Error::protocol("malformed chunk trailer"));
        }
    }
}

/// The two ways a response body is framed (`spec.md` §4.5): a known
/// up-front length, or chunked transfer encoding for streamed bodies.
#[derive(Debug, Clone, Copy)]
pub enum BodyFraming {
    FixedLength(usize),
    Chunked,
}

/// Write the status line and headers, adding the framing header
/// (`Content-Length` or `Transfer-Encoding: chunked`) appropriate to
/// `framing`. Must precede any body write (`spec.md` §4.5).
pub async fn write_response_head<C: RawChannel>(
    stream: &mut BufferedStream<C>,
    version: HttpVersion,
    resp: &HTTPResponse,
    framing: BodyFraming,
) -> Result<()> {
    let reason = super::message::reason_phrase(resp.status);
    stream
        .puts(&format!("{} {} {}\r\n", version.as_str(), resp.status, reason))
        .await?;
    for (k, v) in resp.headers.iter() {
        stream.puts(&format!("{}: {}\r\n", k, v)).await?;
    }
    match framing {
        BodyFraming::FixedLength(n) => {
            stream.puts(&format!("Content-Length: {}\r\n", n)).await?;
        }
        BodyFraming::Chunked => {
            stream.puts("Transfer-Encoding: chunked\r\n").await?;
        }
    }
    stream.puts("\r\n").await
}

/// Write a complete fixed-length body (paired with
/// `BodyFraming::FixedLength`).
pub async fn write_body_fixed<C: RawChannel>(stream: &mut BufferedStream<C>, body: &[u8]) -> Result<()> {
    stream.putspan(body).await?;
    stream.flush().await
}

/// Write one chunk (paired with `BodyFraming::Chunked`); `chunk` may be
/// empty mid-stream without terminating — call [`write_chunked_end`] once
/// the body is exhausted.
pub async fn write_chunk<C: RawChannel>(stream: &mut BufferedStream<C>, chunk: &[u8]) -> Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    stream.puts(&format!("{:x}\r\n", chunk.len())).await?;
    stream.putspan(chunk).await?;
    stream.puts("\r\n").await?;
    stream.flush().await
}

/// Terminate a chunked body: the zero-length final chunk plus the empty
/// trailer line.
pub async fn write_chunked_end<C: RawChannel>(stream: &mut BufferedStream<C>) -> Result<()> {
    stream.puts("0\r\n\r\n").await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::LocalBoxFuture;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    struct MemChannel {
        data: Vec<u8>,
        pos: usize,
        out: Rc<RefCell<Vec<u8>>>,
    }

    impl RawChannel for MemChannel {
        fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let remaining = self.data.len() - self.pos;
                let take = remaining.min(buf.len());
                buf[..take].copy_from_slice(&self.data[self.pos..self.pos + take]);
                self.pos += take;
                Ok(take)
            })
        }

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                self.out.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            })
        }

        fn seek(&mut self, _pos: u64) -> LocalBoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn flush(&mut self) -> LocalBoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&mut self) -> LocalBoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn set_timeout(&mut self, _timeout: Option<Duration>) {}
    }

    fn block_on<T>(fut: impl std::future::Future<Output = T>) -> T {
        let sched = crate::rt::Scheduler::new(8).unwrap();
        sched.join(crate::rt::Task::new(fut))
    }

    #[test]
    fn reads_fixed_length_body() {
        let raw = b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        let chan = MemChannel {
            data: raw.to_vec(),
            pos: 0,
            out: Rc::new(RefCell::new(Vec::new())),
        };
        let mut stream = BufferedStream::new(chan);
        let req = block_on(read_request(&mut stream)).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.uri.path, "/echo");
        assert_eq!(req.body, b"abc");
    }

    #[test]
    fn reads_chunked_body() {
        let raw = b"GET / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        let chan = MemChannel {
            data: raw.to_vec(),
            pos: 0,
            out: Rc::new(RefCell::new(Vec::new())),
        };
        let mut stream = BufferedStream::new(chan);
        let req = block_on(read_request(&mut stream)).unwrap();
        assert_eq!(req.body, b"abcde");
    }

    #[test]
    fn writes_fixed_length_response() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let chan = MemChannel {
            data: Vec::new(),
            pos: 0,
            out: out.clone(),
        };
        let mut stream = BufferedStream::new(chan);
        let resp = HTTPResponse::new(200).with_header("Content-Type", "text/plain");
        block_on(async {
            write_response_head(&mut stream, HttpVersion::Http11, &resp, BodyFraming::FixedLength(2))
                .await
                .unwrap();
            write_body_fixed(&mut stream, b"hi").await.unwrap();
        });
        let written = String::from_utf8(out.borrow().clone()).unwrap();
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.contains("Content-Length: 2\r\n"));
        assert!(written.ends_with("\r\n\r\nhi"));
    }
}
