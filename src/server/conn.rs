//! The accept loop and per-connection handler (`spec.md` §4.5).
//!
//! Grounded on `teacher_src/server/server.rs`'s accept-loop shape (accept,
//! spawn a per-connection future, log and continue past one connection's
//! error rather than killing the loop) and `original_source/co_async/http/
//! http_server_utils.hpp` for the request/response sequencing.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::http::{read_request, write_body_fixed, write_chunk, write_chunked_end, write_response_head, BodyFraming, HTTPRequest, HTTPResponse, HttpVersion};
use crate::io::{BufferedStream, RawChannel};
use crate::net::{listener_accept, SocketChannel, SocketHandle};
use crate::rt::{CancelToken, Scheduler};

use super::router::Router;
use super::ServerConfig;

/// The per-request I/O object handed to a route handler (`spec.md` §4.5
/// "Handler I/O object").
pub struct HandlerIo {
    stream: BufferedStream<SocketChannel>,
    version: HttpVersion,
    framing: Option<BodyFraming>,
}

impl HandlerIo {
    fn new(stream: BufferedStream<SocketChannel>, version: HttpVersion) -> HandlerIo {
        HandlerIo {
            stream,
            version,
            framing: None,
        }
    }

    /// Write status line and headers. `content_length` fixes the framing to
    /// `Content-Length` when known up front; `None` frames the body as
    /// chunked for [`Self::write_body_stream`].
    pub async fn write_header(&mut self, resp: &HTTPResponse, content_length: Option<usize>) -> Result<()> {
        let framing = match content_length {
            Some(n) => BodyFraming::FixedLength(n),
            None => BodyFraming::Chunked,
        };
        write_response_head(&mut self.stream, self.version, resp, framing).await?;
        self.framing = Some(framing);
        Ok(())
    }

    /// Write a complete body whose length was given to [`Self::write_header`].
    pub async fn write_body(&mut self, data: &[u8]) -> Result<()> {
        match self.framing {
            Some(BodyFraming::Chunked) => write_chunk(&mut self.stream, data).await,
            _ => write_body_fixed(&mut self.stream, data).await,
        }
    }

    /// Stream a body in chunks read from `source` until EOF. Framed per
    /// whatever [`Self::write_header`] chose: raw bytes (no markers) for a
    /// known `Content-Length`, or one HTTP chunk per read plus a
    /// terminating zero-length chunk when chunked.
    pub async fn write_body_stream<S: RawChannel>(&mut self, source: &mut S) -> Result<()> {
        let chunked = matches!(self.framing, Some(BodyFraming::Chunked));
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if chunked {
                write_chunk(&mut self.stream, &buf[..n]).await?;
            } else {
                self.stream.putspan(&buf[..n]).await?;
            }
        }
        if chunked {
            write_chunked_end(&mut self.stream).await
        } else {
            self.stream.flush().await
        }
    }

    /// `req.body`, already fully read by the codec.
    pub fn read_body<'a>(&self, req: &'a HTTPRequest) -> &'a [u8] {
        &req.body
    }

    pub fn stream_mut(&mut self) -> &mut BufferedStream<SocketChannel> {
        &mut self.stream
    }
}

/// Write a minimal HTML error response: `<h1>{status} {reason}</h1>`
/// (`spec.md` §4.5 "Error response").
pub async fn make_error_response(io: &mut HandlerIo, status: u16) -> Result<()> {
    let reason = crate::http::reason_phrase(status);
    let body = format!("<h1>{} {}</h1>", status, reason);
    let resp = HTTPResponse::new(status).with_header("Content-Type", "text/html;charset=utf-8");
    io.write_header(&resp, Some(body.len())).await?;
    io.write_body(body.as_bytes()).await
}

/// Accept connections until canceled, spawning one task per connection.
/// Errors from the accept loop are logged and the loop continues
/// (`spec.md` §7).
pub async fn serve(
    scheduler: Scheduler,
    listener: SocketHandle,
    router: Rc<Router>,
    config: Rc<ServerConfig>,
    cancel: Option<CancelToken>,
) {
    let ring = scheduler.ring().clone();
    loop {
        let accepted = listener_accept(&ring, &listener, cancel.as_ref()).await;
        let socket = match accepted {
            Ok(s) => s,
            Err(e) if e.kind() == crate::error::Kind::Canceled => {
                debug!("accept loop canceled");
                return;
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let router = router.clone();
        let config = config.clone();
        scheduler.spawn(crate::rt::Task::new(async move {
            if let Err(e) = handle_connection(socket, router, config).await {
                warn!(error = %e, "connection handler failed");
            }
        }));
    }
}

async fn handle_connection(
    socket: SocketHandle,
    router: Rc<Router>,
    config: Rc<ServerConfig>,
) -> Result<()> {
    let mut channel = SocketChannel::new(socket);
    channel.set_timeout(config.read_write_timeout);
    let stream = BufferedStream::with_capacity(channel, config.buffer_capacity);
    let io = Rc::new(RefCell::new(HandlerIo::new(stream, HttpVersion::Http11)));

    loop {
        let req = {
            let mut io_ref = io.borrow_mut();
            read_request(&mut io_ref.stream).await
        };
        let req = match req {
            Ok(req) => req,
            Err(e) if e.kind() == crate::error::Kind::BrokenPipe => return Ok(()),
            Err(e) => {
                let mut io_ref = io.borrow_mut();
                let _ = make_error_response(&mut io_ref, 400).await;
                return Err(e);
            }
        };

        io.borrow_mut().version = req.version;
        let keep_alive = req.keep_alive();
        let method = req.method.clone();
        let path = req.uri.path.clone();

        match router.dispatch(&method, &path) {
            Some(handler) => {
                let task = handler(io.clone(), req);
                if let Err(e) = task.await {
                    debug!(error = %e, "handler returned error");
                    let mut io_ref = io.borrow_mut();
                    let _ = make_error_response(&mut io_ref, 500).await;
                }
            }
            None => {
                let mut io_ref = io.borrow_mut();
                make_error_response(&mut io_ref, 404).await?;
            }
        }

        if !keep_alive {
            return Ok(());
        }
    }
}
