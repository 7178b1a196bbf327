//! The raw byte-channel contract (`spec.md` §1/§4.3): `{read, write, seek,
//! flush, close, timeout}` over which a [`crate::io::BufferedStream`]
//! operates.
//!
//! Grounded on `original_source/co_async/iostream/stream_base.hpp`'s
//! `FileStream`/virtual-base shape. Trait methods return
//! [`futures_util::future::LocalBoxFuture`] rather than being `async fn`s —
//! this predates (and remains compatible without) `async fn` in traits, the
//! same way the teacher's own pre-`tokio` `net.rs`/`http.rs` abstracted over
//! `NetworkStream` with plain trait methods before hyper had `AsyncRead`.

use std::time::Duration;

use futures_util::future::LocalBoxFuture;

use crate::error::Result;

/// A virtual byte source/sink that a [`crate::io::BufferedStream`] wraps.
///
/// Implementors: [`crate::fs::FileChannel`], [`crate::net::SocketChannel`].
pub trait RawChannel {
    /// Read into `buf`, returning the number of bytes read (0 at EOF).
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>>;

    /// Write from `buf`, returning the number of bytes written (may be a
    /// short write).
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>>;

    /// Reposition to an absolute byte offset. `Err(InvalidSeek)` if the
    /// underlying channel isn't seekable.
    fn seek(&mut self, pos: u64) -> LocalBoxFuture<'_, Result<()>>;

    /// Flush any channel-level buffering below the [`crate::io::BufferedStream`]
    /// (e.g. `fsync`-adjacent semantics); most channels no-op here.
    fn flush(&mut self) -> LocalBoxFuture<'_, Result<()>>;

    /// Close the channel.
    fn close(&mut self) -> LocalBoxFuture<'_, Result<()>>;

    /// Set (or clear) a per-operation timeout hint. Infallible — it only
    /// takes effect on the next ring operation issued.
    fn set_timeout(&mut self, timeout: Option<Duration>);
}
