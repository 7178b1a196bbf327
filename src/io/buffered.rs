//! The buffered stream: owns a raw byte-channel plus an input and an output
//! buffer (`spec.md` §3/§4.3).
//!
//! Grounded on the teacher's `buffer.rs` `BufReader` (fill/consume/`get_buf`
//! shape) and old `http.rs`'s `HttpReader`/`HttpWriter` (chunked framing —
//! see `crate::http::codec`), translated onto an owned pair of buffers per
//! `original_source/co_async/iostream/stream_base.hpp` rather than a single
//! read-only buffer, since this layer also owns output buffering.

use std::time::Duration;

use crate::error::{Error, Result};

use super::channel::RawChannel;

const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Owns a raw byte-channel plus independently allocated input/output
/// buffers.
///
/// Invariants (`spec.md` §3):
/// - `0 <= in_index <= in_end <= in_buf.len()`; `in_buf[in_index..in_end]` is
///   valid prefetched data.
/// - `0 <= out_index <= out_buf.len()`; `out_buf[..out_index]` is pending
///   writes.
/// - After `seek`, both buffers are reset to empty.
pub struct BufferedStream<C> {
    raw: C,
    capacity: usize,
    in_buf: Vec<u8>,
    in_index: usize,
    in_end: usize,
    out_buf: Vec<u8>,
    out_index: usize,
}

impl<C: RawChannel> BufferedStream<C> {
    /// Wrap `raw`, allocating buffers lazily with the default 8 KiB
    /// capacity.
    pub fn new(raw: C) -> BufferedStream<C> {
        Self::with_capacity(raw, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(raw: C, capacity: usize) -> BufferedStream<C> {
        BufferedStream {
            raw,
            capacity,
            in_buf: Vec::new(),
            in_index: 0,
            in_end: 0,
            out_buf: Vec::new(),
            out_index: 0,
        }
    }

    /// Borrow the underlying raw channel (for timeout configuration, etc).
    pub fn raw_mut(&mut self) -> &mut C {
        &mut self.raw
    }

    fn buffered(&self) -> &[u8] {
        &self.in_buf[self.in_index..self.in_end]
    }

    /// Refill the input buffer with at least one more byte. `Ok(0)` at EOF.
    async fn fill(&mut self) -> Result<usize> {
        if self.in_index < self.in_end {
            return Ok(self.in_end - self.in_index);
        }
        if self.in_buf.len() < self.capacity {
            self.in_buf.resize(self.capacity, 0);
        }
        self.in_index = 0;
        self.in_end = 0;
        let n = self.raw.read(&mut self.in_buf[..]).await?;
        self.in_end = n;
        Ok(n)
    }

    /// Ensure at least `n` bytes are buffered (short of EOF). Used by
    /// `peekn`/`getspan` to batch reads.
    async fn fill_at_least(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            // Grow the buffer to fit an oversized request rather than
            // failing outright.
            self.capacity = n;
        }
        while self.in_end - self.in_index < n {
            if self.in_index > 0 {
                self.in_buf.copy_within(self.in_index..self.in_end, 0);
                self.in_end -= self.in_index;
                self.in_index = 0;
            }
            if self.in_buf.len() < self.capacity {
                self.in_buf.resize(self.capacity, 0);
            }
            let read = self.raw.read(&mut self.in_buf[self.in_end..]).await?;
            if read == 0 {
                return Err(Error::broken_pipe());
            }
            self.in_end += read;
        }
        Ok(())
    }

    /// Read the next input byte, filling the buffer if empty.
    pub async fn getchar(&mut self) -> Result<u8> {
        if self.fill().await? == 0 {
            return Err(Error::broken_pipe());
        }
        let c = self.in_buf[self.in_index];
        self.in_index += 1;
        Ok(c)
    }

    /// Append bytes up to (not including) the next `eol`, consuming `eol`.
    pub async fn getline(&mut self, out: &mut Vec<u8>, eol: u8) -> Result<()> {
        loop {
            if self.fill().await? == 0 {
                return Err(Error::broken_pipe());
            }
            let buf = self.buffered();
            match buf.iter().position(|&b| b == eol) {
                Some(pos) => {
                    out.extend_from_slice(&buf[..pos]);
                    self.in_index += pos + 1;
                    return Ok(());
                }
                None => {
                    out.extend_from_slice(buf);
                    self.in_index = self.in_end;
                }
            }
        }
    }

    /// As [`Self::getline`], but with a (possibly multi-byte) delimiter.
    /// Partial matches at a buffer boundary are re-appended to `out` and
    /// scanning resumes, per `spec.md` §4.3.
    pub async fn getline_delim(&mut self, out: &mut Vec<u8>, eol: &[u8]) -> Result<()> {
        if eol.is_empty() {
            return Err(Error::new(crate::error::Kind::InvalidArgument));
        }
        let mut matched = 0usize;
        loop {
            if self.fill().await? == 0 {
                return Err(Error::broken_pipe());
            }
            while self.in_index < self.in_end {
                let b = self.in_buf[self.in_index];
                self.in_index += 1;
                if b == eol[matched] {
                    matched += 1;
                    if matched == eol.len() {
                        return Ok(());
                    }
                } else {
                    // Re-append the partial match that turned out not to be
                    // the delimiter, then keep scanning from this byte.
                    out.extend_from_slice(&eol[..matched]);
                    matched = 0;
                    if b == eol[0] {
                        matched = 1;
                        if matched == eol.len() {
                            return Ok(());
                        }
                    } else {
                        out.push(b);
                    }
                }
            }
        }
    }

    /// Discard bytes up to and including the next `eol`.
    pub async fn dropline(&mut self, eol: u8) -> Result<()> {
        let mut scratch = Vec::new();
        self.getline(&mut scratch, eol).await
    }

    /// Fill `buf` with exactly `buf.len()` bytes.
    pub async fn getspan(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let need = buf.len() - filled;
            let avail = self.in_end - self.in_index;
            if avail == 0 {
                if self.fill().await? == 0 {
                    return Err(Error::broken_pipe());
                }
                continue;
            }
            let take = avail.min(need);
            buf[filled..filled + take]
                .copy_from_slice(&self.in_buf[self.in_index..self.in_index + take]);
            self.in_index += take;
            filled += take;
        }
        Ok(())
    }

    /// Read exactly `n` bytes, returning them as an owned `Vec<u8>`.
    pub async fn getn(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.getspan(&mut out).await?;
        Ok(out)
    }

    /// Drain to EOF, appending everything read to `out`. Unlike the other
    /// getters, reaching EOF here is success, not an error.
    pub async fn getall(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let n = self.fill().await?;
            if n == 0 {
                return Ok(());
            }
            out.extend_from_slice(self.buffered());
            self.in_index = self.in_end;
        }
    }

    /// A synchronous, infallible view of whatever is currently buffered
    /// (may be empty — does not trigger a read).
    pub fn peekbuf(&self) -> &[u8] {
        self.buffered()
    }

    /// Ensure at least one byte is buffered and return it without
    /// consuming it.
    pub async fn peekchar(&mut self) -> Result<u8> {
        if self.fill().await? == 0 {
            return Err(Error::broken_pipe());
        }
        Ok(self.in_buf[self.in_index])
    }

    /// Ensure at least `n` bytes are buffered and return a view of them
    /// without consuming them.
    pub async fn peekn(&mut self, n: usize) -> Result<&[u8]> {
        self.fill_at_least(n).await?;
        Ok(&self.in_buf[self.in_index..self.in_index + n])
    }

    /// Read `size_of::<T>()` bytes into a trivially copyable `T`.
    ///
    /// # Safety contract
    /// `T` must be a type for which any bit pattern of the right size is a
    /// valid value (a plain old C-style struct) — the implementation reads
    /// raw bytes with `ptr::read_unaligned`.
    pub async fn getstruct<T: Copy>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.getn(size).await?;
        Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
    }

    fn ensure_out_capacity(&mut self) {
        if self.out_buf.len() < self.capacity {
            self.out_buf.resize(self.capacity, 0);
        }
    }

    /// Append one byte to the output buffer, flushing first if it's full.
    pub async fn putchar(&mut self, c: u8) -> Result<()> {
        self.ensure_out_capacity();
        if self.out_index >= self.out_buf.len() {
            self.flush().await?;
        }
        self.out_buf[self.out_index] = c;
        self.out_index += 1;
        Ok(())
    }

    /// Append `s`, flushing as needed whenever the output buffer fills.
    pub async fn putspan(&mut self, s: &[u8]) -> Result<()> {
        self.ensure_out_capacity();
        let mut offset = 0;
        while offset < s.len() {
            let space = self.out_buf.len() - self.out_index;
            if space == 0 {
                self.flush().await?;
                continue;
            }
            let take = space.min(s.len() - offset);
            self.out_buf[self.out_index..self.out_index + take]
                .copy_from_slice(&s[offset..offset + take]);
            self.out_index += take;
            offset += take;
        }
        Ok(())
    }

    /// Append a UTF-8 string's bytes.
    pub async fn puts(&mut self, s: &str) -> Result<()> {
        self.putspan(s.as_bytes()).await
    }

    /// Append `size_of::<T>()` bytes read from `value`.
    pub async fn putstruct<T: Copy>(&mut self, value: &T) -> Result<()> {
        let size = std::mem::size_of::<T>();
        let bytes =
            unsafe { std::slice::from_raw_parts(value as *const T as *const u8, size) };
        self.putspan(bytes).await
    }

    /// `puts(s)` + trailing `'\n'` + `flush()`.
    pub async fn putline(&mut self, s: &str) -> Result<()> {
        self.puts(s).await?;
        self.putchar(b'\n').await?;
        self.flush().await
    }

    /// Write the entire pending output buffer, looping on short writes
    /// until it drains, then invoke the raw channel's own flush. A
    /// zero-byte write is treated as `BrokenPipe`.
    pub async fn flush(&mut self) -> Result<()> {
        let mut written = 0;
        while written < self.out_index {
            let n = self.raw.write(&self.out_buf[written..self.out_index]).await?;
            if n == 0 {
                return Err(Error::broken_pipe());
            }
            written += n;
        }
        self.out_index = 0;
        self.raw.flush().await
    }

    /// Reposition the underlying channel, discarding both buffers
    /// (`InvalidSeek` if the channel isn't seekable).
    pub async fn seek(&mut self, pos: u64) -> Result<()> {
        self.raw.seek(pos).await?;
        self.in_index = 0;
        self.in_end = 0;
        self.out_index = 0;
        Ok(())
    }

    /// Flush output, then close the raw channel.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        self.raw.close().await
    }

    /// Set a per-operation timeout hint on the raw channel. Infallible.
    pub fn timeout(&mut self, duration: Option<Duration>) {
        self.raw.set_timeout(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::LocalBoxFuture;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// An in-memory `RawChannel` for buffer-invariant tests, grounded on
    /// the teacher's own `buffer.rs` test harness (`SlowRead`).
    struct MemChannel {
        data: Rc<RefCell<Vec<u8>>>,
        read_pos: usize,
        written: Rc<RefCell<Vec<u8>>>,
        chunk: usize,
    }

    impl MemChannel {
        fn new(data: Vec<u8>, chunk: usize) -> (Self, Rc<RefCell<Vec<u8>>>) {
            let written = Rc::new(RefCell::new(Vec::new()));
            (
                MemChannel {
                    data: Rc::new(RefCell::new(data)),
                    read_pos: 0,
                    written: written.clone(),
                    chunk,
                },
                written,
            )
        }
    }

    impl RawChannel for MemChannel {
        fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let data = self.data.borrow();
                let remaining = data.len() - self.read_pos;
                let take = remaining.min(buf.len()).min(self.chunk.max(1));
                buf[..take].copy_from_slice(&data[self.read_pos..self.read_pos + take]);
                self.read_pos += take;
                Ok(take)
            })
        }

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let take = buf.len().min(self.chunk.max(1));
                self.written.borrow_mut().extend_from_slice(&buf[..take]);
                Ok(take)
            })
        }

        fn seek(&mut self, pos: u64) -> LocalBoxFuture<'_, Result<()>> {
            self.read_pos = pos as usize;
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
    fn getchar_and_getline_consume_in_order() {
        let (chan, _) = MemChannel::new(b"abc\ndef\n".to_vec(), 3);
        let mut stream = BufferedStream::with_capacity(chan, 4);
        block_on(async {
            assert_eq!(stream.getchar().await.unwrap(), b'a');
            let mut line = Vec::new();
            stream.getline(&mut line, b'\n').await.unwrap();
            assert_eq!(line, b"bc");
            let mut line2 = Vec::new();
            stream.getline(&mut line2, b'\n').await.unwrap();
            assert_eq!(line2, b"def");
        });
    }

    #[test]
    fn getline_eof_mid_line_is_broken_pipe() {
        let (chan, _) = MemChannel::new(b"no newline".to_vec(), 64);
        let mut stream = BufferedStream::new(chan);
        block_on(async {
            let mut line = Vec::new();
            let err = stream.getline(&mut line, b'\n').await.unwrap_err();
            assert_eq!(err.kind(), crate::error::Kind::BrokenPipe);
        });
    }

    #[test]
    fn getall_returns_ok_at_eof() {
        let (chan, _) = MemChannel::new(b"hello world".to_vec(), 3);
        let mut stream = BufferedStream::new(chan);
        block_on(async {
            let mut out = Vec::new();
            stream.getall(&mut out).await.unwrap();
            assert_eq!(out, b"hello world");
        });
    }

    #[test]
    fn puts_then_flush_produces_exact_bytes_regardless_of_capacity() {
        for capacity in [1usize, 2, 4, 64] {
            let (chan, written) = MemChannel::new(Vec::new(), 1);
            let mut stream = BufferedStream::with_capacity(chan, capacity);
            block_on(async {
                stream.puts("hello, buffered world").await.unwrap();
                stream.flush().await.unwrap();
            });
            assert_eq!(&*written.borrow(), b"hello, buffered world");
        }
    }

    #[test]
    fn seek_evicts_buffered_input() {
        let (chan, _) = MemChannel::new(b"0123456789".to_vec(), 64);
        let mut stream = BufferedStream::new(chan);
        block_on(async {
            assert_eq!(stream.getchar().await.unwrap(), b'0');
            stream.seek(5).await.unwrap();
            assert_eq!(stream.getchar().await.unwrap(), b'5');
        });
    }

    #[test]
    fn getline_delim_handles_partial_match_at_boundary() {
        // Delimiter "--" with input containing a lone '-' that is not part
        // of the delimiter, immediately followed by the real delimiter.
        let (chan, _) = MemChannel::new(b"a-b--tail".to_vec(), 2);
        let mut stream = BufferedStream::new(chan);
        block_on(async {
            let mut out = Vec::new();
            stream.getline_delim(&mut out, b"--").await.unwrap();
            assert_eq!(out, b"a-b");
        });
    }
}
