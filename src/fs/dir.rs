//! Directory entry enumeration (`spec.md` §3 `DirectoryWalker`, §4.8).
//!
//! Grounded on `original_source/co_async/iostream/directory_stream.hpp`'s
//! walker contract. There is no mainline `io_uring` opcode for `getdents64`,
//! so unlike every other op in this crate this one issues the raw syscall
//! directly against the already-ring-opened directory descriptor — the
//! kernel serves directory reads from its dentry cache, so this never blocks
//! the way a cold file read would.

use std::os::unix::io::RawFd;

use crate::error::{Error, Result};

use super::FileHandle;

const BUF_SIZE: usize = 8 * 1024;

#[repr(C)]
struct LinuxDirent64Header {
    d_ino: u64,
    d_off: i64,
    d_reclen: u16,
    d_type: u8,
}

/// A cursor over a directory's entries, yielding one name at a time.
/// Entries named `.` or `..` are *not* filtered here — per `spec.md` §3,
/// filtering is the caller's responsibility.
pub struct DirectoryWalker {
    fd: RawFd,
    _handle: FileHandle,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
}

impl DirectoryWalker {
    pub fn new(handle: FileHandle) -> DirectoryWalker {
        DirectoryWalker {
            fd: handle.raw_fd(),
            _handle: handle,
            buf: vec![0u8; BUF_SIZE],
            pos: 0,
            end: 0,
        }
    }

    /// Yield the next entry name, or `None` once the directory is
    /// exhausted.
    pub async fn next(&mut self) -> Result<Option<String>> {
        loop {
            if self.pos < self.end {
                let header_size = std::mem::size_of::<LinuxDirent64Header>();
                let header = unsafe {
                    std::ptr::read_unaligned(
                        self.buf[self.pos..].as_ptr() as *const LinuxDirent64Header
                    )
                };
                let reclen = header.d_reclen as usize;
                let name_start = self.pos + header_size;
                let name_bytes = &self.buf[name_start..self.pos + reclen];
                let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
                let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
                self.pos += reclen;
                return Ok(Some(name));
            }

            let n = unsafe {
                libc::syscall(
                    libc::SYS_getdents64,
                    self.fd,
                    self.buf.as_mut_ptr(),
                    self.buf.len(),
                )
            };
            if n < 0 {
                return Err(Error::from(std::io::Error::last_os_error()));
            }
            if n == 0 {
                return Ok(None);
            }
            self.pos = 0;
            self.end = n as usize;
        }
    }
}
