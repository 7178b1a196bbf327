//! Filesystem primitives (`spec.md` §4.4, §3 `FileHandle`/`FileStat`) plus
//! the directory/file management ops and `Process` primitive supplemented in
//! `SPEC_FULL.md` §4.
//!
//! Grounded on `original_source/co_async/system/fs.hpp` for the operation
//! set and on `examples/other_examples/83b5caab_tokio-rs-io-uring__src-submit.rs.rs`
//! / `…Uring_Fast_Read…` for the `opcode::*::new(...).build()` call shape.

mod dir;
mod process;

pub use dir::DirectoryWalker;
pub use process::{Process, ProcessBuilder};

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use io_uring::{opcode, types};

use crate::error::{Error, Kind, Result};
use crate::io::RawChannel;
use crate::rt::{submit, RingContext};

/// How a file is opened, mirroring `spec.md` §4.4's "flags combine standard
/// open flags per `OpenMode` variant". Variants are bitwise-combinable via
/// `|`, the way `libc`'s own `O_*` constants are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(i32);

impl OpenMode {
    pub const READ_ONLY: OpenMode = OpenMode(libc::O_RDONLY);
    pub const WRITE_ONLY: OpenMode = OpenMode(libc::O_WRONLY);
    pub const READ_WRITE: OpenMode = OpenMode(libc::O_RDWR);
    pub const CREATE: OpenMode = OpenMode(libc::O_CREAT);
    pub const TRUNCATE: OpenMode = OpenMode(libc::O_TRUNC);
    pub const APPEND: OpenMode = OpenMode(libc::O_APPEND);

    fn bits(self) -> i32 {
        self.0
    }
}

impl std::ops::BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

/// A snapshot of a path's metadata (`spec.md` §3 `FileStat`).
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub btime: i64,
    pub blocks: u64,
}

impl FileStat {
    pub fn is_directory(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFDIR
    }

    pub fn is_regular_file(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFLNK
    }

    pub fn is_readable(&self) -> bool {
        self.mode & libc::S_IRUSR != 0
    }

    pub fn is_writable(&self) -> bool {
        self.mode & libc::S_IWUSR != 0
    }

    pub fn is_executable(&self) -> bool {
        self.mode & libc::S_IXUSR != 0
    }
}

fn path_to_cstring(path: &str) -> Result<CString> {
    CString::new(path).map_err(|_| Error::new(Kind::InvalidArgument))
}

/// An owned, non-negative file descriptor. Closed synchronously on `Drop`
/// (the fallback path — see [`fs_close`] for the ring-participating close
/// used when a handle is dropped from within a task).
pub struct FileHandle {
    ring: Rc<RingContext>,
    fd: RawFd,
}

impl FileHandle {
    pub(crate) fn from_raw(ring: Rc<RingContext>, fd: RawFd) -> FileHandle {
        FileHandle { ring, fd }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn take_raw(mut self) -> (Rc<RingContext>, RawFd) {
        let fd = self.fd;
        self.fd = -1;
        (self.ring.clone(), fd)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

/// Open `path` relative to `dir` (or the process cwd if `dir` is `None`),
/// per `spec.md` §4.4.
pub async fn fs_open(
    ring: &Rc<RingContext>,
    dir: Option<&FileHandle>,
    path: &str,
    mode: OpenMode,
    create_perm: u32,
) -> Result<FileHandle> {
    let cpath = path_to_cstring(path)?;
    let dirfd = dir.map(|d| d.fd).unwrap_or(libc::AT_FDCWD);
    let entry = opcode::OpenAt::new(types::Fd(dirfd), cpath.as_ptr())
        .flags(mode.bits())
        .mode(create_perm)
        .build();
    let fd = submit(ring.clone(), entry, cpath).await?;
    Ok(FileHandle::from_raw(ring.clone(), fd))
}

/// Ring-issued `close(2)` (`SPEC_FULL.md` §4's supplement): close
/// participates in the same cancellation/ordering model as other ring ops
/// rather than happening synchronously on drop.
pub async fn fs_close(handle: FileHandle) -> Result<()> {
    let (ring, fd) = handle.take_raw();
    let entry = opcode::Close::new(types::Fd(fd)).build();
    submit(ring, entry, ()).await?;
    Ok(())
}

/// `stat(2)`-equivalent metadata lookup via the ring.
pub async fn fs_stat(ring: &Rc<RingContext>, dir: Option<&FileHandle>, path: &str) -> Result<FileStat> {
    let cpath = path_to_cstring(path)?;
    let dirfd = dir.map(|d| d.fd).unwrap_or(libc::AT_FDCWD);
    let mut statx_buf = Box::new(unsafe { std::mem::zeroed::<types::statx>() });
    let entry = opcode::Statx::new(
        types::Fd(dirfd),
        cpath.as_ptr(),
        statx_buf.as_mut() as *mut types::statx as *mut _,
    )
    .flags(libc::AT_STATX_SYNC_AS_STAT)
    .mask(libc::STATX_ALL)
    .build();
    submit(ring.clone(), entry, (cpath, &mut statx_buf)).await?;
    let s = *statx_buf;
    Ok(FileStat {
        size: s.stx_size,
        mode: s.stx_mode as u32,
        uid: s.stx_uid,
        gid: s.stx_gid,
        atime: s.stx_atime.tv_sec,
        mtime: s.stx_mtime.tv_sec,
        ctime: s.stx_ctime.tv_sec,
        btime: s.stx_btime.tv_sec,
        blocks: s.stx_blocks,
    })
}

/// `mkdir(2)` relative to `dir`.
pub async fn fs_mkdir(ring: &Rc<RingContext>, dir: Option<&FileHandle>, path: &str, mode: u32) -> Result<()> {
    let cpath = path_to_cstring(path)?;
    let dirfd = dir.map(|d| d.fd).unwrap_or(libc::AT_FDCWD);
    let entry = opcode::MkDirAt::new(types::Fd(dirfd), cpath.as_ptr())
        .mode(mode)
        .build();
    submit(ring.clone(), entry, cpath).await?;
    Ok(())
}

/// `unlink(2)` relative to `dir`.
pub async fn fs_unlink(ring: &Rc<RingContext>, dir: Option<&FileHandle>, path: &str) -> Result<()> {
    let cpath = path_to_cstring(path)?;
    let dirfd = dir.map(|d| d.fd).unwrap_or(libc::AT_FDCWD);
    let entry = opcode::UnlinkAt::new(types::Fd(dirfd), cpath.as_ptr()).build();
    submit(ring.clone(), entry, cpath).await?;
    Ok(())
}

/// `rmdir(2)` relative to `dir` — `unlinkat` with `AT_REMOVEDIR`.
pub async fn fs_rmdir(ring: &Rc<RingContext>, dir: Option<&FileHandle>, path: &str) -> Result<()> {
    let cpath = path_to_cstring(path)?;
    let dirfd = dir.map(|d| d.fd).unwrap_or(libc::AT_FDCWD);
    let entry = opcode::UnlinkAt::new(types::Fd(dirfd), cpath.as_ptr())
        .flags(libc::AT_REMOVEDIR)
        .build();
    submit(ring.clone(), entry, cpath).await?;
    Ok(())
}

/// Move up to `n` bytes kernel-to-kernel between two descriptors, used by
/// `send_file`/`recv_file` (`crate::net`) to splice through an intermediate
/// pipe.
pub async fn fs_splice(
    ring: &Rc<RingContext>,
    fd_in: RawFd,
    off_in: Option<u64>,
    fd_out: RawFd,
    off_out: Option<u64>,
    n: u32,
) -> Result<i32> {
    let entry = opcode::Splice::new(
        types::Fd(fd_in),
        off_in.map(|o| o as i64).unwrap_or(-1),
        types::Fd(fd_out),
        off_out.map(|o| o as i64).unwrap_or(-1),
        n,
    )
    .build();
    submit(ring.clone(), entry, ()).await
}

/// Create a `{reader, writer}` pipe pair. Pipe creation is pure in-kernel
/// bookkeeping (no blocking), so unlike the other ops here this goes
/// straight through `pipe2(2)` rather than the ring.
pub fn fs_pipe(ring: &Rc<RingContext>) -> Result<(FileHandle, FileHandle)> {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(Error::from(std::io::Error::last_os_error()));
    }
    Ok((
        FileHandle::from_raw(ring.clone(), fds[0]),
        FileHandle::from_raw(ring.clone(), fds[1]),
    ))
}

/// A [`crate::io::RawChannel`] backed by an open file or pipe end, tracking
/// its own byte offset since ring `pread`/`pwrite` take an explicit offset
/// rather than consulting a kernel file position.
pub struct FileChannel {
    ring: Rc<RingContext>,
    fd: RawFd,
    offset: u64,
    seekable: bool,
}

impl FileChannel {
    /// Wrap `handle`, taking ownership of its descriptor. `seekable` should
    /// be `false` for pipe ends (seek on a pipe must fail with
    /// `InvalidSeek` per `spec.md` §4.3).
    pub fn new(handle: FileHandle, seekable: bool) -> FileChannel {
        let (ring, fd) = handle.take_raw();
        FileChannel {
            ring,
            fd,
            offset: 0,
            seekable,
        }
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

impl RawChannel for FileChannel {
    fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let entry = opcode::Read::new(types::Fd(self.fd), buf.as_mut_ptr(), buf.len() as u32)
                .offset(self.offset as u64)
                .build();
            let n = submit(self.ring.clone(), entry, ()).await?;
            self.offset += n as u64;
            Ok(n as usize)
        })
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let entry = opcode::Write::new(types::Fd(self.fd), buf.as_ptr(), buf.len() as u32)
                .offset(self.offset as u64)
                .build();
            let n = submit(self.ring.clone(), entry, ()).await?;
            self.offset += n as u64;
            Ok(n as usize)
        })
    }

    fn seek(&mut self, pos: u64) -> LocalBoxFuture<'_, Result<()>> {
        if !self.seekable {
            return Box::pin(async { Err(Error::new(Kind::InvalidSeek)) });
        }
        self.offset = pos;
        Box::pin(async { Ok(()) })
    }

    fn flush(&mut self) -> LocalBoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> LocalBoxFuture<'_, Result<()>> {
        let entry = opcode::Close::new(types::Fd(self.fd)).build();
        let ring = self.ring.clone();
        // Mark closed so `FileHandle::drop` doesn't double-close.
        self.fd = -1;
        Box::pin(async move {
            submit(ring, entry, ()).await?;
            Ok(())
        })
    }

    fn set_timeout(&mut self, _timeout: Option<std::time::Duration>) {
        // Regular files and pipes never block indefinitely the way sockets
        // do; a timeout hint has no ring-level effect here.
    }
}
