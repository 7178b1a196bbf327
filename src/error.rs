//! Error and Result module.
//!
//! Shaped after the teacher's own `error.rs`: an opaque [`Error`] wrapping a
//! boxed inner struct carrying a [`Kind`] plus an optional cause, rather than
//! a derive-macro error enum. `Kind` corresponds 1:1 to the `ErrorKind` sum
//! type in `spec.md` §7.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// `Expected<T>` in the spec's vocabulary.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// An error produced by the runtime, stream, filesystem/socket, or HTTP
/// layers.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

/// The error taxonomy from `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A linked-op timeout fired before the guarded operation completed.
    TimedOut,
    /// A `CancelToken` canceled the operation, or it was invoked while
    /// already canceled.
    Canceled,
    /// EOF was reached where more data was required.
    BrokenPipe,
    /// `seek` was attempted on a channel that doesn't support it.
    InvalidSeek,
    /// The raw channel doesn't support the requested operation.
    NotSupported,
    /// A caller-supplied argument was invalid.
    InvalidArgument,
    /// The OS denied the operation (`EACCES`/`EPERM`).
    PermissionDenied,
    /// The target path/resource does not exist (`ENOENT`).
    NotFound,
    /// The target already exists (`EEXIST`).
    AlreadyExists,
    /// Any other OS-level error, carrying the raw errno.
    IoError(i32),
    /// Malformed HTTP or CGI header block.
    ProtocolError,
    /// A CGI child process exited with a non-zero status.
    ChildExitedNonZero,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::TimedOut => "timed out",
            Kind::Canceled => "canceled",
            Kind::BrokenPipe => "broken pipe",
            Kind::InvalidSeek => "invalid seek",
            Kind::NotSupported => "not supported",
            Kind::InvalidArgument => "invalid argument",
            Kind::PermissionDenied => "permission denied",
            Kind::NotFound => "not found",
            Kind::AlreadyExists => "already exists",
            Kind::IoError(_) => "io error",
            Kind::ProtocolError => "protocol error",
            Kind::ChildExitedNonZero => "child exited non-zero",
        }
    }
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    /// The classified error kind.
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    pub(crate) fn timed_out() -> Error {
        Error::new(Kind::TimedOut)
    }

    pub(crate) fn canceled() -> Error {
        Error::new(Kind::Canceled)
    }

    pub(crate) fn broken_pipe() -> Error {
        Error::new(Kind::BrokenPipe)
    }

    pub(crate) fn protocol<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::ProtocolError).with(cause)
    }

    /// Classify a raw (already-negated) `io_uring` completion errno into an
    /// [`Error`], per `spec.md` §7's "`IoError(errno)`" fallback.
    pub(crate) fn from_errno(errno: i32) -> Error {
        Error::from(io::Error::from_raw_os_error(errno))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => Kind::NotFound,
            io::ErrorKind::PermissionDenied => Kind::PermissionDenied,
            io::ErrorKind::AlreadyExists => Kind::AlreadyExists,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Kind::BrokenPipe,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Kind::InvalidArgument,
            io::ErrorKind::TimedOut => Kind::TimedOut,
            _ => Kind::IoError(err.raw_os_error().unwrap_or(0)),
        };
        Error::new(kind).with(err)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            builder.field("cause", cause);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.kind.as_str())?;
        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.cause.as_ref().map(|c| &**c as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_io_error_classifies_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "nope");
        let err = Error::from(io_err);
        assert_eq!(err.kind(), Kind::NotFound);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::protocol("missing colon in header line");
        assert!(err.to_string().contains("missing colon"));
    }
}
