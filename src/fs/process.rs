//! A reusable child-process spawn primitive (`SPEC_FULL.md` §4's
//! supplement: "factor CGI's spawn step through a small `Process`/
//! `ProcessBuilder` type").
//!
//! Grounded on the teacher's "build a reusable thing behind a constructor
//! function" idiom (`teacher_src/service.rs`'s `service_fn`): a small
//! builder type with chained setters and a terminal `spawn()`, rather than
//! one long parameter list. Used by both `crate::server::cgi` and the
//! `cat`-spawn demo binary.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::error::{Error, Kind, Result};

/// Builds up a child process invocation before spawning it.
pub struct ProcessBuilder {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    inherit_env: bool,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    stderr: Option<RawFd>,
}

impl ProcessBuilder {
    pub fn new(program: impl Into<String>) -> ProcessBuilder {
        ProcessBuilder {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            inherit_env: true,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> ProcessBuilder {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> ProcessBuilder {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Whether to carry the parent's environment in addition to `env()`
    /// entries. Defaults to `true`; CGI dispatch leaves this on
    /// (`spec.md` §4.7 step 3: "inherit parent environment").
    pub fn inherit_env(mut self, inherit: bool) -> ProcessBuilder {
        self.inherit_env = inherit;
        self
    }

    pub fn stdin(mut self, fd: RawFd) -> ProcessBuilder {
        self.stdin = Some(fd);
        self
    }

    pub fn stdout(mut self, fd: RawFd) -> ProcessBuilder {
        self.stdout = Some(fd);
        self
    }

    pub fn stderr(mut self, fd: RawFd) -> ProcessBuilder {
        self.stderr = Some(fd);
        self
    }

    /// `fork` + `exec` the child, redirecting the requested standard
    /// streams. Any stream left unset is inherited from the parent.
    pub fn spawn(self) -> Result<Process> {
        let program = CString::new(self.program.clone()).map_err(|_| Error::new(Kind::InvalidArgument))?;
        let mut argv: Vec<CString> = Vec::with_capacity(self.args.len() + 1);
        argv.push(program.clone());
        for a in &self.args {
            argv.push(CString::new(a.as_str()).map_err(|_| Error::new(Kind::InvalidArgument))?);
        }
        let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let mut envp_owned: Vec<CString> = Vec::new();
        if self.inherit_env {
            for (k, v) in std::env::vars() {
                if let Ok(c) = CString::new(format!("{}={}", k, v)) {
                    envp_owned.push(c);
                }
            }
        }
        for (k, v) in &self.envs {
            if let Ok(c) = CString::new(format!("{}={}", k, v)) {
                envp_owned.push(c);
            }
        }
        let mut envp_ptrs: Vec<*const libc::c_char> = envp_owned.iter().map(|s| s.as_ptr()).collect();
        envp_ptrs.push(std::ptr::null());

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(Error::from(std::io::Error::last_os_error()));
        }
        if pid == 0 {
            unsafe {
                if let Some(fd) = self.stdin {
                    libc::dup2(fd, libc::STDIN_FILENO);
                }
                if let Some(fd) = self.stdout {
                    libc::dup2(fd, libc::STDOUT_FILENO);
                }
                if let Some(fd) = self.stderr {
                    libc::dup2(fd, libc::STDERR_FILENO);
                }
                libc::execve(program.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                libc::_exit(127);
            }
        }
        Ok(Process { pid })
    }
}

/// A spawned child process.
pub struct Process {
    pid: libc::pid_t,
}

impl Process {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Block until the child exits, returning its exit status. The child
    /// has typically already exited by the time its stdout pipe is fully
    /// drained and closed, so in practice this returns immediately rather
    /// than stalling the single-threaded scheduler.
    pub async fn wait(&self) -> Result<i32> {
        let mut status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc >= 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(Error::from(err));
            }
        }
        if libc::WIFEXITED(status) {
            Ok(libc::WEXITSTATUS(status))
        } else {
            Ok(-1)
        }
    }
}
