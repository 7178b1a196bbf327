//! A single-threaded `io_uring` async runtime, a buffered-stream layer on
//! top of it, and an HTTP/1.1 + CGI server built on both (`spec.md`
//! OVERVIEW).
//!
//! Layered as: [`rt`] (ring, scheduler, tasks, cancellation) underpins
//! [`io`] (the buffered stream over a [`io::RawChannel`]), which [`fs`] and
//! [`net`] implement channels for, which [`http`] frames requests/responses
//! on top of, which [`server`] wires into a routed connection handler.

pub mod error;
pub mod fs;
pub mod http;
pub mod io;
pub mod net;
pub mod rt;
pub mod server;

pub use error::{Error, Kind, Result};
