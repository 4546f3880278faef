//! mio-based multiplexer.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS). A single
//! thread owns the listener and every connection.

mod event_loop;

pub use event_loop::{Server, ServerError};
