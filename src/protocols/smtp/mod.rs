//! Minimal SMTP service.
//!
//! Speaks the SMTP reply format (`<code> <text>\r\n`) instead of the
//! colon framing used by the other applications. Each connection walks
//! through a mail transaction:
//!
//! ```text
//! Connected --HELO--> Identified --MAIL--> Recipients --DATA--> ReadingData
//!                          ^                                         |
//!                          +------------- <CRLF>.<CRLF> -------------+
//! ```
//!
//! `RSET`, `NOOP`, `HELP`, `VRFY` and `QUIT` are accepted in any state
//! except while the body is being read. Mail is accepted and logged but
//! never relayed or stored.

pub mod handler;
pub mod parser;

pub use handler::Smtp;
