//! Echo protocol implementation.
//!
//! Frames every message back to its sender:
//! - Client sends: `<data>`
//! - Server responds: `200:<data>` (trailing CR/LF removed)
//!
//! Special commands:
//! - `QUIT` - Responds `400:Goodbye!` and closes the connection
//!
//! Useful for exercising the shell and the runtime without any application
//! state.

pub mod handler;

pub use handler::Echo;
