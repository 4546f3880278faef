//! Message handler interface for the multiplexer.
//!
//! Applications plug into the server by implementing `MessageHandler`. The
//! handler runs inline on the event loop thread: it must compute its whole
//! response eagerly and never block.

use crate::protocol::{encode, STATUS_OK};
use bytes::Bytes;
use std::net::SocketAddr;

/// Default first frame for every accepted client.
const GREETING: &[u8] = b"Connection established.";

/// Identity of a connection as seen by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    /// Registry key, stable until the connection is torn down.
    pub id: usize,
    pub peer: SocketAddr,
}

/// What the server should do after a message was handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundAction {
    /// Framed byte sequences, queued in order.
    pub frames: Vec<Bytes>,
    /// Close the connection once the frames have been attempted.
    pub close: bool,
}

impl OutboundAction {
    /// Nothing to send, keep the connection open.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(frame: Bytes) -> Self {
        Self {
            frames: vec![frame],
            close: false,
        }
    }

    pub fn reply_and_close(frame: Bytes) -> Self {
        Self {
            frames: vec![frame],
            close: true,
        }
    }
}

/// A handler failure. The server logs it and closes only the offending
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler error: {}", self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Application logic driven by the server.
pub trait MessageHandler {
    /// Called once, after the listener is armed and before any accept.
    fn on_init(&mut self) {}

    /// First frame queued for a newly accepted connection.
    fn greeting(&mut self, _conn: &ConnectionInfo) -> Bytes {
        encode(STATUS_OK, GREETING)
    }

    /// Translate the bytes of one read into outbound frames.
    fn on_message(
        &mut self,
        conn: &ConnectionInfo,
        data: &[u8],
    ) -> Result<OutboundAction, HandlerError>;

    /// Called when a connection is torn down, whatever the reason.
    fn on_close(&mut self, _conn: &ConnectionInfo) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl MessageHandler for Silent {
        fn on_message(
            &mut self,
            _conn: &ConnectionInfo,
            _data: &[u8],
        ) -> Result<OutboundAction, HandlerError> {
            Ok(OutboundAction::none())
        }
    }

    #[test]
    fn test_default_greeting() {
        let conn = ConnectionInfo {
            id: 0,
            peer: SocketAddr::from(([127, 0, 0, 1], 4000)),
        };
        assert_eq!(&Silent.greeting(&conn)[..], b"200:Connection established.");
    }

    #[test]
    fn test_action_constructors() {
        assert_eq!(OutboundAction::none().frames.len(), 0);
        assert!(!OutboundAction::none().close);

        let reply = OutboundAction::reply(Bytes::from_static(b"200:Ok."));
        assert_eq!(reply.frames, vec![Bytes::from_static(b"200:Ok.")]);
        assert!(!reply.close);

        let bye = OutboundAction::reply_and_close(Bytes::from_static(b"400:Goodbye!"));
        assert!(bye.close);
    }
}
