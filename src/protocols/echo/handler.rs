//! Echo message handler.

use crate::protocol::{encode, STATUS_END, STATUS_OK};
use crate::runtime::{ConnectionInfo, HandlerError, MessageHandler, OutboundAction};

/// Stateless echo service.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl MessageHandler for Echo {
    fn on_message(
        &mut self,
        _conn: &ConnectionInfo,
        data: &[u8],
    ) -> Result<OutboundAction, HandlerError> {
        let line = trim_line_ending(data);

        if line.eq_ignore_ascii_case(b"QUIT") {
            return Ok(OutboundAction::reply_and_close(encode(STATUS_END, b"Goodbye!")));
        }

        Ok(OutboundAction::reply(encode(STATUS_OK, line)))
    }
}

fn trim_line_ending(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);
    &data[..end]
}
