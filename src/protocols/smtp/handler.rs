//! SMTP message handler.

use super::parser::{parse, Command, ParseError};
use crate::runtime::{ConnectionInfo, HandlerError, MessageHandler, OutboundAction};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, info};

/// Reply codes used by the session.
pub mod codes {
    pub const HELP: u16 = 214;
    pub const READY: u16 = 220;
    pub const CLOSING: u16 = 221;
    pub const OK: u16 = 250;
    pub const START_MAIL: u16 = 354;
    pub const UNRECOGNISED: u16 = 500;
    pub const SYNTAX: u16 = 501;
    pub const BAD_SEQUENCE: u16 = 503;
    pub const STORAGE: u16 = 552;
}

/// Largest message body kept in memory.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

const END_OF_DATA: &[u8] = b"\r\n.\r\n";

const HELP_REFERENCE: &str = "OK, command help reference: https://tools.ietf.org/html/rfc5321 .";
const HELP_SPECIFIC: &str =
    "OK, specific command help not available, please refer to: https://tools.ietf.org/html/rfc5321 .";

fn reply(code: u16, text: &str) -> Bytes {
    Bytes::from(format!("{} {}\r\n", code, text))
}

/// Where a session is in the mail transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Waiting for HELO
    #[default]
    Connected,
    /// Waiting for MAIL
    Identified,
    /// Collecting RCPT, waiting for DATA
    Recipients,
    /// Collecting the message body
    ReadingData,
}

#[derive(Debug, Default)]
struct Session {
    state: State,
    domain: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
    data: Vec<u8>,
    /// Body grew past `MAX_MESSAGE_SIZE`; only the tail is kept
    oversized: bool,
}

impl Session {
    /// Drop the current transaction. The HELO identity is kept.
    fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.data.clear();
        self.oversized = false;
        if self.state > State::Identified {
            self.state = State::Identified;
        }
    }

    /// Answer one command line. Returns the reply and whether to close.
    fn process(&mut self, line: &[u8]) -> (Bytes, bool) {
        let command = match parse(line) {
            Ok(command) => command,
            Err(ParseError::Unrecognised) => {
                return (reply(codes::UNRECOGNISED, "Invalid or unrecognised command."), false)
            }
            Err(ParseError::Syntax(text)) => return (reply(codes::SYNTAX, text), false),
        };

        let bad_sequence = || reply(codes::BAD_SEQUENCE, "Bad sequence of commands.");

        let response = match (self.state, command) {
            (_, Command::Rset) => {
                self.reset();
                reply(codes::OK, "Ok.")
            }
            (_, Command::Noop) => reply(codes::OK, "Ok."),
            (_, Command::Help(None)) => reply(codes::HELP, HELP_REFERENCE),
            (_, Command::Help(Some(_))) => reply(codes::HELP, HELP_SPECIFIC),
            (_, Command::Vrfy(user)) => reply(codes::OK, &format!("OK, <{}> is not local.", user)),
            (_, Command::Quit) => {
                return (reply(codes::CLOSING, "Service closing transmission channel."), true)
            }
            (State::Connected, Command::Helo(domain)) => {
                let response = reply(codes::OK, &format!("Welcome, {}!", domain));
                self.domain = Some(domain);
                self.state = State::Identified;
                response
            }
            (State::Identified, Command::Mail(sender)) => {
                let response = reply(codes::OK, &format!("OK, sending from {}.", sender));
                self.sender = Some(sender);
                self.state = State::Recipients;
                response
            }
            (State::Recipients, Command::Rcpt(recipient)) => {
                if !self.recipients.contains(&recipient) {
                    self.recipients.push(recipient.clone());
                }
                reply(
                    codes::OK,
                    &format!(
                        "OK, sending to {} ({} total).",
                        recipient,
                        self.recipients.len()
                    ),
                )
            }
            (State::Recipients, Command::Data) if !self.recipients.is_empty() => {
                self.state = State::ReadingData;
                reply(codes::START_MAIL, "Start mail input; end with <CRLF>.<CRLF>")
            }
            _ => bad_sequence(),
        };

        (response, false)
    }

    /// Append body bytes. Once the end marker arrives, returns whatever
    /// followed it.
    fn collect(&mut self, input: &[u8]) -> Option<Vec<u8>> {
        let search_from = self.data.len().saturating_sub(END_OF_DATA.len() - 1);
        self.data.extend_from_slice(input);

        let end = if !self.oversized && self.data.starts_with(b".\r\n") {
            Some((0, 3))
        } else {
            self.data[search_from..]
                .windows(END_OF_DATA.len())
                .position(|window| window == END_OF_DATA)
                .map(|i| (search_from + i + 2, search_from + i + END_OF_DATA.len()))
        };

        let Some((body_end, next)) = end else {
            if self.data.len() > MAX_MESSAGE_SIZE {
                let tail = self.data.len() - (END_OF_DATA.len() - 1);
                self.data.drain(..tail);
                self.oversized = true;
            }
            return None;
        };

        let leftover = self.data.split_off(next);
        self.data.truncate(body_end);
        Some(leftover)
    }
}

/// One SMTP session per connection. Accepted mail is logged, not stored.
pub struct Smtp {
    sessions: HashMap<usize, Session>,
}

impl Smtp {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl Default for Smtp {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for Smtp {
    fn on_init(&mut self) {
        self.sessions.clear();
    }

    fn greeting(&mut self, conn: &ConnectionInfo) -> Bytes {
        self.sessions.insert(conn.id, Session::default());
        reply(codes::READY, "Simple Mail Transfer Service Ready.")
    }

    fn on_message(
        &mut self,
        conn: &ConnectionInfo,
        data: &[u8],
    ) -> Result<OutboundAction, HandlerError> {
        let session = self.sessions.entry(conn.id).or_default();
        let mut action = OutboundAction::none();
        let mut input = data.to_vec();
        let mut pos = 0;

        while pos < input.len() {
            if session.state == State::ReadingData {
                let Some(leftover) = session.collect(&input[pos..]) else {
                    break;
                };

                let response = if session.oversized {
                    reply(codes::STORAGE, "Message exceeds fixed maximum message size.")
                } else {
                    info!(
                        conn_id = conn.id,
                        domain = session.domain.as_deref().unwrap_or_default(),
                        from = session.sender.as_deref().unwrap_or_default(),
                        recipients = session.recipients.len(),
                        bytes = session.data.len(),
                        "Mail accepted"
                    );
                    reply(codes::OK, "Mail composition OK, sent.")
                };
                session.reset();
                action.frames.push(response);

                input = leftover;
                pos = 0;
                continue;
            }

            let end = input[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(input.len(), |i| pos + i + 1);
            let (response, close) = session.process(&input[pos..end]);
            pos = end;

            action.frames.push(response);
            if close {
                debug!(conn_id = conn.id, "Session quit");
                action.close = true;
                break;
            }
        }

        Ok(action)
    }

    fn on_close(&mut self, conn: &ConnectionInfo) {
        self.sessions.remove(&conn.id);
    }
}
