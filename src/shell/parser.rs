//! Response parsers for the shell.
//!
//! A parser turns a raw server response into a message and a severity, and
//! frames each typed line before it is sent. Parsers are compiled in and
//! looked up by name.

use crate::protocol::{self, FrameError, Severity};
use bytes::Bytes;
use std::collections::BTreeMap;

pub trait ResponseParser {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Split a response into its message and severity.
    fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError>;

    /// Bytes to send for one typed line. Sent as typed by default.
    fn frame_request(&self, line: &str) -> Vec<u8> {
        line.as_bytes().to_vec()
    }
}

/// Passes responses through untouched, always with severity `Ok`.
pub struct RawParser;

impl ResponseParser for RawParser {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError> {
        Ok((Bytes::copy_from_slice(raw), Severity::Ok))
    }
}

/// Decodes `CODE:MESSAGE` framing.
pub struct BasicParser;

impl ResponseParser for BasicParser {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError> {
        protocol::decode_with_severity(raw)
    }
}

/// Framing decode plus the guessing game request syntax: `guess 42` is sent
/// as `GUESS:42`.
pub struct GuessingParser;

impl ResponseParser for GuessingParser {
    fn name(&self) -> &'static str {
        "guessing"
    }

    fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError> {
        protocol::decode_with_severity(raw)
    }

    fn frame_request(&self, line: &str) -> Vec<u8> {
        line.to_ascii_uppercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(":")
            .into_bytes()
    }
}

/// SMTP replies: `<code> <text>` lines, with `<code>-<text>` continuations.
/// Typed lines are sent with a trailing CRLF.
pub struct SmtpParser;

impl SmtpParser {
    fn severity(code: u32) -> Result<Severity, FrameError> {
        match code {
            221 | 421 => Ok(Severity::EndOfSession),
            200..=399 => Ok(Severity::Ok),
            400..=599 => Ok(Severity::Error),
            other => Err(FrameError::UnknownStatus(other)),
        }
    }
}

impl ResponseParser for SmtpParser {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError> {
        let text = String::from_utf8_lossy(raw);
        let mut code = None;
        let mut lines = Vec::new();

        for line in text.trim_end_matches(['\r', '\n']).split('\n') {
            let line = line.trim_end_matches('\r');
            let prefix = line.get(..3).unwrap_or(line);
            let rest = line.get(3..).unwrap_or_default();
            let well_formed = prefix.len() == 3
                && prefix.bytes().all(|b| b.is_ascii_digit())
                && (rest.is_empty() || rest.starts_with([' ', '-']));
            let status = match prefix.parse::<u32>() {
                Ok(status) if well_formed => status,
                _ => return Err(FrameError::InvalidStatus(prefix.to_string())),
            };

            code.get_or_insert(status);
            lines.push(rest.get(1..).unwrap_or_default());
        }

        let severity = match code {
            Some(code) => Self::severity(code)?,
            None => return Err(FrameError::InvalidStatus(String::new())),
        };
        Ok((Bytes::from(lines.join("\n")), severity))
    }

    fn frame_request(&self, line: &str) -> Vec<u8> {
        format!("{}\r\n", line).into_bytes()
    }
}

/// Parsers by name.
pub struct ParserRegistry {
    parsers: BTreeMap<&'static str, Box<dyn ResponseParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Registry holding `raw`, `basic`, `guessing` and `smtp`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RawParser));
        registry.register(Box::new(BasicParser));
        registry.register(Box::new(GuessingParser));
        registry.register(Box::new(SmtpParser));
        registry
    }

    /// Add a parser, replacing any parser with the same name.
    pub fn register(&mut self, parser: Box<dyn ResponseParser>) {
        self.parsers.insert(parser.name(), parser);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ResponseParser> {
        self.parsers
            .get(name.to_ascii_lowercase().as_str())
            .map(|parser| parser.as_ref())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.keys().copied().collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["basic", "guessing", "raw", "smtp"]);
        assert_eq!(registry.get("Guessing").unwrap().name(), "guessing");
        assert!(registry.get("http").is_none());
    }

    #[test]
    fn test_raw_passthrough() {
        let (msg, severity) = RawParser.parse_response(b"not framed").unwrap();
        assert_eq!(&msg[..], b"not framed");
        assert_eq!(severity, Severity::Ok);
        assert_eq!(RawParser.frame_request("guess 5"), b"guess 5");
    }

    #[test]
    fn test_basic_decodes_severity() {
        let (msg, severity) = BasicParser.parse_response(b"201:Invalid command.").unwrap();
        assert_eq!(&msg[..], b"Invalid command.");
        assert_eq!(severity, Severity::Error);

        match BasicParser.parse_response(b"abc:hello") {
            Err(FrameError::InvalidStatus(prefix)) => assert_eq!(prefix, "abc"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_guessing_request_framing() {
        assert_eq!(GuessingParser.frame_request("guess 42"), b"GUESS:42");
        assert_eq!(GuessingParser.frame_request("  start  "), b"START");
        assert_eq!(GuessingParser.frame_request("Quit"), b"QUIT");
        assert_eq!(GuessingParser.frame_request(""), b"");
    }

    #[test]
    fn test_smtp_replies() {
        let (msg, severity) = SmtpParser.parse_response(b"250 Welcome, example.org!\r\n").unwrap();
        assert_eq!(&msg[..], b"Welcome, example.org!");
        assert_eq!(severity, Severity::Ok);

        let (msg, severity) = SmtpParser
            .parse_response(b"250-first\r\n250 second\r\n")
            .unwrap();
        assert_eq!(&msg[..], b"first\nsecond");
        assert_eq!(severity, Severity::Ok);

        let (_, severity) = SmtpParser.parse_response(b"354 Start mail input\r\n").unwrap();
        assert_eq!(severity, Severity::Ok);
        let (_, severity) = SmtpParser.parse_response(b"503 Bad sequence\r\n").unwrap();
        assert_eq!(severity, Severity::Error);
        let (_, severity) = SmtpParser.parse_response(b"221 Bye\r\n").unwrap();
        assert_eq!(severity, Severity::EndOfSession);
        let (msg, _) = SmtpParser.parse_response(b"250").unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_smtp_malformed() {
        match SmtpParser.parse_response(b"200:Connection established.") {
            Err(FrameError::InvalidStatus(prefix)) => assert_eq!(prefix, "200"),
            other => panic!("unexpected: {:?}", other),
        }
        match SmtpParser.parse_response(b"hi") {
            Err(FrameError::InvalidStatus(prefix)) => assert_eq!(prefix, "hi"),
            other => panic!("unexpected: {:?}", other),
        }
        match SmtpParser.parse_response(b"999 what\r\n") {
            Err(FrameError::UnknownStatus(code)) => assert_eq!(code, 999),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(SmtpParser.frame_request("NOOP"), b"NOOP\r\n");
    }

    #[test]
    fn test_register_replaces() {
        struct Loud;
        impl ResponseParser for Loud {
            fn name(&self) -> &'static str {
                "raw"
            }
            fn parse_response(&self, raw: &[u8]) -> Result<(Bytes, Severity), FrameError> {
                Ok((Bytes::copy_from_slice(&raw.to_ascii_uppercase()), Severity::Ok))
            }
        }

        let mut registry = ParserRegistry::with_builtins();
        registry.register(Box::new(Loud));
        let (msg, _) = registry.get("raw").unwrap().parse_response(b"hi").unwrap();
        assert_eq!(&msg[..], b"HI");
        assert_eq!(registry.names().len(), 4);
    }
}
