//! Guessing game request parser.

/// Recognised commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    /// `INFO` or `HELP`
    Info,
    Players,
    Start,
    Guess,
    Unknown,
}

/// A parsed `COMMAND[:VALUE]` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub value: Option<i64>,
}

/// Request does not follow `COMMAND` or `COMMAND:<integer>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStructure;

/// Parse one request. Trailing whitespace is ignored and commands are
/// case-insensitive.
pub fn parse(input: &[u8]) -> Result<Request, InvalidStructure> {
    let input = input.trim_ascii_end();
    let mut segments = input.split(|&b| b == b':');

    let command = segments.next().unwrap_or_default();
    let value = match segments.next() {
        None => None,
        Some(raw) => Some(parse_value(raw).ok_or(InvalidStructure)?),
    };
    if segments.next().is_some() {
        return Err(InvalidStructure);
    }

    Ok(Request {
        command: parse_command(command),
        value,
    })
}

fn parse_command(command: &[u8]) -> Command {
    if command.eq_ignore_ascii_case(b"QUIT") {
        Command::Quit
    } else if command.eq_ignore_ascii_case(b"INFO") || command.eq_ignore_ascii_case(b"HELP") {
        Command::Info
    } else if command.eq_ignore_ascii_case(b"PLAYERS") {
        Command::Players
    } else if command.eq_ignore_ascii_case(b"START") {
        Command::Start
    } else if command.eq_ignore_ascii_case(b"GUESS") {
        Command::Guess
    } else {
        Command::Unknown
    }
}

fn parse_value(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_command() {
        assert_eq!(
            parse(b"START"),
            Ok(Request {
                command: Command::Start,
                value: None
            })
        );
        assert_eq!(parse(b"help").unwrap().command, Command::Info);
        assert_eq!(parse(b"players\r\n").unwrap().command, Command::Players);
    }

    #[test]
    fn test_parse_guess() {
        assert_eq!(
            parse(b"GUESS:40"),
            Ok(Request {
                command: Command::Guess,
                value: Some(40)
            })
        );
        assert_eq!(parse(b"guess:-3\n").unwrap().value, Some(-3));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(parse(b"DANCE").unwrap().command, Command::Unknown);
        assert_eq!(parse(b"").unwrap().command, Command::Unknown);
    }

    #[test]
    fn test_invalid_structure() {
        assert_eq!(parse(b"GUESS:abc"), Err(InvalidStructure));
        assert_eq!(parse(b"GUESS:1:2"), Err(InvalidStructure));
        assert_eq!(parse(b"GUESS:"), Err(InvalidStructure));
    }
}
