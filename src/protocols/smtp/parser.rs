//! SMTP command line parser.
//!
//! Every command is a four letter verb, optionally followed by a space and
//! an argument, terminated by `<CRLF>`. Verbs are matched
//! case-insensitively.

/// A well-formed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELO <domain>`
    Helo(String),
    /// `MAIL FROM: <address>`
    Mail(String),
    /// `RCPT TO: <address>`
    Rcpt(String),
    Data,
    Rset,
    Noop,
    /// `HELP [topic]`
    Help(Option<String>),
    /// `VRFY <user>`
    Vrfy(String),
    Quit,
}

/// Why a line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Verb not recognised, answered with 500
    Unrecognised,
    /// Known verb with bad arguments, answered with 501
    Syntax(&'static str),
}

const INCORRECT_SYNTAX: ParseError = ParseError::Syntax("Incorrect syntax.");

/// Parse one line, including its terminator.
pub fn parse(line: &[u8]) -> Result<Command, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::Unrecognised)?;
    let (body, terminated) = match line.strip_suffix("\r\n") {
        Some(body) => (body, true),
        None => (line, false),
    };

    let verb = body.get(..4).ok_or(ParseError::Unrecognised)?;
    let arg = match &body[4..] {
        "" => None,
        rest => Some(rest.strip_prefix(' ').ok_or(ParseError::Unrecognised)?),
    };

    match verb.to_ascii_uppercase().as_str() {
        "HELO" => {
            if !terminated {
                return Err(ParseError::Syntax("Invalid command syntax."));
            }
            match arg {
                Some(domain) if is_domain(domain) => Ok(Command::Helo(domain.to_string())),
                _ => Err(ParseError::Syntax("Invalid domain provided.")),
            }
        }
        "MAIL" if terminated => address(arg, "FROM:").map(Command::Mail),
        "RCPT" if terminated => address(arg, "TO:").map(Command::Rcpt),
        "DATA" if terminated && arg.is_none() => Ok(Command::Data),
        "RSET" if terminated && arg.is_none() => Ok(Command::Rset),
        "QUIT" if terminated && arg.is_none() => Ok(Command::Quit),
        "NOOP" if terminated => Ok(Command::Noop),
        "HELP" if terminated => Ok(Command::Help(
            arg.map(str::trim).filter(|topic| !topic.is_empty()).map(str::to_string),
        )),
        "VRFY" if terminated => match arg.map(str::trim) {
            Some(user) if !user.is_empty() => Ok(Command::Vrfy(user.to_string())),
            _ => Err(ParseError::Syntax("Invalid syntax.")),
        },
        "MAIL" | "RCPT" | "DATA" | "RSET" | "QUIT" | "NOOP" | "HELP" | "VRFY" => {
            Err(INCORRECT_SYNTAX)
        }
        _ => Err(ParseError::Unrecognised),
    }
}

/// `<keyword> <address>` as used by MAIL and RCPT.
fn address(arg: Option<&str>, keyword: &str) -> Result<String, ParseError> {
    let mut parts = arg.ok_or(INCORRECT_SYNTAX)?.split(' ');
    let (Some(found), Some(address), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(INCORRECT_SYNTAX);
    };
    if !found.eq_ignore_ascii_case(keyword) {
        return Err(INCORRECT_SYNTAX);
    }

    let address = address
        .strip_prefix('<')
        .and_then(|a| a.strip_suffix('>'))
        .ok_or(ParseError::Syntax("Incorrect email address formatting."))?;
    if !is_address(address) {
        return Err(ParseError::Syntax("Invalid email address."));
    }
    Ok(address.to_string())
}

/// Dotted hostname with an alphabetic top-level label.
fn is_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let valid_label = |label: &&str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    };
    labels.iter().all(valid_label)
        && labels
            .last()
            .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_alphabetic()))
}

fn is_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && local
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"<>()[],;:\\\"@".contains(&b))
        && is_domain(domain)
}
