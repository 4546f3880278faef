//! Grammar of the shell's local commands.

/// A parsed local command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Connect { host: String, port: u16 },
    Disconnect,
    /// Send text verbatim, bypassing the parser's request framing
    Send(String),
    Set { key: String, value: String },
    Vars,
    /// Show or switch the active parser
    Parser(Option<String>),
    Exec {
        script: String,
        method: String,
        args: Vec<String>,
    },
    Help,
    Exit,
}

/// Command parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    /// Wrong arguments, carries the usage line
    Usage(&'static str),
    InvalidPort,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "No command given."),
            CommandError::Unknown(word) => {
                write!(f, "Unknown command: {}. Type HELP for a list.", word)
            }
            CommandError::Usage(usage) => write!(f, "Usage: {}", usage),
            CommandError::InvalidPort => write!(f, "Port must be a number from 0 to 65535."),
        }
    }
}

impl std::error::Error for CommandError {}

pub const HELP: &str = "\
CONNECT <host> <port>          open a session
DISCONNECT                     close the session
SEND <text>                    send text without request framing
SET <key> <value>              change a variable
VARS                           list variables
PARSER [name]                  show or select the response parser
EXEC <script> <method> [args]  send a scripted request
HELP                           show this list
EXIT                           leave the shell
While connected, prefix a line with ! to run a local command.";

/// Parse one line of local input.
pub fn parse(line: &str) -> Result<ShellCommand, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    };
    if word.is_empty() {
        return Err(CommandError::Empty);
    }

    let args: Vec<&str> = rest.split_whitespace().collect();

    match word.to_ascii_uppercase().as_str() {
        "CONNECT" => match args.as_slice() {
            [host, port] => {
                let port = port.parse::<u16>().map_err(|_| CommandError::InvalidPort)?;
                Ok(ShellCommand::Connect {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(CommandError::Usage("CONNECT <host> <port>")),
        },
        "DISCONNECT" => Ok(ShellCommand::Disconnect),
        "SEND" if !rest.is_empty() => Ok(ShellCommand::Send(rest.to_string())),
        "SEND" => Err(CommandError::Usage("SEND <text>")),
        "SET" => match args.as_slice() {
            [key, value] => Ok(ShellCommand::Set {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => Err(CommandError::Usage("SET <key> <value>")),
        },
        "VARS" => Ok(ShellCommand::Vars),
        "PARSER" => match args.as_slice() {
            [] => Ok(ShellCommand::Parser(None)),
            [name] => Ok(ShellCommand::Parser(Some(name.to_string()))),
            _ => Err(CommandError::Usage("PARSER [name]")),
        },
        "EXEC" => match args.as_slice() {
            [script, method, args @ ..] => Ok(ShellCommand::Exec {
                script: script.to_string(),
                method: method.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            }),
            _ => Err(CommandError::Usage("EXEC <script> <method> [args]")),
        },
        "HELP" => Ok(ShellCommand::Help),
        "EXIT" => Ok(ShellCommand::Exit),
        _ => Err(CommandError::Unknown(word.to_string())),
    }
}
