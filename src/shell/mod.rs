//! Interactive client shell.
//!
//! The shell alternates between two modes. While disconnected every line is
//! a local command. While connected every line is framed by the active
//! parser and sent to the server, and one response is printed per request;
//! lines starting with `!` still run local commands.

pub mod client;
pub mod command;
pub mod parser;
pub mod scripts;
pub mod vars;

use self::client::{Client, ClientError};
use self::command::{CommandError, ShellCommand};
use self::parser::ParserRegistry;
use self::scripts::ScriptRegistry;
use self::vars::{ShellVars, VarError};
use crate::config::ShellSettings;
use crate::protocol::Severity;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

/// Shell construction errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    UnknownParser(String),
    /// `--connect` value is not `HOST:PORT`
    InvalidConnect(String),
    InvalidVariable(VarError),
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellError::UnknownParser(name) => write!(f, "Unknown parser: {}", name),
            ShellError::InvalidConnect(target) => {
                write!(f, "Invalid connect target {:?}, expected HOST:PORT", target)
            }
            ShellError::InvalidVariable(e) => write!(f, "Invalid shell setting: {}", e),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::InvalidVariable(e) => Some(e),
            _ => None,
        }
    }
}

struct Session {
    client: Client,
    host: String,
}

pub struct Shell<R, W> {
    label: String,
    vars: ShellVars,
    parsers: ParserRegistry,
    parser_name: &'static str,
    scripts: ScriptRegistry,
    session: Option<Session>,
    initial_connect: Option<(String, u16)>,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(settings: &ShellSettings, input: R, output: W) -> Result<Self, ShellError> {
        let parsers = ParserRegistry::with_builtins();
        let parser_name = parsers
            .get(&settings.parser)
            .map(|parser| parser.name())
            .ok_or_else(|| ShellError::UnknownParser(settings.parser.clone()))?;

        let initial_connect = settings
            .connect
            .as_deref()
            .map(|target| {
                target
                    .rsplit_once(':')
                    .and_then(|(host, port)| Some((host.to_string(), port.parse::<u16>().ok()?)))
                    .filter(|(host, _)| !host.is_empty())
                    .ok_or_else(|| ShellError::InvalidConnect(target.to_string()))
            })
            .transpose()?;

        let vars = ShellVars::from_settings(settings).map_err(ShellError::InvalidVariable)?;

        Ok(Shell {
            label: settings.label.clone(),
            vars,
            parsers,
            parser_name,
            scripts: ScriptRegistry::with_builtins(),
            session: None,
            initial_connect,
            input,
            output,
        })
    }

    /// Run until `EXIT` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        if let Some((host, port)) = self.initial_connect.take() {
            self.connect(host, port)?;
        }

        let mut line = String::new();
        loop {
            match &self.session {
                Some(session) => write!(self.output, "{}>> ", session.host)?,
                None => write!(self.output, "{}>> ", self.label)?,
            }
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text.trim().is_empty() {
                continue;
            }

            let keep_going = if self.session.is_none() {
                self.local(text)?
            } else if let Some(local) = text.strip_prefix('!') {
                self.local(local)?
            } else {
                let request = self.active_parser_frame(text);
                self.exchange(&request)?;
                true
            };
            if !keep_going {
                break;
            }
        }

        self.disconnect();
        self.output.flush()
    }

    fn active_parser_frame(&self, line: &str) -> Vec<u8> {
        match self.parsers.get(self.parser_name) {
            Some(parser) => parser.frame_request(line),
            None => line.as_bytes().to_vec(),
        }
    }

    /// Print a local message.
    fn say(&mut self, msg: impl Display) -> io::Result<()> {
        writeln!(self.output, "{}: {}", self.label, msg)
    }

    /// Run one local command. Returns false when the shell should exit.
    fn local(&mut self, line: &str) -> io::Result<bool> {
        let command = match command::parse(line) {
            Ok(command) => command,
            Err(CommandError::Empty) => return Ok(true),
            Err(e) => {
                self.say(e)?;
                return Ok(true);
            }
        };

        match command {
            ShellCommand::Connect { host, port } => self.connect(host, port)?,
            ShellCommand::Disconnect => match self.session.as_ref().map(|s| s.host.clone()) {
                Some(host) => {
                    self.disconnect();
                    self.say(format_args!("Disconnected from {}.", host))?;
                }
                None => self.say("Not connected.")?,
            },
            ShellCommand::Send(text) => {
                if self.session.is_some() {
                    self.exchange(text.as_bytes())?;
                } else {
                    self.say("Not connected.")?;
                }
            }
            ShellCommand::Set { key, value } => match self.vars.set(&key, &value) {
                Ok(()) => self.say(format_args!("{} = {}", key.to_ascii_lowercase(), value))?,
                Err(e) => self.say(e)?,
            },
            ShellCommand::Vars => {
                let listing = self
                    .vars
                    .entries()
                    .into_iter()
                    .map(|(key, value)| format!("\n{} = {}", key, value))
                    .collect::<String>();
                self.say(format_args!("Variables:{}", listing))?;
            }
            ShellCommand::Parser(None) => {
                let active = self.parser_name;
                let names = self.parsers.names().join(", ");
                self.say(format_args!(
                    "Active parser: {} (available: {})",
                    active, names
                ))?;
            }
            ShellCommand::Parser(Some(name)) => {
                match self.parsers.get(&name).map(|parser| parser.name()) {
                    Some(found) => {
                        self.parser_name = found;
                        self.say(format_args!("Parser set to {}.", found))?;
                    }
                    None => self.say(format_args!("Unknown parser: {}", name))?,
                }
            }
            ShellCommand::Exec {
                script,
                method,
                args,
            } => self.exec(&script, &method, &args)?,
            ShellCommand::Help => self.say(format_args!("Commands:\n{}", command::HELP))?,
            ShellCommand::Exit => return Ok(false),
        }

        Ok(true)
    }

    fn connect(&mut self, host: String, port: u16) -> io::Result<()> {
        if let Some(session) = &self.session {
            let msg = format!("Already connected to {}. DISCONNECT first.", session.host);
            return self.say(msg);
        }

        match Client::connect(&host, port, &self.vars.network_options()) {
            Ok(client) => {
                debug!(peer = %client.peer(), "Session opened");
                self.say(format_args!(
                    "Will connect to host: {}, on port: {}",
                    host, port
                ))?;
                self.session = Some(Session { client, host });
                self.receive()
            }
            Err(e) => {
                debug!(host = %host, port, error = %e, "Connect failed");
                self.say(format_args!(
                    "Could not connect to specified address on specified port. ({})",
                    e
                ))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.client.shutdown();
        }
    }

    fn exec(&mut self, script: &str, method: &str, args: &[String]) -> io::Result<()> {
        let Some(host) = self.session.as_ref().map(|s| s.host.clone()) else {
            return self.say("Not connected.");
        };
        let Some(script) = self.scripts.get(script) else {
            let names = self.scripts.names().join(", ");
            return self.say(format_args!(
                "Unknown script: {} (available: {})",
                script, names
            ));
        };

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match script.build(method, &args, &host) {
            Ok(request) => self.exchange(&request),
            Err(e) => self.say(e),
        }
    }

    /// Send one request and print the response.
    fn exchange(&mut self, request: &[u8]) -> io::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return self.say("Not connected.");
        };

        match session.client.send_frame(request) {
            Ok(()) => self.receive(),
            Err(e) => self.fault(e),
        }
    }

    /// Read and print one response.
    fn receive(&mut self) -> io::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let raw = match session.client.receive_frame() {
            Ok(raw) => raw,
            Err(e) => return self.fault(e),
        };

        let parsed = match self.parsers.get(self.parser_name) {
            Some(parser) => parser.parse_response(&raw),
            None => Ok((raw.clone().into(), Severity::Ok)),
        };

        match parsed {
            Ok((msg, severity)) => {
                debug!(severity = severity.level(), bytes = raw.len(), "Response");
                let host = &session.host;
                let prefix = if severity == Severity::Error {
                    "ERROR: "
                } else {
                    ""
                };
                writeln!(
                    self.output,
                    "[{}] {}{}",
                    host,
                    prefix,
                    String::from_utf8_lossy(&msg)
                )?;
                if severity == Severity::EndOfSession {
                    self.disconnect();
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Malformed response");
                self.say(format_args!(
                    "Malformed response ({}): {}",
                    e,
                    String::from_utf8_lossy(&raw)
                ))
            }
        }
    }

    /// Report a transport error. Anything other than a timeout ends the
    /// session.
    fn fault(&mut self, error: ClientError) -> io::Result<()> {
        match error {
            ClientError::Timeout => self.say("Timed out waiting for a response."),
            e => {
                self.disconnect();
                self.say(e)
            }
        }
    }
}
