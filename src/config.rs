//! Configuration module for framewire.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "framewire")]
#[command(author = "framewire authors")]
#[command(version = "0.1.0")]
#[command(about = "Line-oriented TCP services and an interactive shell", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run a server
    Serve(ServeArgs),
    /// Run the interactive client shell
    Shell(ShellArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind to (0-65535)
    #[arg(short, long, allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Application protocol to serve
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Socket transport
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// Bytes read per readiness event
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Maximum number of simultaneous connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Seed for the guessing game's targets (replayable sessions)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Label shown on local prompts
    #[arg(long)]
    pub label: Option<String>,

    /// Response parser to start with
    #[arg(long)]
    pub parser: Option<String>,

    /// Connect on startup (host:port)
    #[arg(long)]
    pub connect: Option<String>,
}

/// Application protocol served by `serve`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    Guessing,
    Echo,
    Smtp,
}

/// Socket type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stream,
    Datagram,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default = "default_transport")]
    pub transport: Transport,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
    /// Bytes read per readiness event
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Guessing game seed, random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: default_transport(),
            protocol: default_protocol(),
            buffer_size: default_buffer_size(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            seed: None,
        }
    }
}

/// Shell-related configuration
#[derive(Debug, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_parser")]
    pub parser: String,
    /// Read timeout in seconds (0 = no timeout)
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_true")]
    pub blocking: bool,
    /// Accumulate reads until end-of-stream
    #[serde(default)]
    pub continuous: bool,
    #[serde(default)]
    pub add_carriage_return: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            parser: default_parser(),
            timeout: default_timeout(),
            buffer_size: default_buffer_size(),
            blocking: true,
            continuous: false,
            add_carriage_return: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> i64 {
    65432
}

fn default_transport() -> Transport {
    Transport::Stream
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Guessing
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_connections() -> usize {
    1024
}

fn default_backlog() -> i32 {
    128
}

fn default_label() -> String {
    "local".to_string()
}

fn default_parser() -> String {
    "guessing".to_string()
}

fn default_timeout() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    /// Validated against 0-65535 at bind time
    pub port: i64,
    pub transport: Transport,
    pub protocol: ProtocolType,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub backlog: i32,
    pub seed: Option<u64>,
}

impl From<ServerConfig> for ServerSettings {
    fn from(c: ServerConfig) -> Self {
        Self {
            host: c.host,
            port: c.port,
            transport: c.transport,
            protocol: c.protocol,
            buffer_size: c.buffer_size,
            max_connections: c.max_connections,
            backlog: c.backlog,
            seed: c.seed,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerConfig::default().into()
    }
}

/// Resolved shell settings
#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub label: String,
    pub parser: String,
    pub connect: Option<String>,
    pub timeout: f64,
    pub buffer_size: usize,
    pub blocking: bool,
    pub continuous: bool,
    pub add_carriage_return: bool,
}

impl From<ShellConfig> for ShellSettings {
    fn from(c: ShellConfig) -> Self {
        Self {
            label: c.label,
            parser: c.parser,
            connect: None,
            timeout: c.timeout,
            buffer_size: c.buffer_size,
            blocking: c.blocking,
            continuous: c.continuous,
            add_carriage_return: c.add_carriage_return,
        }
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        ShellConfig::default().into()
    }
}

/// What the binary was asked to run
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(ServerSettings),
    Shell(ShellSettings),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let log_level = if cli.log_level != "info" {
            cli.log_level
        } else {
            toml_config.logging.level
        };

        let mode = match cli.command {
            CliCommand::Serve(args) => {
                let server = toml_config.server;
                Mode::Serve(ServerSettings {
                    host: args.host.unwrap_or(server.host),
                    port: args.port.unwrap_or(server.port),
                    transport: args.transport.unwrap_or(server.transport),
                    protocol: args.protocol.unwrap_or(server.protocol),
                    buffer_size: args.buffer_size.unwrap_or(server.buffer_size),
                    max_connections: args.max_connections.unwrap_or(server.max_connections),
                    backlog: server.backlog,
                    seed: args.seed.or(server.seed),
                })
            }
            CliCommand::Shell(args) => {
                let mut shell = ShellSettings::from(toml_config.shell);
                if let Some(label) = args.label {
                    shell.label = label;
                }
                if let Some(parser) = args.parser {
                    shell.parser = parser;
                }
                shell.connect = args.connect;
                Mode::Shell(shell)
            }
        };

        Config { mode, log_level }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 65432);
        assert_eq!(config.server.buffer_size, 1024);
        assert_eq!(config.server.protocol, ProtocolType::Guessing);
        assert_eq!(config.shell.label, "local");
        assert!(config.shell.blocking);
        assert!(!config.shell.continuous);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 7000
            protocol = "echo"
            transport = "stream"
            buffer_size = 4096

            [shell]
            label = "me"
            timeout = 0.5
            continuous = true

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.protocol, ProtocolType::Echo);
        assert_eq!(config.server.buffer_size, 4096);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.shell.label, "me");
        assert_eq!(config.shell.timeout, 0.5);
        assert!(config.shell.continuous);
        assert_eq!(config.shell.parser, "guessing");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_toml_keeps_out_of_range_port() {
        // Range checking belongs to the server, not the parser
        let config: TomlConfig = toml::from_str("[server]\nport = -1\n").unwrap();
        assert_eq!(config.server.port, -1);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::try_parse_from([
            "framewire",
            "--log-level",
            "trace",
            "serve",
            "--port",
            "9000",
            "--protocol",
            "echo",
        ])
        .unwrap();
        let toml_config: TomlConfig =
            toml::from_str("[server]\nhost = \"0.0.0.0\"\nport = 7000\n").unwrap();

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.log_level, "trace");
        match config.mode {
            Mode::Serve(settings) => {
                assert_eq!(settings.host, "0.0.0.0");
                assert_eq!(settings.port, 9000);
                assert_eq!(settings.protocol, ProtocolType::Echo);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_smtp_protocol_and_seed() {
        let cli = CliArgs::try_parse_from(["framewire", "serve", "--protocol", "smtp"]).unwrap();
        let toml_config: TomlConfig = toml::from_str("[server]\nseed = 42\n").unwrap();

        match Config::merge(cli, toml_config).mode {
            Mode::Serve(settings) => {
                assert_eq!(settings.protocol, ProtocolType::Smtp);
                assert_eq!(settings.seed, Some(42));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let cli = CliArgs::try_parse_from(["framewire", "serve", "--seed", "7"]).unwrap();
        let toml_config: TomlConfig = toml::from_str("[server]\nseed = 42\n").unwrap();
        match Config::merge(cli, toml_config).mode {
            Mode::Serve(settings) => assert_eq!(settings.seed, Some(7)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_shell_args() {
        let cli = CliArgs::try_parse_from([
            "framewire",
            "shell",
            "--parser",
            "raw",
            "--connect",
            "127.0.0.1:65432",
        ])
        .unwrap();

        match Config::merge(cli, TomlConfig::default()).mode {
            Mode::Shell(settings) => {
                assert_eq!(settings.parser, "raw");
                assert_eq!(settings.label, "local");
                assert_eq!(settings.connect.as_deref(), Some("127.0.0.1:65432"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
