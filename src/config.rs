//! Configuration module for the authcalc server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Port used when none (or an invalid one) is given.
pub const DEFAULT_PORT: u16 = 1337;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "authcalc-server")]
#[command(author = "authcalc authors")]
#[command(version = "0.1.0")]
#[command(about = "Authenticated lcm / parentheses / caesar server", long_about = None)]
pub struct CliArgs {
    /// Path to the tab-separated users file
    pub users_file: PathBuf,

    /// Port to listen on (1-65535, default 1337)
    #[arg(allow_negative_numbers = true)]
    pub port: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log every connection and frame
    #[arg(short, long)]
    pub verbose: bool,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    pub port: Option<u16>,
    /// Maximum number of simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Upper bound of a single socket read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Largest accepted frame, without its delimiter
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Largest send backlog per connection
    #[serde(default = "default_max_pending_output")]
    pub max_pending_output: usize,
    /// Poll timeout in milliseconds (0 = block until ready)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            max_connections: default_max_connections(),
            read_chunk_size: default_read_chunk_size(),
            max_frame_size: default_max_frame_size(),
            max_pending_output: default_max_pending_output(),
            poll_timeout_ms: default_poll_timeout_ms(),
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
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_read_chunk_size() -> usize {
    4096
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_pending_output() -> usize {
    1024 * 1024 // 1 MB
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub users_file: PathBuf,
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub read_chunk_size: usize,
    pub max_frame_size: usize,
    pub max_pending_output: usize,
    pub poll_timeout: Option<Duration>,
    pub log_level: String,
    pub verbose: bool,
    /// Port argument that was rejected in favor of the default.
    pub rejected_port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            users_file: PathBuf::new(),
            host: server.host,
            port: DEFAULT_PORT,
            max_connections: server.max_connections,
            read_chunk_size: server.read_chunk_size,
            max_frame_size: server.max_frame_size,
            max_pending_output: server.max_pending_output,
            poll_timeout: poll_timeout(server.poll_timeout_ms),
            log_level: default_log_level(),
            verbose: false,
            rejected_port: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::try_parse()?)
    }

    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let (port, rejected_port) = match cli.port {
            Some(arg) => match parse_port(&arg) {
                Some(port) => (port, None),
                None => (DEFAULT_PORT, Some(arg)),
            },
            None => (toml_config.server.port.unwrap_or(DEFAULT_PORT), None),
        };

        let log_level = if cli.verbose {
            "debug".to_string()
        } else if cli.log_level != "info" {
            cli.log_level
        } else {
            toml_config.logging.level
        };

        let server = toml_config.server;
        Ok(Config {
            users_file: cli.users_file,
            host: cli.host.unwrap_or(server.host),
            port,
            max_connections: server.max_connections,
            read_chunk_size: server.read_chunk_size.max(1),
            max_frame_size: server.max_frame_size,
            max_pending_output: server.max_pending_output,
            poll_timeout: poll_timeout(server.poll_timeout_ms),
            log_level,
            verbose: cli.verbose,
            rejected_port,
        })
    }
}

/// Parse a port argument, accepting only 1-65535.
pub fn parse_port(arg: &str) -> Option<u16> {
    arg.trim().parse::<u16>().ok().filter(|&p| p != 0)
}

fn poll_timeout(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Args(#[from] clap::Error),
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("authcalc-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, None);
        assert_eq!(config.server.max_frame_size, 64 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 4000
            max_connections = 16
            read_chunk_size = 512
            max_frame_size = 1024
            max_pending_output = 2048
            poll_timeout_ms = 0

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, Some(4000));
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.read_chunk_size, 512);
        assert_eq!(config.server.max_frame_size, 1024);
        assert_eq!(config.server.max_pending_output, 2048);
        assert_eq!(config.server.poll_timeout_ms, 0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_parsing() {
        assert_eq!(parse_port("1"), Some(1));
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port(" 8080 "), Some(8080));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("http"), None);
    }

    #[test]
    fn test_cli_defaults() {
        let config = Config::from_cli(cli(&["users.txt"])).unwrap();
        assert_eq!(config.users_file, PathBuf::from("users.txt"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.rejected_port, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.poll_timeout, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = Config::from_cli(cli(&["users.txt", "99999"])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.rejected_port.as_deref(), Some("99999"));

        let config = Config::from_cli(cli(&["users.txt", "-1"])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.rejected_port.as_deref(), Some("-1"));

        let config = Config::from_cli(cli(&["users.txt", "4242"])).unwrap();
        assert_eq!(config.port, 4242);
        assert_eq!(config.rejected_port, None);
    }

    #[test]
    fn test_verbose_selects_debug() {
        let config = Config::from_cli(cli(&["users.txt", "--verbose"])).unwrap();
        assert!(config.verbose);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"127.0.0.1\"\nport = 5000\nmax_frame_size = 128\n\n[logging]\nlevel = \"warn\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = Config::from_cli(cli(&["users.txt", "--config", path])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_frame_size, 128);
        assert_eq!(config.log_level, "warn");

        let config = Config::from_cli(cli(&[
            "users.txt",
            "6000",
            "--config",
            path,
            "--host",
            "::1",
            "--log-level",
            "trace",
        ]))
        .unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 6000);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let missing = missing.to_str().unwrap();

        match Config::from_cli(cli(&["users.txt", "--config", missing])) {
            Err(ConfigError::FileRead(..)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
