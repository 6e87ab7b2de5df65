//! Reactor and stream configuration.
//!
//! [`ReactorConfig`] and [`StreamOptions`] are the library's plain data
//! types, with `Default` impls carrying the documented defaults. [`Config`]
//! is the ambient, application-facing layer: command-line arguments
//! (`clap`) merged over an optional TOML file (`serde` + `toml`), CLI
//! taking precedence, for the demo binaries that embed the reactor.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Per-stream option set, applied at socket creation or immediately if the
/// socket already exists.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// How long a non-blocking connect may linger before failing.
    pub connection_timeout_ms: u64,
    /// `SO_RCVTIMEO`-equivalent; `0` means unlimited.
    pub read_timeout_ms: u64,
    /// `SO_SNDTIMEO`-equivalent; `0` means unlimited.
    pub write_timeout_ms: u64,
    /// Toggles the non-blocking flag on the underlying descriptor.
    pub non_block_mode: bool,
    /// Advisory size hint for the write side.
    pub write_buffer_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 5_000,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            non_block_mode: false,
            write_buffer_size: 64 * 1024,
        }
    }
}

/// Reactor construction parameters.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub port: u16,
    pub max_concurrent_connections: usize,
    pub max_accepts_per_tick: usize,
    pub poll_timeout_ms: u64,
    /// Ring buffer capacity for every prepooled connection buffer.
    pub ring_buffer_capacity: usize,
    /// Injection point for TLS or other acceptor flavors. When set, the
    /// reactor does not own the listening socket and will not close it on
    /// shutdown.
    pub custom_acceptor: Option<std::net::TcpListener>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            port: 9393,
            max_concurrent_connections: 1024,
            max_accepts_per_tick: 128,
            poll_timeout_ms: 1000,
            ring_buffer_capacity: 512 * 1024,
            custom_acceptor: None,
        }
    }
}

impl std::fmt::Debug for ReactorConfig {
    // std::net::TcpListener has no Debug impl prior to custom_acceptor
    // being present, so this mirrors the derive except for that field.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorConfig")
            .field("port", &self.port)
            .field("max_concurrent_connections", &self.max_concurrent_connections)
            .field("max_accepts_per_tick", &self.max_accepts_per_tick)
            .field("poll_timeout_ms", &self.poll_timeout_ms)
            .field("ring_buffer_capacity", &self.ring_buffer_capacity)
            .field("custom_acceptor", &self.custom_acceptor.is_some())
            .finish()
    }
}

/// Command-line arguments for the demo binaries.
#[derive(Parser, Debug)]
#[command(name = "reactor-io")]
#[command(author = "reactor-io authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded readiness reactor demo", long_about = None)]
pub struct CliArgs {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Maximum number of concurrent connections.
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Maximum accepts admitted in a single tick.
    #[arg(long)]
    pub max_accepts_per_tick: Option<usize>,

    /// Readiness-wait timeout in milliseconds.
    #[arg(long)]
    pub poll_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub reactor: ReactorTomlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ReactorTomlConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_accepts_per_tick")]
    pub max_accepts_per_tick: usize,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for ReactorTomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_connections: default_max_connections(),
            max_accepts_per_tick: default_max_accepts_per_tick(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
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

fn default_port() -> u16 {
    9393
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_accepts_per_tick() -> usize {
    128
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved demo configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_connections: usize,
    pub max_accepts_per_tick: usize,
    pub poll_timeout_ms: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and an optional TOML file. CLI
    /// arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            port: cli.port.unwrap_or(toml_config.reactor.port),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.reactor.max_connections),
            max_accepts_per_tick: cli
                .max_accepts_per_tick
                .unwrap_or(toml_config.reactor.max_accepts_per_tick),
            poll_timeout_ms: cli.poll_timeout_ms.unwrap_or(toml_config.reactor.poll_timeout_ms),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

impl From<&Config> for ReactorConfig {
    fn from(c: &Config) -> Self {
        ReactorConfig {
            port: c.port,
            max_concurrent_connections: c.max_connections,
            max_accepts_per_tick: c.max_accepts_per_tick,
            poll_timeout_ms: c.poll_timeout_ms,
            ..ReactorConfig::default()
        }
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
