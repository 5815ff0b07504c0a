use anyhow::{Context, Result};
use clap::Parser;
use lib_common::core::{SessionOptions, TimestampZone, WriteFailurePolicy};
use lib_common::relay::RelayOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CONFIG_FILE: &str = "server_relay.conf";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "WebSocket broadcast relay server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RELAY_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "RELAY_BIND", help = "Interface address to bind.")]
    pub bind: Option<IpAddr>,

    // Chosen before the file is read, so the file itself cannot set it.
    #[clap(long, env = "RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RELAY_WELCOME", help = "Text frame sent to every client on connect.")]
    pub welcome: Option<String>,

    #[clap(
        long,
        env = "RELAY_UTC",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Stamp messages in UTC instead of server local time."
    )]
    pub utc: Option<bool>,

    #[clap(
        long,
        env = "RELAY_RELEASE_ON_WRITE_FAILURE",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Disconnect a client as soon as a broadcast write to it fails."
    )]
    pub release_on_write_failure: Option<bool>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            bind: other.bind.or(self.bind),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            welcome: other.welcome.or(self.welcome),
            utc: other.utc.or(self.utc),
            release_on_write_failure: other.release_on_write_failure.or(self.release_on_write_failure),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            bind: DEFAULT_BIND.parse().ok(),
            log_dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
            welcome: Some(lib_common::core::DEFAULT_WELCOME.to_string()),
            utc: Some(false),
            release_on_write_failure: Some(false),
            ..Default::default()
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self.bind.unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.port.unwrap_or(DEFAULT_PORT))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
    }

    pub fn log_level(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn relay_options(&self) -> RelayOptions {
        let mut session = SessionOptions::default();
        if let Some(welcome) = &self.welcome {
            session.welcome = welcome.clone();
        }
        if self.utc.unwrap_or(false) {
            session.zone = TimestampZone::Utc;
        }

        RelayOptions {
            session,
            write_failure: if self.release_on_write_failure.unwrap_or(false) {
                WriteFailurePolicy::Release
            } else {
                WriteFailurePolicy::LogOnly
            },
        }
    }
}

fn load_file(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Layers defaults, the JSON config file (if present) and `cli` (which already
/// carries environment variables) in increasing order of precedence.
///
/// A missing config file is fine; one that exists but cannot be read or parsed
/// is an error.
pub fn load_config(cli: Config) -> Result<Config> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        current_config = current_config.merge(load_file(&config_file_path)?);
    }

    Ok(current_config.merge(cli))
}
