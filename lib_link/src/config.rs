use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_SOCKET_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_COOLDOWN_SECONDS: u64 = 5;
const DEFAULT_STATUS_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_PAYLOAD_HEADER: &str = "LNK:";
const DEFAULT_PAYLOAD_MIN_LENGTH: usize = 8;

/// A remote endpoint the keeper maintains a session to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{s}'"))?;
        if host.is_empty() {
            return Err(format!("missing host in '{s}'"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in '{s}': {e}"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Persistent TCP session keeper", version)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[clap(long, env = "RELINK_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    /// Destinations list, config-file form.
    #[clap(skip)]
    pub destinations: Option<Vec<Destination>>,

    #[clap(long = "target", env = "RELINK_TARGETS", value_delimiter = ',', help = "Destination as host:port. Repeatable; overrides the config file list.")]
    #[serde(skip)]
    pub targets: Option<Vec<Destination>>,

    #[clap(long, env = "RELINK_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RELINK_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RELINK_POOL_SIZE", help = "Maximum idle connections kept per destination.")]
    pub pool_size: Option<usize>,

    #[clap(long, env = "RELINK_HEARTBEAT_INTERVAL_SECONDS", help = "Seconds between liveness heartbeats on an idle connection.")]
    pub heartbeat_interval_seconds: Option<u64>,

    #[clap(long, env = "RELINK_SOCKET_TIMEOUT_SECONDS", help = "Bound in seconds for connect/send/receive socket operations.")]
    pub socket_timeout_seconds: Option<u64>,

    #[clap(long, env = "RELINK_MAX_RETRIES", help = "Consecutive failures tolerated per guarded operation before the session fails over.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "RELINK_COOLDOWN_SECONDS", help = "Delay before a failed session starts its next connect cycle.")]
    pub cooldown_seconds: Option<u64>,

    #[clap(long, env = "RELINK_STATUS_INTERVAL_SECONDS", help = "Interval in seconds for the link status summary log line.")]
    pub status_interval_seconds: Option<u64>,

    #[clap(long, env = "RELINK_PAYLOAD_HEADER", help = "Header marker a valid payload must start with.")]
    pub payload_header: Option<String>,

    #[clap(long, env = "RELINK_PAYLOAD_MIN_LENGTH", help = "Minimum body length required after the header marker.")]
    pub payload_min_length: Option<usize>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            destinations: other.destinations.or(self.destinations),
            targets: other.targets.or(self.targets),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            pool_size: other.pool_size.or(self.pool_size),
            heartbeat_interval_seconds: other
                .heartbeat_interval_seconds
                .or(self.heartbeat_interval_seconds),
            socket_timeout_seconds: other
                .socket_timeout_seconds
                .or(self.socket_timeout_seconds),
            max_retries: other.max_retries.or(self.max_retries),
            cooldown_seconds: other.cooldown_seconds.or(self.cooldown_seconds),
            status_interval_seconds: other
                .status_interval_seconds
                .or(self.status_interval_seconds),
            payload_header: other.payload_header.or(self.payload_header),
            payload_min_length: other.payload_min_length.or(self.payload_min_length),
        }
    }

    /// Resolves the merged configuration into the concrete values the
    /// engine consumes. Missing destinations is the only fatal condition.
    pub fn resolve(self) -> anyhow::Result<Settings> {
        let destinations = self
            .targets
            .or(self.destinations)
            .unwrap_or_default();
        if destinations.is_empty() {
            anyhow::bail!(
                "no destinations configured; pass --target host:port or list destinations in the config file"
            );
        }

        Ok(Settings {
            destinations,
            pool_size: self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            heartbeat_interval: Duration::from_secs(
                self.heartbeat_interval_seconds
                    .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECONDS),
            ),
            socket_timeout: Duration::from_secs(
                self.socket_timeout_seconds
                    .unwrap_or(DEFAULT_SOCKET_TIMEOUT_SECONDS),
            ),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            cooldown: Duration::from_secs(
                self.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS),
            ),
            status_interval: Duration::from_secs(
                self.status_interval_seconds
                    .unwrap_or(DEFAULT_STATUS_INTERVAL_SECONDS),
            ),
            payload_header: self
                .payload_header
                .unwrap_or_else(|| DEFAULT_PAYLOAD_HEADER.to_string())
                .into_bytes(),
            payload_min_length: self
                .payload_min_length
                .unwrap_or(DEFAULT_PAYLOAD_MIN_LENGTH),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Concrete values the engine consumes, produced by [`Config::resolve`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub destinations: Vec<Destination>,
    pub pool_size: usize,
    pub heartbeat_interval: Duration,
    pub socket_timeout: Duration,
    pub max_retries: u32,
    pub cooldown: Duration,
    pub status_interval: Duration,
    pub payload_header: Vec<u8>,
    pub payload_min_length: usize,
    pub log_dir: PathBuf,
    pub log_level: String,
}

pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        pool_size: Some(DEFAULT_POOL_SIZE),
        heartbeat_interval_seconds: Some(DEFAULT_HEARTBEAT_INTERVAL_SECONDS),
        socket_timeout_seconds: Some(DEFAULT_SOCKET_TIMEOUT_SECONDS),
        max_retries: Some(DEFAULT_MAX_RETRIES),
        cooldown_seconds: Some(DEFAULT_COOLDOWN_SECONDS),
        status_interval_seconds: Some(DEFAULT_STATUS_INTERVAL_SECONDS),
        payload_header: Some(DEFAULT_PAYLOAD_HEADER.to_string()),
        payload_min_length: Some(DEFAULT_PAYLOAD_MIN_LENGTH),
        ..Default::default()
    };

    // 2. Load from config file (relink.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let cli_args_for_path = Config::parse();

    let config_file_path = cli_args_for_path
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("relink.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments.
    //    clap::Parser handles env vars and CLI args in one pass.
    let cli_args_final = Config::parse();
    current_config.merge(cli_args_final)
}
