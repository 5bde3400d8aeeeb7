//! Server configuration.
//!
//! Precedence, lowest to highest: built-in defaults, JSON config file
//! (`-c/--config` or `CONFIG`), command-line flags, environment variables.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::warn;

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub address: String,
    /// Interval between snapshot saves; zero means save on every update.
    pub store_interval: Duration,
    /// Snapshot file path; empty disables the file backend.
    pub file_storage_path: String,
    /// Load the snapshot file on startup.
    pub restore: bool,
    /// Postgres DSN; empty disables the database backend.
    pub database_dsn: String,
    /// HMAC signing key; empty disables signatures.
    pub key: String,
    /// Serve HTTPS when certificate and key files are available.
    pub enable_https: bool,
    /// Path to the RSA private key PEM for payload decryption.
    pub crypto_key_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            store_interval: Duration::from_secs(300),
            file_storage_path: "/tmp/pulsegrid-metrics.json".to_string(),
            restore: true,
            database_dsn: String::new(),
            key: String::new(),
            enable_https: false,
            crypto_key_path: String::new(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pulse-server", about = "Pulsegrid metrics server", version)]
struct Cli {
    /// Listen address
    #[arg(short = 'a')]
    address: Option<String>,

    /// Snapshot interval in seconds (0 = save on every update)
    #[arg(short = 'i')]
    store_interval: Option<u64>,

    /// Snapshot file path
    #[arg(short = 'f')]
    file_storage_path: Option<String>,

    /// Restore metrics from the snapshot file on startup
    #[arg(short = 'r', num_args = 0..=1, default_missing_value = "true")]
    restore: Option<bool>,

    /// Postgres DSN
    #[arg(short = 'd')]
    database_dsn: Option<String>,

    /// HMAC signing key
    #[arg(short = 'k')]
    key: Option<String>,

    /// Enable HTTPS
    #[arg(short = 's', num_args = 0..=1, default_missing_value = "true")]
    enable_https: Option<bool>,

    /// Path to the RSA private key (PEM)
    #[arg(long = "crypto-key")]
    crypto_key: Option<String>,

    /// Path to a JSON config file
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

/// JSON config file shape; absent fields keep the previous value.
#[derive(Debug, Default, Deserialize)]
struct JsonConfig {
    address: Option<String>,
    restore: Option<bool>,
    store_interval: Option<String>,
    store_file: Option<String>,
    database_dsn: Option<String>,
    crypto_key: Option<String>,
    key: Option<String>,
    enable_https: Option<bool>,
}

impl ServerConfig {
    /// Resolves the configuration from CLI arguments, an optional JSON
    /// file and the environment.
    #[must_use]
    pub fn load() -> Self {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Self {
        let mut cfg = Self::default();

        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("CONFIG").ok())
            .unwrap_or_default();
        if !config_path.is_empty() {
            cfg.apply_json_file(&config_path);
        }

        if let Some(v) = cli.address {
            cfg.address = v;
        }
        if let Some(v) = cli.store_interval {
            cfg.store_interval = Duration::from_secs(v);
        }
        if let Some(v) = cli.file_storage_path {
            cfg.file_storage_path = v;
        }
        if let Some(v) = cli.restore {
            cfg.restore = v;
        }
        if let Some(v) = cli.database_dsn {
            cfg.database_dsn = v;
        }
        if let Some(v) = cli.key {
            cfg.key = v;
        }
        if let Some(v) = cli.enable_https {
            cfg.enable_https = v;
        }
        if let Some(v) = cli.crypto_key {
            cfg.crypto_key_path = v;
        }

        cfg.apply_env();
        cfg
    }

    fn apply_json_file(&mut self, path: &str) {
        let Ok(data) = std::fs::read(path) else {
            warn!(path, "config file is not readable, ignoring");
            return;
        };
        let parsed: JsonConfig = match serde_json::from_slice(&data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path, error = %e, "config file is not valid JSON, ignoring");
                return;
            }
        };

        if let Some(v) = parsed.address.filter(|v| !v.is_empty()) {
            self.address = v;
        }
        if let Some(v) = parsed.restore {
            self.restore = v;
        }
        if let Some(v) = parsed.store_interval.as_deref() {
            if let Some(d) = parse_duration(v) {
                self.store_interval = d;
            }
        }
        if let Some(v) = parsed.store_file.filter(|v| !v.is_empty()) {
            self.file_storage_path = v;
        }
        if let Some(v) = parsed.database_dsn {
            self.database_dsn = v;
        }
        if let Some(v) = parsed.crypto_key {
            self.crypto_key_path = v;
        }
        if let Some(v) = parsed.key {
            self.key = v;
        }
        if let Some(v) = parsed.enable_https {
            self.enable_https = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ADDRESS") {
            if !v.is_empty() {
                self.address = v;
            }
        }
        if let Ok(v) = std::env::var("STORE_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.store_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("FILE_STORAGE_PATH") {
            if !v.is_empty() {
                self.file_storage_path = v;
            }
        }
        if let Ok(v) = std::env::var("RESTORE") {
            if let Ok(flag) = v.parse::<bool>() {
                self.restore = flag;
            }
        }
        if let Ok(v) = std::env::var("DATABASE_DSN") {
            if !v.is_empty() {
                self.database_dsn = v;
            }
        }
        if let Ok(v) = std::env::var("KEY") {
            if !v.is_empty() {
                self.key = v;
            }
        }
        if let Ok(v) = std::env::var("ENABLE_HTTPS") {
            if let Ok(flag) = v.parse::<bool>() {
                self.enable_https = flag;
            }
        }
        if let Ok(v) = std::env::var("CRYPTO_KEY") {
            if !v.is_empty() {
                self.crypto_key_path = v;
            }
        }
    }
}

/// Parses duration strings as they appear in JSON configs: `300ms`,
/// `10s`, `2m`, `1h`, or a bare number of seconds.
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (number, unit) = text.split_at(text.find(|c: char| c.is_ascii_alphabetic())?);
    let value: f64 = number.parse().ok()?;
    let millis = match unit {
        "ms" => value,
        "s" => value * 1000.0,
        "m" => value * 60.0 * 1000.0,
        "h" => value * 60.0 * 60.0 * 1000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis as u64))
}
