//! Agent configuration.
//!
//! Precedence, lowest to highest: built-in defaults, JSON config file
//! (`-c/--config` or `CONFIG`), command-line flags, environment variables.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::warn;

/// Resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Server address, `host:port`.
    pub address: String,
    /// Interval between snapshot reports.
    pub report_interval: Duration,
    /// Interval between metric polls.
    pub poll_interval: Duration,
    /// HMAC signing key; empty disables signatures.
    pub key: String,
    /// Queue depth and number of concurrent outgoing sends.
    pub rate_limit: usize,
    /// Talk to the server over HTTPS.
    pub enable_https: bool,
    /// Path to the server's RSA public key PEM for payload encryption.
    pub crypto_key_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            report_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            key: String::new(),
            rate_limit: 5,
            enable_https: false,
            crypto_key_path: String::new(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pulse-agent", about = "Pulsegrid collection agent", version)]
struct Cli {
    /// Server address
    #[arg(short = 'a')]
    address: Option<String>,

    /// Report interval in seconds
    #[arg(short = 'r')]
    report_interval: Option<u64>,

    /// Poll interval in seconds
    #[arg(short = 'p')]
    poll_interval: Option<u64>,

    /// HMAC signing key
    #[arg(short = 'k')]
    key: Option<String>,

    /// Maximum number of concurrent outgoing sends
    #[arg(short = 'l')]
    rate_limit: Option<usize>,

    /// Use HTTPS for outgoing requests
    #[arg(short = 's', num_args = 0..=1, default_missing_value = "true")]
    enable_https: Option<bool>,

    /// Path to the server's RSA public key (PEM)
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
    report_interval: Option<String>,
    poll_interval: Option<String>,
    crypto_key: Option<String>,
    key: Option<String>,
    rate_limit: Option<usize>,
    enable_https: Option<bool>,
}

impl AgentConfig {
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
        if let Some(v) = cli.report_interval {
            cfg.report_interval = Duration::from_secs(v);
        }
        if let Some(v) = cli.poll_interval {
            cfg.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = cli.key {
            cfg.key = v;
        }
        if let Some(v) = cli.rate_limit {
            cfg.rate_limit = v;
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
        if let Some(v) = parsed.report_interval.as_deref() {
            if let Some(d) = parse_duration(v) {
                self.report_interval = d;
            }
        }
        if let Some(v) = parsed.poll_interval.as_deref() {
            if let Some(d) = parse_duration(v) {
                self.poll_interval = d;
            }
        }
        if let Some(v) = parsed.crypto_key {
            self.crypto_key_path = v;
        }
        if let Some(v) = parsed.key {
            self.key = v;
        }
        if let Some(v) = parsed.rate_limit {
            self.rate_limit = v;
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
        if let Ok(v) = std::env::var("REPORT_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.report_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("POLL_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.poll_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("KEY") {
            if !v.is_empty() {
                self.key = v;
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT") {
            if let Ok(limit) = v.parse::<usize>() {
                self.rate_limit = limit;
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
