//! Configuration and paths

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub data_dir: PathBuf,
    pub media_dir: PathBuf,
    pub bridge_cmd: PathBuf,
    pub bridge_script: PathBuf,
    pub bind_host: String,
    pub port: u16,
    pub status_poll_interval: Duration,
    pub status_contact_limit: usize,
    pub seen_capacity: usize,
    pub api_timeout: Duration,
    pub joke_api_url: String,
    pub quote_api_url: String,
    pub keepalive_url: Option<String>,
    pub keepalive_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("whatsapp-assistant");

        Self {
            bot_name: DEFAULT_BOT_NAME.to_string(),
            media_dir: data_dir.join("media"),
            bridge_cmd: PathBuf::from("node"),
            bridge_script: data_dir.join("bridge/bridge.js"),
            data_dir,
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            status_poll_interval: Duration::from_secs(MIN_POLL_SECS),
            status_contact_limit: 50,
            seen_capacity: 300,
            api_timeout: Duration::from_secs(5),
            joke_api_url: DEFAULT_JOKE_API_URL.to_string(),
            quote_api_url: DEFAULT_QUOTE_API_URL.to_string(),
            keepalive_url: None,
            keepalive_interval: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Build config from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (env in production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("BOT_NAME") {
            config.bot_name = name;
        }
        if let Some(dir) = lookup("MEDIA_DIR") {
            config.media_dir = PathBuf::from(dir);
        }
        if let Some(cmd) = lookup("BRIDGE_CMD") {
            config.bridge_cmd = PathBuf::from(cmd);
        }
        if let Some(script) = lookup("BRIDGE_SCRIPT") {
            config.bridge_script = PathBuf::from(script);
        }
        if let Some(host) = lookup("BIND_HOST") {
            config.bind_host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        if let Some(secs) = lookup("STATUS_POLL_SECS") {
            let secs: u64 = parse_number("STATUS_POLL_SECS", &secs)?;
            config.status_poll_interval =
                Duration::from_secs(secs.clamp(MIN_POLL_SECS, MAX_POLL_SECS));
        }
        if let Some(limit) = lookup("STATUS_CONTACT_LIMIT") {
            config.status_contact_limit = parse_number("STATUS_CONTACT_LIMIT", &limit)?;
        }
        if let Some(capacity) = lookup("SEEN_CAPACITY") {
            let capacity: usize = parse_number("SEEN_CAPACITY", &capacity)?;
            if capacity == 0 {
                return Err(Error::Config("SEEN_CAPACITY must be at least 1".to_string()));
            }
            config.seen_capacity = capacity;
        }
        if let Some(secs) = lookup("API_TIMEOUT_SECS") {
            config.api_timeout = Duration::from_secs(parse_number("API_TIMEOUT_SECS", &secs)?);
        }
        if let Some(url) = lookup("JOKE_API_URL") {
            config.joke_api_url = url;
        }
        if let Some(url) = lookup("QUOTE_API_URL") {
            config.quote_api_url = url;
        }
        config.keepalive_url = lookup("KEEPALIVE_URL").filter(|u| !u.trim().is_empty());
        if let Some(secs) = lookup("KEEPALIVE_SECS") {
            config.keepalive_interval =
                Duration::from_secs(parse_number("KEEPALIVE_SECS", &secs)?);
        }

        Ok(config)
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            bot_name: DEFAULT_BOT_NAME.to_string(),
            data_dir: temp_dir.to_path_buf(),
            media_dir: temp_dir.join("media"),
            bridge_cmd: PathBuf::from("node"),
            bridge_script: temp_dir.join("bridge.js"),
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            status_poll_interval: Duration::from_secs(MIN_POLL_SECS),
            status_contact_limit: 0,
            seen_capacity: 300,
            api_timeout: Duration::from_millis(200),
            joke_api_url: "http://127.0.0.1:9/joke".to_string(),
            quote_api_url: "http://127.0.0.1:9/quote".to_string(),
            keepalive_url: None,
            keepalive_interval: Duration::from_secs(300),
        }
    }

    /// Socket address string for the HTTP server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BOT_NAME: &str = "WhatsApp Assistant";
pub const DEFAULT_JOKE_API_URL: &str = "https://official-joke-api.appspot.com/random_joke";
pub const DEFAULT_QUOTE_API_URL: &str = "https://zenquotes.io/api/random";

/// Status sweep interval bounds in seconds
pub const MIN_POLL_SECS: u64 = 30;
pub const MAX_POLL_SECS: u64 = 45;
