//! Client Configuration Settings
//!
//! Configuration for the trade stream client, loaded from environment
//! variables. Numeric values that fail to parse fall back to their
//! defaults; structural problems (bad URL, zero capacity or buffer) are errors.

use std::time::Duration;

use crate::application::services::{
    DEFAULT_FRAME_BUFFER, DEFAULT_THROUGHPUT_INTERVAL, StreamClientConfig,
};
use crate::domain::batch::DEFAULT_PENDING_HIGH_WATER;
use crate::domain::history::{DEFAULT_DISPLAY_CAPACITY, DEFAULT_HISTORY_CAPACITY};
use crate::infrastructure::feed::{DEFAULT_RECONNECT_DELAY, DEFAULT_SYMBOL};
use crate::infrastructure::scheduler::DEFAULT_FRAME_INTERVAL;

/// Default feed endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:8000/ws";

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Feed endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Symbol assigned to trades that arrive without one.
    pub default_symbol: String,
    /// Only trades for this symbol feed the price history. `None` admits all.
    pub price_symbol: Option<String>,
    /// Wait before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Frame interval for the headless scheduler.
    pub frame_interval: Duration,
    /// Price history capacity.
    pub history_capacity: usize,
    /// Display log capacity.
    pub display_capacity: usize,
    /// Pending queue size above which a backlog warning is logged.
    pub pending_high_water: usize,
    /// Frames buffered ahead of the client before socket reads pause.
    pub frame_buffer: usize,
    /// Throughput log interval. Zero disables the reporter.
    pub throughput_interval: Duration,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            price_symbol: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            display_capacity: DEFAULT_DISPLAY_CAPACITY,
            pending_high_water: DEFAULT_PENDING_HIGH_WATER,
            frame_buffer: DEFAULT_FRAME_BUFFER,
            throughput_interval: DEFAULT_THROUGHPUT_INTERVAL,
            metrics_port: 0,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a WebSocket URL or a capacity is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a WebSocket URL or a capacity is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = lookup("TRADE_STREAM_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.url);

        let default_symbol = lookup("TRADE_STREAM_DEFAULT_SYMBOL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_symbol);

        let price_symbol = lookup("TRADE_STREAM_PRICE_SYMBOL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let config = Self {
            url,
            default_symbol,
            price_symbol,
            reconnect_delay: parse_env_duration_millis(
                &lookup,
                "TRADE_STREAM_RECONNECT_DELAY_MS",
                defaults.reconnect_delay,
            ),
            frame_interval: parse_env_duration_millis(
                &lookup,
                "TRADE_STREAM_FRAME_INTERVAL_MS",
                defaults.frame_interval,
            ),
            history_capacity: parse_env_usize(
                &lookup,
                "TRADE_STREAM_HISTORY_CAPACITY",
                defaults.history_capacity,
            ),
            display_capacity: parse_env_usize(
                &lookup,
                "TRADE_STREAM_DISPLAY_CAPACITY",
                defaults.display_capacity,
            ),
            pending_high_water: parse_env_usize(
                &lookup,
                "TRADE_STREAM_PENDING_HIGH_WATER",
                defaults.pending_high_water,
            ),
            frame_buffer: parse_env_usize(
                &lookup,
                "TRADE_STREAM_FRAME_BUFFER",
                defaults.frame_buffer,
            ),
            throughput_interval: parse_env_duration_secs(
                &lookup,
                "TRADE_STREAM_THROUGHPUT_INTERVAL_SECS",
                defaults.throughput_interval,
            ),
            metrics_port: parse_env_u16(&lookup, "TRADE_STREAM_METRICS_PORT", defaults.metrics_port),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check structural constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.url)?;

        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_STREAM_HISTORY_CAPACITY",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.display_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_STREAM_DISPLAY_CAPACITY",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.frame_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_STREAM_FRAME_BUFFER",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Settings consumed by the stream client itself.
    #[must_use]
    pub fn stream_client_config(&self) -> StreamClientConfig {
        StreamClientConfig {
            url: self.url.clone(),
            default_symbol: self.default_symbol.clone(),
            price_symbol: self.price_symbol.clone(),
            reconnect_delay: self.reconnect_delay,
            history_capacity: self.history_capacity,
            display_capacity: self.display_capacity,
            pending_high_water: self.pending_high_water,
            frame_buffer: self.frame_buffer,
            throughput_interval: self.throughput_interval,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The endpoint is not a usable WebSocket URL.
    #[error("invalid stream URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending value.
        url: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A variable holds a value outside its allowed range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: "scheme must be ws:// or wss://",
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host",
        });
    }

    Ok(())
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.url, "ws://localhost:8000/ws");
        assert_eq!(config.default_symbol, "BTC/USD");
        assert_eq!(config.price_symbol, None);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.frame_interval, Duration::from_millis(16));
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.display_capacity, 100);
        assert_eq!(config.pending_high_water, 10_000);
        assert_eq!(config.frame_buffer, 1024);
        assert_eq!(config.throughput_interval, Duration::from_secs(60));
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            ("TRADE_STREAM_URL", "wss://feed.example.com/trades"),
            ("TRADE_STREAM_DEFAULT_SYMBOL", "ETH/USD"),
            ("TRADE_STREAM_PRICE_SYMBOL", "BTC/USD"),
            ("TRADE_STREAM_RECONNECT_DELAY_MS", "500"),
            ("TRADE_STREAM_FRAME_INTERVAL_MS", "33"),
            ("TRADE_STREAM_HISTORY_CAPACITY", "10"),
            ("TRADE_STREAM_DISPLAY_CAPACITY", "20"),
            ("TRADE_STREAM_PENDING_HIGH_WATER", "64"),
            ("TRADE_STREAM_FRAME_BUFFER", "256"),
            ("TRADE_STREAM_THROUGHPUT_INTERVAL_SECS", "5"),
            ("TRADE_STREAM_METRICS_PORT", "9100"),
        ])
        .unwrap();

        assert_eq!(config.url, "wss://feed.example.com/trades");
        assert_eq!(config.default_symbol, "ETH/USD");
        assert_eq!(config.price_symbol.as_deref(), Some("BTC/USD"));
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.frame_interval, Duration::from_millis(33));
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.display_capacity, 20);
        assert_eq!(config.pending_high_water, 64);
        assert_eq!(config.frame_buffer, 256);
        assert_eq!(config.throughput_interval, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9100);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = load(&[
            ("TRADE_STREAM_RECONNECT_DELAY_MS", "soon"),
            ("TRADE_STREAM_HISTORY_CAPACITY", "-4"),
            ("TRADE_STREAM_METRICS_PORT", "70000"),
        ])
        .unwrap();

        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn blank_price_symbol_means_all_symbols() {
        let config = load(&[("TRADE_STREAM_PRICE_SYMBOL", "  ")]).unwrap();
        assert_eq!(config.price_symbol, None);
    }

    #[test_case("http://localhost/ws" ; "http scheme")]
    #[test_case("localhost:8000" ; "no scheme")]
    #[test_case("ws://" ; "no host")]
    #[test_case("wss:///path" ; "empty host")]
    fn rejects_bad_urls(url: &str) {
        let err = load(&[("TRADE_STREAM_URL", url)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test_case("TRADE_STREAM_HISTORY_CAPACITY" ; "history")]
    #[test_case("TRADE_STREAM_DISPLAY_CAPACITY" ; "display")]
    #[test_case("TRADE_STREAM_FRAME_BUFFER" ; "frame buffer")]
    fn rejects_zero_capacity(key: &str) {
        let err = load(&[(key, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: k, .. } if k == key));
    }

    #[test]
    fn stream_client_config_carries_client_fields() {
        let config = load(&[
            ("TRADE_STREAM_PRICE_SYMBOL", "SOL/USD"),
            ("TRADE_STREAM_DISPLAY_CAPACITY", "7"),
        ])
        .unwrap();
        let client = config.stream_client_config();

        assert_eq!(client.url, config.url);
        assert_eq!(client.price_symbol.as_deref(), Some("SOL/USD"));
        assert_eq!(client.display_capacity, 7);
        assert_eq!(client.reconnect_delay, config.reconnect_delay);
        assert_eq!(client.frame_buffer, config.frame_buffer);
    }
}
