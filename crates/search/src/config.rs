//! Gateway configuration.
//!
//! Configuration is read from command line arguments or environment
//! variables, with defaults suitable for a single-node deployment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SGW_LOG_LEVEL` | info | Log level |
//! | `SGW_DEFAULT_LIMIT` | 10 | Page size when the request gives none |
//! | `SGW_MAX_LIMIT` | 1000 | Maximum page size |
//! | `SGW_MAX_OFFSET_WINDOW` | 10000 | Maximum `offset + limit` for offset paging |
//! | `SGW_AGGREGATION_SIZE` | 1000 | Terms aggregation bucket ceiling |
//! | `SGW_CURSOR_KEEP_ALIVE` | 90s | Scroll / point-in-time keep-alive |
//! | `SGW_CURSOR_CACHE_EXPIRATION` | 60m | Cursor cache entry lifetime |
//! | `SGW_REQUEST_TIMEOUT` | 1m | Engine request timeout |
//! | `SGW_MAX_RESPONSE_SIZE_MB` | 100 | Engine response size ceiling |
//! | `SGW_PAGINATION` | search-after | Cursor strategy: `scroll` or `search-after` |
//! | `SGW_CROSS_TENANT_ENABLED` | true | Allow multi-partition requests |
//! | `SGW_FANOUT_PARALLELISM` | 0 | Fan-out pool size (0 = available CPUs) |
//! | `SGW_COLLABORATION_ENABLED` | false | Collaboration scoping |
//! | `SGW_POLICY_ENABLED` | false | External policy filter |
//! | `SGW_AUTOCOMPLETE_ENABLED` | false | Phrase suggestions |
//! | `SGW_CLUSTERS_FILE` | - | JSON map of partition to cluster settings |
//!
//! # Example
//!
//! ```rust
//! use helios_search::config::{GatewayConfig, PaginationStrategy};
//!
//! let config = GatewayConfig {
//!     pagination: PaginationStrategy::Scroll,
//!     max_limit: 500,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Cursor pagination strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationStrategy {
    /// Engine scroll contexts.
    Scroll,
    /// Search-after over a point-in-time snapshot.
    #[default]
    SearchAfter,
}

impl fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaginationStrategy::Scroll => write!(f, "scroll"),
            PaginationStrategy::SearchAfter => write!(f, "search-after"),
        }
    }
}

/// Search gateway configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "sgw")]
#[command(about = "Multi-tenant search gateway")]
#[command(version)]
pub struct GatewayConfig {
    /// Log level.
    #[arg(long, env = "SGW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Page size used when a request does not give one.
    #[arg(long, env = "SGW_DEFAULT_LIMIT", default_value = "10")]
    pub default_limit: usize,

    /// Largest accepted page size.
    #[arg(long, env = "SGW_MAX_LIMIT", default_value = "1000")]
    pub max_limit: usize,

    /// Largest `offset + limit` accepted for offset paging.
    #[arg(long, env = "SGW_MAX_OFFSET_WINDOW", default_value = "10000")]
    pub max_offset_window: usize,

    /// Terms aggregation bucket ceiling.
    #[arg(long, env = "SGW_AGGREGATION_SIZE", default_value = "1000")]
    pub aggregation_size: usize,

    /// Keep-alive of scroll and point-in-time contexts.
    #[arg(long, env = "SGW_CURSOR_KEEP_ALIVE", default_value = "90s")]
    pub cursor_keep_alive: humantime::Duration,

    /// Lifetime of cursor cache entries.
    #[arg(long, env = "SGW_CURSOR_CACHE_EXPIRATION", default_value = "60m")]
    pub cursor_cache_expiration: humantime::Duration,

    /// Engine request timeout.
    #[arg(long, env = "SGW_REQUEST_TIMEOUT", default_value = "1m")]
    pub request_timeout: humantime::Duration,

    /// Engine response size ceiling in megabytes.
    #[arg(long, env = "SGW_MAX_RESPONSE_SIZE_MB", default_value = "100")]
    pub max_response_size_mb: u64,

    /// Cursor pagination strategy.
    #[arg(long, env = "SGW_PAGINATION", value_enum, default_value = "search-after")]
    pub pagination: PaginationStrategy,

    /// Allow requests spanning several data partitions.
    #[arg(long, env = "SGW_CROSS_TENANT_ENABLED", default_value = "true")]
    pub cross_tenant_enabled: bool,

    /// Fan-out worker count; 0 uses the number of available CPUs.
    #[arg(long, env = "SGW_FANOUT_PARALLELISM", default_value = "0")]
    pub fanout_parallelism: usize,

    /// Scope queries by collaboration.
    #[arg(long, env = "SGW_COLLABORATION_ENABLED", default_value = "false")]
    pub collaboration_enabled: bool,

    /// Authorize through an external compiled policy instead of ACL terms.
    #[arg(long, env = "SGW_POLICY_ENABLED", default_value = "false")]
    pub policy_enabled: bool,

    /// Return phrase suggestions for `suggestPhrase`.
    #[arg(long, env = "SGW_AUTOCOMPLETE_ENABLED", default_value = "false")]
    pub autocomplete_enabled: bool,

    /// JSON file mapping partitions to cluster settings.
    #[arg(long, env = "SGW_CLUSTERS_FILE")]
    pub clusters_file: Option<PathBuf>,

    /// JSON file holding cursor cache entries between invocations.
    /// Cursors are kept in memory when unset.
    #[arg(long, env = "SGW_CURSOR_CACHE_FILE")]
    pub cursor_cache_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_limit: 10,
            max_limit: 1000,
            max_offset_window: 10_000,
            aggregation_size: 1000,
            cursor_keep_alive: Duration::from_secs(90).into(),
            cursor_cache_expiration: Duration::from_secs(60 * 60).into(),
            request_timeout: Duration::from_secs(60).into(),
            max_response_size_mb: 100,
            pagination: PaginationStrategy::SearchAfter,
            cross_tenant_enabled: true,
            fanout_parallelism: 0,
            collaboration_enabled: false,
            policy_enabled: false,
            autocomplete_enabled: false,
            clusters_file: None,
            cursor_cache_file: None,
        }
    }
}

impl GatewayConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults if the environment does not parse.
    pub fn from_env() -> Self {
        Self::try_parse().unwrap_or_default()
    }

    /// Returns the scroll / point-in-time keep-alive.
    pub fn keep_alive(&self) -> Duration {
        *self.cursor_keep_alive
    }

    /// Returns the cursor cache entry lifetime.
    pub fn cache_expiration(&self) -> Duration {
        *self.cursor_cache_expiration
    }

    /// Returns the engine request timeout.
    pub fn timeout(&self) -> Duration {
        *self.request_timeout
    }

    /// Returns the fan-out pool size, resolving 0 to the CPU count.
    pub fn fanout_workers(&self) -> usize {
        if self.fanout_parallelism == 0 {
            num_cpus::get().max(1)
        } else {
            self.fanout_parallelism
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.default_limit == 0 {
            errors.push("Default limit cannot be 0".to_string());
        }

        if self.default_limit > self.max_limit {
            errors.push("Default limit cannot exceed max limit".to_string());
        }

        if self.max_limit > self.max_offset_window {
            errors.push("Max limit cannot exceed max offset window".to_string());
        }

        if self.aggregation_size == 0 {
            errors.push("Aggregation size cannot be 0".to_string());
        }

        if self.keep_alive().is_zero() {
            errors.push("Cursor keep-alive cannot be 0".to_string());
        }

        if self.cache_expiration() < self.keep_alive() {
            errors.push("Cursor cache expiration cannot be shorter than cursor keep-alive".to_string());
        }

        if self.timeout().is_zero() {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.max_response_size_mb == 0 {
            errors.push("Max response size cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Uses small pages and short timeouts.
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            default_limit: 10,
            max_limit: 100,
            max_offset_window: 1000,
            aggregation_size: 100,
            cursor_keep_alive: Duration::from_secs(30).into(),
            cursor_cache_expiration: Duration::from_secs(5 * 60).into(),
            request_timeout: Duration::from_secs(5).into(),
            max_response_size_mb: 10,
            pagination: PaginationStrategy::SearchAfter,
            cross_tenant_enabled: true,
            fanout_parallelism: 2,
            collaboration_enabled: false,
            policy_enabled: false,
            autocomplete_enabled: false,
            clusters_file: None,
            cursor_cache_file: None,
        }
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("helios_search={},helios_sgw={}", level, level))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.keep_alive(), Duration::from_secs(90));
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.pagination, PaginationStrategy::SearchAfter);
        assert!(config.cross_tenant_enabled);
    }

    #[test]
    fn test_parse_matches_default() {
        let parsed = GatewayConfig::try_parse_from(["sgw"]).unwrap();
        let default = GatewayConfig::default();
        assert_eq!(parsed.keep_alive(), default.keep_alive());
        assert_eq!(parsed.cache_expiration(), default.cache_expiration());
        assert_eq!(parsed.max_offset_window, default.max_offset_window);
        assert_eq!(parsed.pagination, default.pagination);
    }

    #[test]
    fn test_parse_arguments() {
        let parsed = GatewayConfig::try_parse_from([
            "sgw",
            "--pagination",
            "scroll",
            "--cursor-keep-alive",
            "2m",
            "--max-limit",
            "200",
        ])
        .unwrap();
        assert_eq!(parsed.pagination, PaginationStrategy::Scroll);
        assert_eq!(parsed.keep_alive(), Duration::from_secs(120));
        assert_eq!(parsed.max_limit, 200);
        assert!(parsed.cursor_cache_file.is_none());
    }

    #[test]
    fn test_parse_cursor_cache_file() {
        let parsed =
            GatewayConfig::try_parse_from(["sgw", "--cursor-cache-file", "/tmp/sgw-cursors.json"])
                .unwrap();
        assert_eq!(
            parsed.cursor_cache_file,
            Some(PathBuf::from("/tmp/sgw-cursors.json"))
        );
    }

    #[test]
    fn test_validate_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
        assert!(GatewayConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_limits() {
        let config = GatewayConfig {
            default_limit: 100,
            max_limit: 50,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Default limit")));
    }

    #[test]
    fn test_validate_cache_shorter_than_keep_alive() {
        let config = GatewayConfig {
            cursor_cache_expiration: Duration::from_secs(10).into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fanout_workers() {
        let config = GatewayConfig::default();
        assert!(config.fanout_workers() >= 1);
        let fixed = GatewayConfig {
            fanout_parallelism: 3,
            ..Default::default()
        };
        assert_eq!(fixed.fanout_workers(), 3);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(PaginationStrategy::Scroll.to_string(), "scroll");
        assert_eq!(PaginationStrategy::SearchAfter.to_string(), "search-after");
    }
}
