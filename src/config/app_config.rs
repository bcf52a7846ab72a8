//! Application-level configuration
//!
//! Defines the top-level configuration: database location, logging, the
//! HTTP server, pagination limits and the event feed.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded default configuration file
const DEFAULT_CONFIG: &str = include_str!("../../mate-feed.config.toml");

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "mate-feed.config.toml";

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Page size limits
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Creation event feed
    #[serde(default)]
    pub events: EventsConfig,
}

impl AppConfig {
    /// Load configuration from the first location that has a file, falling
    /// back to the embedded defaults.
    pub fn load() -> Result<Self> {
        // Try to load from mate-feed.config.toml in current directory
        if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_NAME) {
            return toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", CONFIG_FILE_NAME, e));
        }

        // Try to load from ~/.mate-feed/mate-feed.config.toml
        if let Some(base_dirs) = BaseDirs::new() {
            let home_config = base_dirs
                .home_dir()
                .join(".mate-feed")
                .join(CONFIG_FILE_NAME);
            if let Ok(content) = std::fs::read_to_string(&home_config) {
                return toml::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("Failed to parse {}: {}", home_config.display(), e)
                });
            }
        }

        // Try to load from environment variable CONFIG_PATH
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            if let Ok(content) = std::fs::read_to_string(&config_path) {
                return toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e));
            }
        }

        Self::embedded_default()
    }

    /// Load configuration from a specific file path.
    /// If the file doesn't exist, creates it with default settings.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "Configuration file not found at {}. Creating with default settings...",
                    path.display()
                );

                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .context(format!("Failed to create directory {}", parent.display()))?;
                    }
                }

                std::fs::write(path, DEFAULT_CONFIG).context(format!(
                    "Failed to create config file at {}",
                    path.display()
                ))?;

                Self::embedded_default()
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }

    /// The configuration shipped inside the binary.
    pub fn embedded_default() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG)
            .map_err(|e| anyhow::anyhow!("Failed to parse embedded default config: {}", e))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }

        if self.pagination.max_page_size == 0 {
            return Err(anyhow::anyhow!("pagination.max_page_size must be at least 1"));
        }
        if self.pagination.default_page_size > self.pagination.max_page_size {
            return Err(anyhow::anyhow!(
                "pagination.default_page_size ({}) exceeds max_page_size ({})",
                self.pagination.default_page_size,
                self.pagination.max_page_size
            ));
        }
        if self.pagination.nested_page_size > self.pagination.max_page_size {
            return Err(anyhow::anyhow!(
                "pagination.nested_page_size ({}) exceeds max_page_size ({})",
                self.pagination.nested_page_size,
                self.pagination.max_page_size
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(anyhow::anyhow!("events.channel_capacity must be at least 1"));
        }

        if self.server.host.trim().is_empty() {
            return Err(anyhow::anyhow!("server.host cannot be empty"));
        }

        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(level) = var("MATE_FEED_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(db_path) = var("MATE_FEED_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }
        if let Some(host) = var("MATE_FEED_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("MATE_FEED_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(size) = var("MATE_FEED_DEFAULT_PAGE_SIZE").and_then(|s| s.parse().ok()) {
            self.pagination.default_page_size = size;
        }
        if let Some(size) = var("MATE_FEED_MAX_PAGE_SIZE").and_then(|s| s.parse().ok()) {
            self.pagination.max_page_size = size;
        }
    }

    /// Get a summary of the configuration
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Configuration loaded:\n");
        summary.push_str(&format!("Database: {}\n", self.database.path.display()));
        summary.push_str(&format!("Logging Level: {}\n", self.logging.level));
        summary.push_str(&format!(
            "Server: {}:{} (cors: {})\n",
            self.server.host, self.server.port, self.server.enable_cors
        ));
        summary.push_str(&format!(
            "Page Size: default {}, max {}, nested {}\n",
            self.pagination.default_page_size,
            self.pagination.max_page_size,
            self.pagination.nested_page_size
        ));
        summary.push_str(&format!(
            "Event Channel Capacity: {}\n",
            self.events.channel_capacity
        ));
        summary
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mate-feed.duckdb"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
        }
    }
}

/// Page size limits applied to every paginated request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Window size when a request names neither `first` nor `last`
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Upper bound on any window
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Messages embedded per conversation in the feed
    #[serde(default = "default_page_size")]
    pub nested_page_size: usize,
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            nested_page_size: default_page_size(),
        }
    }
}

/// Creation event feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer; slow subscribers past this many events lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_is_valid() {
        let config = AppConfig::embedded_default().unwrap();
        config.validate().unwrap();
        assert_eq!(config.pagination.default_page_size, 20);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [pagination]
            max_page_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.pagination.max_page_size, 50);
        assert_eq!(config.pagination.default_page_size, 20);
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_default_above_max() {
        let mut config = AppConfig::default();
        config.pagination.default_page_size = 200;
        assert!(config.validate().is_err());
    }
}
