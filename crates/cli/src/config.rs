//! Configuration management for watchman-watch.
//!
//! Uses figment to merge configuration from multiple sources:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. Command-line arguments

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use watchman_client::{ClientConfig, DEFAULT_NOTIFICATION_BUFFER};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub client: ConnectionConfig,

    /// Watch command configuration
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Connection-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Daemon socket path; discovered when unset
    #[serde(default)]
    pub socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of notifications buffered before the reader stalls
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

/// Watch command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Subscription name
    #[serde(default = "default_subscription")]
    pub subscription: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_notification_buffer() -> usize {
    DEFAULT_NOTIFICATION_BUFFER
}

fn default_subscription() -> String {
    "watchman-watch".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket: None,
            log_level: default_log_level(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            subscription: default_subscription(),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_file: Option<&PathBuf>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Add config file if provided
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        } else if let Some(path) = default_config_path().filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(path));
        }

        // Environment variables (WATCHMAN_WATCH_ prefix)
        figment = figment.merge(Env::prefixed("WATCHMAN_WATCH_").split("__"));

        figment.extract()
    }

    /// Override socket path from CLI
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        if let Some(s) = socket {
            self.client.socket = Some(s);
        }
        self
    }

    /// Override log level from CLI
    pub fn with_log_level(mut self, log_level: Option<String>) -> Self {
        if let Some(level) = log_level {
            self.client.log_level = level;
        }
        self
    }

    /// Override subscription name from CLI
    pub fn with_subscription(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.watch.subscription = name;
        }
        self
    }

    /// Settings for the client connection
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            notification_buffer: self.client.notification_buffer,
            ..ClientConfig::default()
        }
        .with_socket(self.client.socket.clone())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("watchman-watch/config.toml"))
}
