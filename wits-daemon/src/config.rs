//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wits_broadcaster::{BroadcastConfig, ChannelSpec, ChannelTable};

use crate::cli::Cli;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// TCP port the single client connects to
    pub port: i64,

    /// Interval between transmissions (milliseconds)
    pub frequency_ms: i64,

    /// Records per transmission (1-99)
    pub records: i64,

    /// Items per record (1-99); data items start at channel 08
    pub items: i64,

    /// Channel generator overrides on top of the WITS0 record 01 table
    pub channels: Vec<ChannelSpec>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            port: 4000,
            frequency_ms: 1000,
            records: 1,
            items: 12,
            channels: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Load configuration from `config_path`, creating a default file if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .context("Failed to read config file")?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path.to_path_buf();
            Ok(config)
        } else {
            let config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Positional command line values take precedence over the file
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(frequency) = cli.frequency {
            self.frequency_ms = frequency;
        }
        if let Some(records) = cli.records {
            self.records = records;
        }
        if let Some(items) = cli.items {
            self.items = items;
        }
    }

    /// Validated broadcast parameters
    pub fn broadcast_config(&self) -> Result<BroadcastConfig> {
        BroadcastConfig::new(self.port, self.frequency_ms, self.records, self.items)
            .context("Invalid broadcast parameters")
    }

    /// Channel table with this file's overrides applied
    pub fn channel_table(&self) -> Result<ChannelTable> {
        ChannelTable::with_overrides(self.channels.iter().cloned())
            .context("Invalid channel table")
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wits-generator")
            .join("config.toml")
    }
}
