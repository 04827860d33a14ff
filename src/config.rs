//! Configuration management for nodeterm
//!
//! Handles loading and saving user preferences: the gateway, the session
//! credential and the list of known nodes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A node offered by the picker when no host is given
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    /// Host address passed to the gateway
    pub address: String,
}

/// nodeterm configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway base URL, e.g. "wss://monitor.example.com"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,

    /// Session credential sent in the auth frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Dashboard "user:password" for the gateway handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<String>,

    /// "markers" or "structured"
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Delay before re-measuring the terminal after a session mounts
    #[serde(default = "default_fit_delay_ms")]
    pub fit_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeEntry>,
}

fn default_protocol() -> String {
    "markers".to_string()
}

fn default_fit_delay_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: None,
            credential: None,
            basic_auth: None,
            protocol: default_protocol(),
            fit_delay_ms: default_fit_delay_ms(),
            nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Get config directory path (~/.nodeterm)
    pub fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".nodeterm"))
            .context("Could not find home directory")
    }

    /// Get config file path (~/.nodeterm/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // Atomic write: write to temp file then rename
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename config file to {}", path.display()))?;

        Ok(())
    }

    /// Remember the gateway and save
    pub fn set_gateway_url(&mut self, url: &str) -> Result<()> {
        self.gateway_url = Some(url.to_string());
        self.save()
    }

    pub fn fit_delay(&self) -> Duration {
        Duration::from_millis(self.fit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.gateway_url, None);
        assert_eq!(config.protocol, "markers");
        assert_eq!(config.fit_delay(), Duration::from_millis(100));
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_parse_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
gateway_url = "wss://monitor.example.com"
protocol = "structured"

[[nodes]]
name = "web-1"
address = "10.0.0.5"

[[nodes]]
name = "db"
address = "db.internal"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gateway_url.as_deref(), Some("wss://monitor.example.com"));
        assert_eq!(config.protocol, "structured");
        assert_eq!(config.fit_delay_ms, 100);
        assert_eq!(
            config.nodes[1],
            NodeEntry {
                name: "db".to_string(),
                address: "db.internal".to_string()
            }
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.gateway_url = Some("https://monitor.example.com".to_string());
        config.nodes.push(NodeEntry {
            name: "web-1".to_string(),
            address: "10.0.0.5".to_string(),
        });
        config.save_to(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.gateway_url, config.gateway_url);
        assert_eq!(loaded.nodes, config.nodes);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "gateway_url = [").unwrap();
        let err = Config::load_from(&path).err().unwrap();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
