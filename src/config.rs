// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MPD instances to watch
    #[serde(default)]
    pub mpd: Vec<MpdConfig>,

    /// Text cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Last.fm configuration
    pub lastfm: Option<LastFmConfig>,

    /// ListenBrainz configurations (can have multiple instances)
    #[serde(default)]
    pub listenbrainz: Vec<ListenBrainzConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub name: String,
    /// `host:port` of the MPD server
    pub address: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable text cleanup
    pub enabled: bool,

    /// Regex patterns to remove from track/album/artist names
    /// Applied in order, each pattern is removed from the text
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                r"\s*\[Explicit\]".to_string(),
                r"\s*\[Clean\]".to_string(),
                r"\s*\(Explicit\)".to_string(),
                r"\s*\(Clean\)".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenBrainzConfig {
    pub enabled: bool,
    pub name: String,
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_enabled() -> bool {
    true
}

fn default_api_url() -> String {
    "https://api.listenbrainz.org".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mpd: vec![MpdConfig {
                enabled: true,
                name: "mpd".to_string(),
                address: "localhost:6600".to_string(),
                password: None,
            }],
            cleanup: CleanupConfig::default(),
            lastfm: Some(LastFmConfig {
                enabled: false,
                api_key: String::new(),
                api_secret: String::new(),
                session_key: String::new(),
            }),
            listenbrainz: vec![ListenBrainzConfig {
                enabled: false,
                name: "Primary".to_string(),
                token: String::new(),
                api_url: default_api_url(),
            }],
        }
    }
}

impl Config {
    /// Get the default path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("libra").join("config.toml"))
    }

    /// Load configuration from `path`, or create a default one if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config = Self::parse(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.mpd.iter().any(|mpd| mpd.enabled) {
            anyhow::bail!("At least one [[mpd]] player must be enabled");
        }

        for mpd in self.mpd.iter().filter(|mpd| mpd.enabled) {
            if mpd.address.is_empty() {
                anyhow::bail!("MPD address is required (player: {})", mpd.name);
            }
        }

        // Check that at least one scrobbler is enabled
        let lastfm_enabled = self.lastfm.as_ref().map(|l| l.enabled).unwrap_or(false);
        let listenbrainz_enabled = self.listenbrainz.iter().any(|l| l.enabled);

        if !lastfm_enabled && !listenbrainz_enabled {
            log::warn!("No scrobbling services are enabled");
        }

        // Validate Last.fm config if enabled
        if let Some(lastfm) = self.lastfm.as_ref().filter(|l| l.enabled) {
            if lastfm.api_key.is_empty() {
                anyhow::bail!("Last.fm api_key is required when Last.fm is enabled");
            }
            if lastfm.api_secret.is_empty() {
                anyhow::bail!("Last.fm api_secret is required when Last.fm is enabled");
            }
            if lastfm.session_key.is_empty() {
                anyhow::bail!("Last.fm session_key is required, run `libra lastfm-auth` to get one");
            }
        }

        // Validate ListenBrainz configs if enabled
        for lb in self.listenbrainz.iter().filter(|lb| lb.enabled) {
            if lb.token.is_empty() {
                anyhow::bail!("ListenBrainz token is required when enabled (instance: {})", lb.name);
            }
            if lb.api_url.is_empty() {
                anyhow::bail!("ListenBrainz api_url is required (instance: {})", lb.name);
            }
        }

        Ok(())
    }
}
