use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub frame: FrameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Content roots the endpoint lists, scans and downloads into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "platform::default_videos_dir")]
    pub videos_dir: PathBuf,
    #[serde(default = "platform::default_models_dir")]
    pub models_dir: PathBuf,
    /// Default root for `getFolderStructure` when the client names none.
    #[serde(default = "platform::default_browse_root")]
    pub browse_root: PathBuf,
    /// Additional folders reported by `getAccessibleFolders`.
    #[serde(default)]
    pub extra_folders: Vec<PathBuf>,
    /// Remote streams (or extra local files) appended to every `videoList`.
    #[serde(default)]
    pub stream_urls: Vec<String>,
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Minimum percentage advance between two `progress` events.  Values
    /// below 5 are treated as 5.
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            videos_dir: platform::default_videos_dir(),
            models_dir: platform::default_models_dir(),
            browse_root: platform::default_browse_root(),
            extra_folders: Vec::new(),
            stream_urls: Vec::new(),
            scan_depth: default_scan_depth(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            progress_step: default_progress_step(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_PORT
}

fn default_scan_depth() -> usize {
    3
}

fn default_progress_step() -> u8 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("webcontrol/{}", env!("CARGO_PKG_VERSION"))
}

fn default_tick_hz() -> u32 {
    60
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
