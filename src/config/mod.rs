use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable holding the bot token
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable holding the Bot API server address
pub const API_URL_ENV: &str = "TELEGRAM_API_BASE_URL";

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "YOU2DL_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram connection settings
    pub telegram: TelegramConfig,

    /// Download pipeline settings
    pub downloads: DownloadConfig,

    /// Conversation settings
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token; usually supplied through the environment instead
    pub token: Option<String>,

    /// Base address of the Bot API server
    pub api_url: String,

    /// Upload budget for the first delivery attempt, in seconds
    pub delivery_timeout_secs: u64,

    /// Upload budget for the single retry after a timeout, in seconds
    pub delivery_retry_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Parent directory of the per-job working directories
    pub work_dir: PathBuf,

    /// Cookie file handed to yt-dlp when it exists
    pub cookies_path: PathBuf,

    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Minimum seconds between two progress edits in one chat
    pub progress_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Conversations idle for longer than this are forgotten, in seconds
    pub idle_ttl_secs: u64,

    /// How often idle conversations are swept, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "http://telegram-api:8081".to_string(),
            delivery_timeout_secs: 60,
            delivery_retry_timeout_secs: 90,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("you2downloader"),
            cookies_path: PathBuf::from("cookies").join("cookies.txt"),
            yt_dlp_path: "yt-dlp".to_string(),
            progress_interval_secs: 3,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    ///
    /// `explicit` wins over `./config.yaml`, which wins over the user config
    /// directory. A missing file is not an error.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        if !config_path.exists() {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        tracing::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("you2downloader").join("config.yaml"))
    }

    /// Apply values given on the command line or through the environment
    pub fn apply_overrides(&mut self, token: Option<String>, api_url: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.token = Some(token);
        }
        if let Some(api_url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.telegram.api_url = api_url;
        }
    }

    /// Validate configuration needed to run the bot
    pub fn validate(&self) -> Result<()> {
        self.bot_token()?;
        self.api_url()?;

        if self.telegram.delivery_retry_timeout_secs < self.telegram.delivery_timeout_secs {
            anyhow::bail!("delivery_retry_timeout_secs must not be shorter than delivery_timeout_secs");
        }

        Ok(())
    }

    /// The bot token; its absence is fatal
    pub fn bot_token(&self) -> Result<String> {
        self.telegram
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .with_context(|| format!("{} is not set", TOKEN_ENV))
    }

    /// Bot API base address, without the `/bot` suffix some clients expect
    pub fn api_url(&self) -> Result<Url> {
        let raw = self.telegram.api_url.trim().trim_end_matches('/');
        let raw = raw.strip_suffix("/bot").unwrap_or(raw);

        let parsed = Url::parse(raw)
            .with_context(|| format!("Invalid Bot API URL: {}", self.telegram.api_url))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Bot API URL must use HTTP or HTTPS protocol");
        }

        Ok(parsed)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram.delivery_timeout_secs)
    }

    pub fn delivery_retry_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram.delivery_retry_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.downloads.progress_interval_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_secs.max(1))
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  Bot Token: {}",
            if self.bot_token().is_ok() { "set" } else { "NOT SET" }
        );
        println!("  Bot API URL: {}", self.telegram.api_url);
        println!(
            "  Delivery Timeouts: {}s, retry {}s",
            self.telegram.delivery_timeout_secs, self.telegram.delivery_retry_timeout_secs
        );
        println!("  Work Directory: {}", self.downloads.work_dir.display());
        println!("  Cookies: {}", self.downloads.cookies_path.display());
        println!("  yt-dlp: {}", self.downloads.yt_dlp_path);
        println!("  Progress Interval: {}s", self.downloads.progress_interval_secs);
        println!("  Session Idle TTL: {}s", self.sessions.idle_ttl_secs);
    }
}
