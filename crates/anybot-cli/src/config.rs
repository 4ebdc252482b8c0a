use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration, loaded from `config.toml` and then overridden by
/// the environment.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub app_token: String,
    #[serde(default)]
    pub output_channel: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            output_channel: String::new(),
            api_base: default_slack_api_base(),
            reconnect_delay_secs: default_reconnect_delay(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_slack_api_base() -> String {
    anybot_channels::slack::api::DEFAULT_API_BASE.to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_event_buffer() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub default_org_id: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
            request_timeout_secs: default_request_timeout(),
            default_org_id: None,
        }
    }
}

fn default_platform_base_url() -> String {
    anybot_core::platform::anypoint::DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_selection_ttl")]
    pub selection_ttl_secs: u64,
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            selection_ttl_secs: default_selection_ttl(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_selection_ttl() -> u64 {
    36_000
}

fn default_purge_interval() -> u64 {
    1800
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadsConfig {
    #[serde(default = "default_download_dir")]
    pub dir: PathBuf,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

/// `~/.config/anybot/config.toml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("anybot").join("config.toml"))
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

impl BotConfig {
    /// Load from `path`. An explicit path must exist; without one the default
    /// location is tried and a missing file means "defaults only".
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            Some(path) if required => bail!("Config file not found: {}", path.display()),
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over file values when set and non-empty
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = v;
        }
        if let Some(v) = get("SLACK_APP_TOKEN") {
            self.slack.app_token = v;
        }
        if let Some(v) = get("CHANNEL_ID") {
            self.slack.output_channel = v;
        }
        if let Some(v) = get("ANYPOINT_ORG_ID") {
            self.platform.default_org_id = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.slack.bot_token.trim().is_empty() {
            missing.push("slack.bot_token (SLACK_BOT_TOKEN)");
        }
        if self.slack.app_token.trim().is_empty() {
            missing.push("slack.app_token (SLACK_APP_TOKEN)");
        }
        if self.slack.output_channel.trim().is_empty() {
            missing.push("slack.output_channel (CHANNEL_ID)");
        }
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        url::Url::parse(&self.platform.base_url)
            .with_context(|| format!("Invalid platform.base_url: {}", self.platform.base_url))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.platform.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        secs(self.slack.reconnect_delay_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        secs(self.session.token_ttl_secs)
    }

    pub fn selection_ttl(&self) -> Duration {
        secs(self.session.selection_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        secs(self.session.purge_interval_secs)
    }
}
