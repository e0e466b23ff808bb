use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed;

const DEFAULT_ENV_PREFIX: &str = "REELS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub dedupe_ids: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            media_base_url: default_media_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            dedupe_ids: false,
        }
    }
}

impl FeedConfig {
    /// A zero timeout means requests never time out.
    pub fn timeout(&self) -> Option<Duration> {
        if self.request_timeout.is_zero() {
            None
        } else {
            Some(self.request_timeout)
        }
    }
}

fn default_endpoint() -> String {
    feed::DEFAULT_ENDPOINT.to_string()
}

fn default_media_base_url() -> String {
    feed::DEFAULT_MEDIA_BASE.to_string()
}

fn default_user_agent() -> String {
    format!("reels-tui/{}", crate::VERSION)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default = "default_start_muted")]
    pub start_muted: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: default_player_enabled(),
            mpv_path: default_mpv_path(),
            start_muted: default_start_muted(),
        }
    }
}

fn default_player_enabled() -> bool {
    true
}

fn default_mpv_path() -> String {
    "mpv".into()
}

fn default_start_muted() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("reels-tui").join("reels-tui.log"))
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.feed.endpoint.is_empty() {
        base.feed.endpoint = other.feed.endpoint;
    }
    if !other.feed.media_base_url.is_empty() {
        base.feed.media_base_url = other.feed.media_base_url;
    }
    if !other.feed.user_agent.is_empty() {
        base.feed.user_agent = other.feed.user_agent;
    }
    base.feed.request_timeout = other.feed.request_timeout;
    base.feed.dedupe_ids = other.feed.dedupe_ids;

    base.player.enabled = other.player.enabled;
    if !other.player.mpv_path.is_empty() {
        base.player.mpv_path = other.player.mpv_path;
    }
    base.player.start_muted = other.player.start_muted;

    // `file: null` turns file logging off.
    base.log.file = other.log.file;
    if !other.log.filter.is_empty() {
        base.log.filter = other.log.filter;
    }

    base
}

/// Only variables that are actually set override the current values.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.endpoint" => cfg.feed.endpoint = value,
        "feed.media_base_url" => cfg.feed.media_base_url = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "feed.request_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.request_timeout = duration;
            }
        }
        "feed.dedupe_ids" => cfg.feed.dedupe_ids = truthy(&value),
        "player.enabled" => cfg.player.enabled = truthy(&value),
        "player.mpv_path" => cfg.player.mpv_path = value,
        "player.start_muted" => cfg.player.start_muted = truthy(&value),
        "log.file" => {
            cfg.log.file = if value.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            }
        }
        "log.filter" => cfg.log.filter = value,
        _ => {}
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reels-tui").join("config.yaml"))
}
