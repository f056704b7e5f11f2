use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::pagination::MAX_PAGE_SIZE;

pub const SETTINGS_FILE: &str = "chat_feed.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub server_url: String,
    pub page_size: u32,
    pub live_channel_capacity: usize,
    pub event_channel_capacity: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            page_size: 25,
            live_channel_capacity: 256,
            event_channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    page_size: Option<u32>,
    live_channel_capacity: Option<usize>,
    event_channel_capacity: Option<usize>,
}

pub fn load_settings() -> FeedSettings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

/// Defaults, overlaid by `path` when it parses, overlaid by the environment.
pub fn load_settings_from(path: &Path) -> FeedSettings {
    let mut settings = FeedSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(error) => tracing::warn!(
                path = %path.display(),
                %error,
                "config: ignoring unparsable settings file"
            ),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.page_size = settings.page_size.clamp(1, MAX_PAGE_SIZE);
    settings
}

impl FeedSettings {
    /// Parsed `server_url` with a trailing slash so relative joins keep any
    /// path prefix.
    pub fn server_base_url(&self) -> Result<Url> {
        let mut raw = self.server_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("invalid server_url '{}'", self.server_url))
    }
}

fn apply_file_settings(settings: &mut FeedSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v;
    }
    if let Some(v) = file_cfg.live_channel_capacity {
        settings.live_channel_capacity = v;
    }
    if let Some(v) = file_cfg.event_channel_capacity {
        settings.event_channel_capacity = v;
    }
}

fn apply_env_overrides(settings: &mut FeedSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHAT_FEED_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
