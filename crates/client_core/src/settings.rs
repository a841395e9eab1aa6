use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::protocol::ROOM_CHANNEL;
use url::Url;

use crate::connection::ReconnectPolicy;

pub const SETTINGS_FILE: &str = "client.toml";

/// Floor for every timer setting. A zero delay or timeout would turn
/// retries into a busy loop.
pub const MIN_TIMER_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: bool,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    pub channel: String,
    pub origin: Option<String>,
    pub reconnect: ReconnectSettings,
    pub subscribe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub stale_after_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000/cable".into(),
            channel: ROOM_CHANNEL.into(),
            origin: None,
            reconnect: ReconnectSettings::default(),
            subscribe_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            // Servers ping every few seconds; two missed pings plus slack.
            stale_after_ms: 12_000,
        }
    }
}

impl ClientSettings {
    pub fn server_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.server_url.trim())
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            "http" => rewrite_scheme(url, "ws"),
            "https" => rewrite_scheme(url, "wss"),
            other => anyhow::bail!("server url must use ws:// or wss://, got '{other}://'"),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let reconnect = &self.reconnect;
        if !reconnect.enabled {
            return ReconnectPolicy::Disabled;
        }
        let delay_ms = reconnect.delay_ms.max(MIN_TIMER_MS);
        let initial = Duration::from_millis(delay_ms);
        if reconnect.backoff {
            ReconnectPolicy::Backoff {
                initial,
                max: Duration::from_millis(reconnect.max_delay_ms.max(delay_ms)),
            }
        } else {
            ReconnectPolicy::Fixed(initial)
        }
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms.max(MIN_TIMER_MS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(MIN_TIMER_MS))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms.max(MIN_TIMER_MS))
    }
}

fn rewrite_scheme(mut url: Url, scheme: &str) -> anyhow::Result<Url> {
    url.set_scheme(scheme)
        .map_err(|()| anyhow::anyhow!("cannot switch '{url}' to {scheme}://"))?;
    Ok(url)
}

/// Defaults, then `client.toml` in the working directory, then environment overrides.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    let mut settings = load_settings_file(Path::new(SETTINGS_FILE))?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn load_settings_file(path: &Path) -> anyhow::Result<ClientSettings> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

pub fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__CHANNEL") {
        settings.channel = v;
    }
    if let Some(v) = lookup("APP__ORIGIN") {
        settings.origin = Some(v);
    }
    if let Some(v) = lookup("APP__RECONNECT_ENABLED") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.reconnect.enabled = parsed;
        }
    }
    if let Some(v) = lookup("APP__RECONNECT_BACKOFF") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.reconnect.backoff = parsed;
        }
    }
    if let Some(v) = lookup("APP__RECONNECT_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect.delay_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__RECONNECT_MAX_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect.max_delay_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__SUBSCRIBE_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.subscribe_timeout_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__CONNECT_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.connect_timeout_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__STALE_AFTER_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.stale_after_ms = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
