use std::{collections::HashMap, fs, time::Duration};

use shared::protocol::ROOM_CHANNEL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub ping_interval_secs: u64,
    pub channels: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            ping_interval_secs: 3,
            channels: vec![ROOM_CHANNEL.to_string()],
        }
    }
}

impl Settings {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string("server.toml")
        .ok()
        .and_then(|raw| toml::from_str::<HashMap<String, String>>(&raw).ok())
        .unwrap_or_default();
    settings_from(&file_cfg, |key| std::env::var(key).ok())
}

fn settings_from(
    file_cfg: &HashMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("ping_interval_secs") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.ping_interval_secs = parsed;
        }
    }
    if let Some(v) = file_cfg.get("channels") {
        settings.channels = parse_channels(v);
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__PING_INTERVAL_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.ping_interval_secs = parsed;
        }
    }
    if let Some(v) = env("APP__CHANNELS") {
        settings.channels = parse_channels(&v);
    }

    settings
}

fn parse_channels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
