use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_target_local_room_channel() {
    let settings = ClientSettings::default();
    assert_eq!(settings.channel, "RoomChannel");
    assert_eq!(
        settings.server_url().expect("url").as_str(),
        "ws://127.0.0.1:3000/cable"
    );
    assert_eq!(settings.subscribe_timeout(), Duration::from_secs(5));
}

#[test]
fn http_urls_are_rewritten_to_websocket_schemes() {
    let mut settings = ClientSettings {
        server_url: "https://chat.example.com/cable".into(),
        ..ClientSettings::default()
    };
    assert_eq!(
        settings.server_url().expect("url").as_str(),
        "wss://chat.example.com/cable"
    );

    settings.server_url = "http://localhost:3000/cable".into();
    assert_eq!(settings.server_url().expect("url").scheme(), "ws");

    settings.server_url = "ftp://localhost/cable".into();
    assert!(settings.server_url().is_err());

    settings.server_url = "not a url".into();
    assert!(settings.server_url().is_err());
}

#[test]
fn reconnect_policy_follows_settings() {
    let mut settings = ClientSettings::default();
    assert_eq!(
        settings.reconnect_policy(),
        ReconnectPolicy::Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    );

    settings.reconnect.backoff = false;
    settings.reconnect.delay_ms = 250;
    assert_eq!(
        settings.reconnect_policy(),
        ReconnectPolicy::Fixed(Duration::from_millis(250))
    );

    settings.reconnect.enabled = false;
    assert_eq!(settings.reconnect_policy(), ReconnectPolicy::Disabled);
}

#[test]
fn env_overrides_replace_file_values() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("CHAT_SERVER_URL", "ws://ignored/cable"),
        ("APP__SERVER_URL", "wss://chat.example.com/cable"),
        ("APP__RECONNECT_ENABLED", "false"),
        ("APP__RECONNECT_DELAY_MS", "250"),
        ("APP__SUBSCRIBE_TIMEOUT_MS", "not-a-number"),
        ("APP__ORIGIN", "https://chat.example.com"),
    ]);
    let mut settings = ClientSettings::default();
    apply_env_overrides(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_url, "wss://chat.example.com/cable");
    assert!(!settings.reconnect.enabled);
    assert_eq!(settings.reconnect.delay_ms, 250);
    assert_eq!(settings.subscribe_timeout_ms, 5_000);
    assert_eq!(settings.origin.as_deref(), Some("https://chat.example.com"));
}

#[test]
fn missing_settings_file_yields_defaults() {
    let settings =
        load_settings_file(Path::new("/definitely/not/here/client.toml")).expect("defaults");
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn partial_settings_file_keeps_other_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chat_client_settings_test_{suffix}.toml"));
    fs::write(
        &path,
        "server_url = \"ws://chat.local/cable\"\n\n[reconnect]\ndelay_ms = 50\n",
    )
    .expect("write settings");

    let settings = load_settings_file(&path).expect("load");
    assert_eq!(settings.server_url, "ws://chat.local/cable");
    assert_eq!(settings.reconnect.delay_ms, 50);
    assert!(settings.reconnect.enabled);
    assert_eq!(settings.channel, "RoomChannel");

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn malformed_settings_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chat_client_settings_bad_{suffix}.toml"));
    fs::write(&path, "server_url = [").expect("write settings");

    assert!(load_settings_file(&path).is_err());

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn zero_timers_are_raised_to_the_floor() {
    let settings = ClientSettings {
        subscribe_timeout_ms: 0,
        connect_timeout_ms: 0,
        stale_after_ms: 0,
        reconnect: ReconnectSettings {
            enabled: true,
            delay_ms: 0,
            max_delay_ms: 0,
            backoff: true,
        },
        ..ClientSettings::default()
    };
    let floor = Duration::from_millis(MIN_TIMER_MS);
    assert_eq!(settings.subscribe_timeout(), floor);
    assert_eq!(settings.connect_timeout(), floor);
    assert_eq!(settings.stale_after(), floor);
    assert_eq!(
        settings.reconnect_policy(),
        ReconnectPolicy::Backoff {
            initial: floor,
            max: floor,
        }
    );

    let fixed = ClientSettings {
        reconnect: ReconnectSettings {
            backoff: false,
            delay_ms: 0,
            ..ReconnectSettings::default()
        },
        ..ClientSettings::default()
    };
    assert_eq!(fixed.reconnect_policy(), ReconnectPolicy::Fixed(floor));
}
