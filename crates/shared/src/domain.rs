use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of characters (after trimming) a display name must exceed.
pub const USERNAME_MIN_EXCLUSIVE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn is_remote(self) -> bool {
        matches!(self, Origin::Remote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    SubscribingChannel,
    Subscribed,
    Disconnected,
    Closed,
}

impl ConnectionState {
    /// States in which a transport link is expected to be up.
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::SubscribingChannel
                | ConnectionState::Subscribed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender: String,
    pub content: String,
    pub origin: Origin,
    pub show_sender_header: bool,
    pub received_at: DateTime<Utc>,
}

/// Validates a display name candidate, returning the trimmed name when accepted.
pub fn normalize_username(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.chars().count() > USERNAME_MIN_EXCLUSIVE_LEN {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_must_exceed_three_characters() {
        assert_eq!(normalize_username("bob"), None);
        assert_eq!(normalize_username("  bob   "), None);
        assert_eq!(normalize_username("alice").as_deref(), Some("alice"));
        assert_eq!(normalize_username(" dave ").as_deref(), Some("dave"));
    }

    #[test]
    fn username_length_counts_characters_not_bytes() {
        assert_eq!(normalize_username("åäö"), None);
        assert_eq!(normalize_username("åäöü").as_deref(), Some("åäöü"));
    }

    #[test]
    fn linked_states() {
        assert!(ConnectionState::Subscribed.is_linked());
        assert!(ConnectionState::SubscribingChannel.is_linked());
        assert!(!ConnectionState::Connecting.is_linked());
        assert!(!ConnectionState::Disconnected.is_linked());
    }
}
