use std::sync::Arc;

use chrono::Utc;
use shared::domain::{ChatEntry, Origin};

/// Receipt-ordered, append-only message history for one session.
///
/// Clones share storage, so handing the log to watchers is O(1). An append
/// copies the entries once if some watcher still holds an older snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatLog {
    entries: Arc<Vec<ChatEntry>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Local entries always show the sender header; a remote
    /// entry shows it only when the most recent entry (of any origin) came from
    /// someone else.
    pub fn append(
        &mut self,
        sender: impl Into<String>,
        content: impl Into<String>,
        remote: bool,
    ) -> &ChatEntry {
        let sender = sender.into();
        let show_sender_header = !remote
            || self
                .entries
                .last()
                .map_or(true, |previous| previous.sender != sender);
        let entries = Arc::make_mut(&mut self.entries);
        entries.push(ChatEntry {
            sender,
            content: content.into(),
            origin: if remote { Origin::Remote } else { Origin::Local },
            show_sender_header,
            received_at: Utc::now(),
        });
        &entries[entries.len() - 1]
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ChatLog {
    type Item = &'a ChatEntry;
    type IntoIter = std::slice::Iter<'a, ChatEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "tests/chat_log_tests.rs"]
mod tests;
