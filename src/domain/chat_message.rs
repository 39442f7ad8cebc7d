//! The chat message exchanged between clients.

use serde::{Deserialize, Serialize};

/// A chat message as sent by a client and carried through the broker.
///
/// Wire shape: `{"sender": "...", "recipients": ["..."], "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Identity of the sending user.
    pub sender: String,
    /// Identities of the intended recipients.
    pub recipients: Vec<String>,
    /// Message body.
    pub message: String,
}

impl ChatMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        recipients: impl IntoIterator<Item = impl Into<String>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// Recipients with duplicates removed, first occurrence wins.
    #[must_use]
    pub fn unique_recipients(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::with_capacity(self.recipients.len());
        self.recipients
            .iter()
            .map(String::as_str)
            .filter(|r| seen.insert(*r))
            .collect()
    }
}
