//! Conversation Store
//!
//! The ordered, in-memory transcript that drives the visible conversation.
//! The store exclusively owns [`ChatMessage`] records: messages are appended,
//! mutated in place by id while a reply streams in, and only ever removed by a
//! wholesale [`ConversationStore::clear`].

use serde::Serialize;

use crate::messages::{ChatMessage, MessageId, MessageRole, MessageStatus};

/// A condensed prior turn sent along with a new request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Who authored the turn
    pub role: MessageRole,
    /// Plain-text preview, truncated
    pub content: String,
}

/// Ordered transcript of exchanged messages
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    messages: Vec<ChatMessage>,
    /// Message currently receiving streamed content (if any)
    in_flight: Option<MessageId>,
}

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id
    pub fn push(&mut self, message: ChatMessage) -> MessageId {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Append an empty assistant message that streamed content will fill
    pub fn start_placeholder(&mut self) -> MessageId {
        let id = self.push(ChatMessage::placeholder());
        self.in_flight = Some(id.clone());
        id
    }

    /// Mutate a message in place by id
    pub fn update<F>(&mut self, id: &MessageId, f: F) -> Option<&ChatMessage>
    where
        F: FnOnce(&mut ChatMessage),
    {
        let msg = self.messages.iter_mut().find(|m| &m.id == id)?;
        f(msg);
        Some(&*msg)
    }

    /// Mark the in-flight placeholder as settled
    pub fn finish_in_flight(&mut self, id: &MessageId) {
        if self.in_flight.as_ref() == Some(id) {
            self.in_flight = None;
        }
    }

    /// Id of the message currently receiving streamed content
    #[must_use]
    pub fn in_flight(&self) -> Option<&MessageId> {
        self.in_flight.as_ref()
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Get all messages in order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }

    /// Last `limit` delivered turns, condensed for the outbound request
    ///
    /// Skips system messages, messages that ended in error, placeholders still
    /// waiting for content, and the message with id `exclude` (the turn being
    /// sent right now).
    #[must_use]
    pub fn history(
        &self,
        limit: usize,
        preview_chars: usize,
        exclude: Option<&MessageId>,
    ) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.role != MessageRole::System)
            .filter(|m| m.status != Some(MessageStatus::Error))
            .filter(|m| Some(&m.id) != exclude && Some(&m.id) != self.in_flight.as_ref())
            .filter(|m| !m.is_empty())
            .take(limit)
            .map(|m| HistoryEntry {
                role: m.role,
                content: truncate_preview(&m.plain_text(), preview_chars),
            })
            .collect();
        entries.reverse();
        entries
    }
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis
#[must_use]
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ContentType, Locale};
    use pretty_assertions::assert_eq;

    fn answered(text: &str) -> ChatMessage {
        ChatMessage::notice(text, Locale::En, MessageStatus::Success)
    }

    #[test]
    fn test_push_and_get() {
        let mut store = ConversationStore::new();
        let id = store.push(ChatMessage::user("hello", Locale::En));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().plain_text(), "hello");
    }

    #[test]
    fn test_placeholder_updated_in_place() {
        let mut store = ConversationStore::new();
        store.push(ChatMessage::user("price?", Locale::En));
        let id = store.start_placeholder();
        assert_eq!(store.in_flight(), Some(&id));

        store.update(&id, |m| {
            m.set_sections(
                Locale::En,
                vec![crate::messages::ChatSection::text("120 GEL")],
                ContentType::Text,
            );
        });
        store.finish_in_flight(&id);

        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[1].plain_text(), "120 GEL");
        assert!(store.in_flight().is_none());
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let mut store = ConversationStore::new();
        assert!(store.update(&MessageId::new(), |_| {}).is_none());
    }

    #[test]
    fn test_history_bounded_and_filtered() {
        let mut store = ConversationStore::new();
        for i in 0..5 {
            let mut user = ChatMessage::user(&format!("question {i}"), Locale::En);
            user.status = Some(MessageStatus::Success);
            store.push(user);
            store.push(answered(&format!("answer {i}")));
        }
        store.push(ChatMessage::notice("blocked", Locale::En, MessageStatus::Error));
        let mut system = answered("system note");
        system.role = MessageRole::System;
        store.push(system);

        let history = store.history(4, 100, None);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "question 3");
        assert_eq!(history[3].content, "answer 4");
        assert!(history.iter().all(|h| h.role != MessageRole::System));
    }

    #[test]
    fn test_history_excludes_current_turn_and_placeholder() {
        let mut store = ConversationStore::new();
        store.push(answered("earlier"));
        let current = store.push(ChatMessage::user("now", Locale::En));
        store.start_placeholder();

        let history = store.history(6, 100, Some(&current));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "earlier");
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 10), "short");
        assert_eq!(truncate_preview("a  b\n\nc", 10), "a b c");
        assert_eq!(truncate_preview("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_preview("სასტუმრო", 4), "სას…");
    }

    #[test]
    fn test_store_only_grows_until_cleared() {
        let mut store = ConversationStore::new();
        let first = store.push(answered("first"));
        for i in 0..500 {
            store.push(answered(&format!("turn {i}")));
        }
        store.start_placeholder();

        assert_eq!(store.len(), 502);
        assert_eq!(store.messages()[0].id, first);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = ConversationStore::new();
        store.push(answered("one"));
        store.start_placeholder();
        store.clear();
        assert!(store.is_empty());
        assert!(store.in_flight().is_none());
    }
}
