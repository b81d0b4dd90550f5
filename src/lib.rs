//! monitor-study: watches group chat for configured members and talks them back into studying.

pub mod config;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod monitor;
pub mod settings;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Chat account identifier (QQ number on OneBot transports).
pub type UserId = i64;

/// Conversation (group) identifier type.
pub type ConversationId = Arc<str>;

/// Sender profile as reported by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderProfile {
    /// Group card (per-group nickname), if set.
    pub card: Option<String>,
    /// Account nickname.
    pub nickname: Option<String>,
}

/// Inbound message from a messaging adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub source: String,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender: SenderProfile,
    /// Plain-text rendering of the message; non-text segments are dropped by the adapter.
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    /// Name used when addressing the sender: group card, then nickname, then the raw id.
    ///
    /// The first non-empty of card and nickname is picked before trimming, so a
    /// card of only spaces hides the nickname and falls through to the id.
    pub fn display_name(&self) -> String {
        let name = [self.sender.card.as_deref(), self.sender.nickname.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .map(str::trim)
            .unwrap_or_default();

        if name.is_empty() {
            self.sender_id.to_string()
        } else {
            name.to_string()
        }
    }
}

/// A single piece of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Mention { user_id: UserId },
}

/// Outbound message to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub segments: Vec<Segment>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Text { text: text.into() }],
        }
    }

    pub fn mention(user_id: UserId) -> Self {
        Self {
            segments: vec![Segment::Mention { user_id }],
        }
    }

    /// Append a text segment.
    pub fn push_text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::Text { text: text.into() });
        self
    }

    /// Whether the message mentions the given user anywhere.
    pub fn mentions(&self, user_id: UserId) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Mention { user_id: id } if *id == user_id))
    }

    /// Concatenated text of all text segments.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text { text } => Some(text.as_str()),
                Segment::Mention { .. } => None,
            })
            .collect()
    }
}

impl std::fmt::Display for OutboundMessage {
    /// Renders mentions as OneBot CQ codes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text { text } => write!(f, "{}", text)?,
                Segment::Mention { user_id } => write!(f, "[CQ:at,qq={}]", user_id)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_from(card: Option<&str>, nickname: Option<&str>) -> InboundMessage {
        InboundMessage {
            id: "1".into(),
            source: "test".into(),
            conversation_id: "group-1".into(),
            sender_id: 42,
            sender: SenderProfile {
                card: card.map(str::to_string),
                nickname: nickname.map(str::to_string),
            },
            text: "hi".into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn display_name_prefers_card_then_nickname_then_id() {
        assert_eq!(message_from(Some("班长"), Some("nick")).display_name(), "班长");
        assert_eq!(message_from(None, Some("nick")).display_name(), "nick");
        assert_eq!(message_from(Some(" 班长 "), Some("nick")).display_name(), "班长");
        assert_eq!(message_from(Some(""), Some(" nick ")).display_name(), "nick");
        assert_eq!(message_from(None, None).display_name(), "42");
        assert_eq!(message_from(Some(""), Some("")).display_name(), "42");
    }

    #[test]
    fn blank_card_falls_through_to_id_not_nickname() {
        assert_eq!(message_from(Some("  "), Some("nick")).display_name(), "42");
    }

    #[test]
    fn renders_mentions_as_cq_codes() {
        let message = OutboundMessage::mention(42).push_text(" 去学习");

        assert_eq!(message.to_string(), "[CQ:at,qq=42] 去学习");
        assert_eq!(message.plain_text(), " 去学习");
        assert!(message.mentions(42));
        assert!(!message.mentions(7));
    }
}
