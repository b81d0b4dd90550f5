//! Per-message decision: toggle gate, watch-list gate, notice, completion, reply.

use crate::error::Result;
use crate::llm::Completer;
use crate::monitor::Monitor;
use crate::{InboundMessage, OutboundMessage};

/// How a plain message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Monitoring is switched off.
    Disabled,
    /// Sender is not on the watch-list.
    NotWatched,
    /// Notice sent; the completion came back empty.
    Noticed,
    /// Notice and mention reply sent.
    Replied,
}

/// Detection notice sent before asking the completion endpoint.
pub fn detection_notice(display_name: &str) -> String {
    format!("已检测到 {display_name} 正在水群，开启劝阻")
}

impl<C: Completer> Monitor<C> {
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<MessageOutcome> {
        // Read once; a concurrent toggle does not affect this event past this point.
        if !self.toggle.is_enabled() {
            return Ok(MessageOutcome::Disabled);
        }

        if !self.watched_users.contains(&message.sender_id) {
            return Ok(MessageOutcome::NotWatched);
        }

        let display_name = message.display_name();
        tracing::info!(
            conversation_id = %message.conversation_id,
            sender_id = message.sender_id,
            %display_name,
            "watched member is chatting"
        );

        self.messaging
            .send(
                &message.conversation_id,
                OutboundMessage::text(detection_notice(&display_name)),
            )
            .await?;

        let reply = self.completer.complete(&message.text).await?;
        if reply.is_empty() {
            tracing::debug!(
                conversation_id = %message.conversation_id,
                "completion returned nothing, no reply sent"
            );
            return Ok(MessageOutcome::Noticed);
        }

        self.messaging
            .send(
                &message.conversation_id,
                OutboundMessage::mention(message.sender_id).push_text(format!(" {reply}")),
            )
            .await?;

        Ok(MessageOutcome::Replied)
    }
}
