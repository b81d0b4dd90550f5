//! Admin commands that switch monitoring on and off.

use crate::error::Result;
use crate::llm::Completer;
use crate::monitor::Monitor;
use crate::{InboundMessage, OutboundMessage};

pub const ENABLE_COMMAND: &str = "开启劝阻群友插件";
pub const DISABLE_COMMAND: &str = "关闭劝阻群友插件";

/// Optional command-start character, as in `/开启劝阻群友插件`.
const COMMAND_START: char = '/';

/// Sent instead of the confirmation when the new state could not be saved.
const PERSIST_FAILED_NOTICE: &str = "监控状态已切换，但保存失败";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Enable,
    Disable,
}

/// How an admin command was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Toggle set, saved, and confirmed.
    Applied { enabled: bool },
    /// Actor failed the authorization gate; nothing was changed or sent.
    Unauthorized,
    /// Toggle set in memory but the save failed.
    PersistFailed { enabled: bool },
}

impl AdminCommand {
    /// Recognize a command. The command word may carry a leading `/` and
    /// trailing arguments, which are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let body = text.strip_prefix(COMMAND_START).unwrap_or(text);

        [(ENABLE_COMMAND, Self::Enable), (DISABLE_COMMAND, Self::Disable)]
            .into_iter()
            .find_map(|(word, command)| {
                let rest = body.strip_prefix(word)?;
                (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(command)
            })
    }

    /// Toggle value this command sets.
    pub fn target_state(self) -> bool {
        matches!(self, Self::Enable)
    }

    pub fn confirmation(self) -> &'static str {
        match self {
            Self::Enable => "已开启监控",
            Self::Disable => "已关闭监控",
        }
    }
}

impl<C: Completer> Monitor<C> {
    pub async fn handle_command(
        &self,
        message: &InboundMessage,
        command: AdminCommand,
    ) -> Result<CommandOutcome> {
        if !self.gate.is_authorized(message.sender_id) {
            tracing::debug!(
                sender_id = message.sender_id,
                ?command,
                "ignoring admin command from unauthorized sender"
            );
            return Ok(CommandOutcome::Unauthorized);
        }

        let enabled = command.target_state();
        let (outcome, reply) = match self.toggle.set(enabled).await {
            Ok(()) => {
                tracing::info!(
                    sender_id = message.sender_id,
                    enabled,
                    "monitoring toggled"
                );
                (CommandOutcome::Applied { enabled }, command.confirmation())
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    sender_id = message.sender_id,
                    enabled,
                    "monitoring toggled but the state file was not saved"
                );
                (CommandOutcome::PersistFailed { enabled }, PERSIST_FAILED_NOTICE)
            }
        };

        self.messaging
            .send(&message.conversation_id, OutboundMessage::text(reply))
            .await?;

        Ok(outcome)
    }
}
