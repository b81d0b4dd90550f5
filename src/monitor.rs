//! Monitoring pipeline: command routing, the two gates, and the completion round trip.
//!
//! Every inbound event runs as its own task. The persisted toggle is the only
//! state shared between them.

pub mod auth;
pub mod commands;
pub mod engine;
#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthorizationGate;
pub use commands::{AdminCommand, CommandOutcome};
pub use engine::MessageOutcome;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::llm::Completer;
use crate::messaging::{InboundStream, MessagingDyn};
use crate::settings::PersistedToggle;
use crate::{InboundMessage, UserId};

use futures::StreamExt as _;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Message(MessageOutcome),
    Command(CommandOutcome),
}

/// The monitoring service. Cheap to clone; all fields are shared.
pub struct Monitor<C: Completer> {
    toggle: Arc<PersistedToggle>,
    watched_users: Arc<HashSet<UserId>>,
    gate: AuthorizationGate,
    completer: Arc<C>,
    messaging: Arc<dyn MessagingDyn>,
}

impl<C: Completer> Clone for Monitor<C> {
    fn clone(&self) -> Self {
        Self {
            toggle: self.toggle.clone(),
            watched_users: self.watched_users.clone(),
            gate: self.gate.clone(),
            completer: self.completer.clone(),
            messaging: self.messaging.clone(),
        }
    }
}

impl<C: Completer> Monitor<C> {
    pub fn new(
        config: &MonitorConfig,
        toggle: Arc<PersistedToggle>,
        completer: Arc<C>,
        messaging: Arc<dyn MessagingDyn>,
    ) -> Self {
        Self {
            toggle,
            watched_users: config.watched_users.clone(),
            gate: AuthorizationGate::new(config.admin_policy, config.watched_users.clone()),
            completer,
            messaging,
        }
    }

    pub fn toggle(&self) -> &PersistedToggle {
        &self.toggle
    }

    /// Route one event: admin commands go to the command handler, everything
    /// else through the monitoring gates.
    pub async fn handle(&self, message: InboundMessage) -> Result<Outcome> {
        match AdminCommand::parse(&message.text) {
            Some(command) => self
                .handle_command(&message, command)
                .await
                .map(Outcome::Command),
            None => self.handle_message(&message).await.map(Outcome::Message),
        }
    }

    /// Consume the inbound stream until it ends, one task per event. Waits for
    /// in-flight events before returning.
    pub async fn run(&self, mut inbound: InboundStream) -> Result<()> {
        tracing::info!(
            adapter = self.messaging.name(),
            watched = self.watched_users.len(),
            enabled = self.toggle.is_enabled(),
            "monitor started"
        );

        let mut tasks = JoinSet::new();
        while let Some(message) = inbound.next().await {
            // Reap finished tasks so the set does not grow with uptime.
            while let Some(result) = tasks.try_join_next() {
                log_join_result(result);
            }

            let monitor = self.clone();
            tasks.spawn(async move { monitor.dispatch(message).await });
        }

        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }

        tracing::info!("monitor stopped");
        Ok(())
    }

    async fn dispatch(&self, message: InboundMessage) {
        let conversation_id = message.conversation_id.clone();
        let sender_id = message.sender_id;
        let message_id = message.id.clone();

        match self.handle(message).await {
            Ok(outcome) => {
                tracing::debug!(%conversation_id, sender_id, %message_id, ?outcome, "event handled");
            }
            Err(error) => {
                tracing::error!(%error, %conversation_id, sender_id, %message_id, "error handling event");
            }
        }
    }
}

fn log_join_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        tracing::error!(%error, "event task failed");
    }
}
