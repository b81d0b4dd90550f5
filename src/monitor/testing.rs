//! Test doubles for the monitor: a recording messaging adapter and a scripted completer
//! that write into one shared journal, so tests can assert on ordering.

use crate::config::{AdminPolicy, MonitorConfig};
use crate::error::{CompletionError, Result};
use crate::llm::Completer;
use crate::messaging::{InboundStream, Messaging};
use crate::monitor::Monitor;
use crate::settings::PersistedToggle;
use crate::{InboundMessage, OutboundMessage, SenderProfile, UserId};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Sent {
        conversation_id: String,
        message: OutboundMessage,
    },
    Completion(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<Step>>>);

impl Journal {
    fn push(&self, step: Step) {
        self.0.lock().expect("journal lock poisoned").push(step);
    }

    pub(crate) fn steps(&self) -> Vec<Step> {
        self.0.lock().expect("journal lock poisoned").clone()
    }

    pub(crate) fn sent_to(&self, conversation: &str) -> Vec<OutboundMessage> {
        self.steps()
            .into_iter()
            .filter_map(|step| match step {
                Step::Sent {
                    conversation_id,
                    message,
                } if conversation_id == conversation => Some(message),
                _ => None,
            })
            .collect()
    }
}

pub(crate) struct RecordingAdapter {
    journal: Journal,
}

impl RecordingAdapter {
    pub(crate) fn new() -> (Self, Journal) {
        let journal = Journal::default();
        (
            Self {
                journal: journal.clone(),
            },
            journal,
        )
    }
}

impl Messaging for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<InboundStream> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, conversation_id: &str, message: OutboundMessage) -> Result<()> {
        self.journal.push(Step::Sent {
            conversation_id: conversation_id.to_string(),
            message,
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply(String),
    Fail(u16),
    /// Reply only after `release` is notified.
    Held {
        release: Arc<tokio::sync::Notify>,
        reply: String,
    },
}

pub(crate) struct ScriptedCompleter {
    journal: Journal,
    script: Script,
}

impl Completer for ScriptedCompleter {
    async fn complete(&self, user_text: &str) -> Result<String> {
        self.journal.push(Step::Completion(user_text.to_string()));
        match &self.script {
            Script::Reply(text) => Ok(text.trim().to_string()),
            Script::Held { release, reply } => {
                release.notified().await;
                Ok(reply.trim().to_string())
            }
            Script::Fail(status) => Err(CompletionError::Http {
                status: *status,
                body: "scripted failure".into(),
            }
            .into()),
        }
    }
}

pub(crate) struct Harness {
    pub(crate) monitor: Monitor<ScriptedCompleter>,
    pub(crate) journal: Journal,
    pub(crate) state_path: PathBuf,
    _dir: tempfile::TempDir,
}

pub(crate) struct HarnessBuilder {
    watched: Vec<UserId>,
    enabled: bool,
    policy: AdminPolicy,
    script: Script,
}

impl Harness {
    pub(crate) fn builder() -> HarnessBuilder {
        HarnessBuilder {
            watched: Vec::new(),
            enabled: false,
            policy: AdminPolicy::AllowList { admin: 1000 },
            script: Script::Reply(String::new()),
        }
    }

    pub(crate) fn event(conversation_id: &str, sender_id: UserId, text: &str) -> InboundMessage {
        InboundMessage {
            id: format!("{conversation_id}-{sender_id}"),
            source: "test".into(),
            conversation_id: conversation_id.into(),
            sender_id,
            sender: SenderProfile::default(),
            text: text.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub(crate) fn message(&self, sender_id: UserId, text: &str) -> InboundMessage {
        Self::event("group-1", sender_id, text)
    }

    pub(crate) fn message_in(
        &self,
        conversation_id: &str,
        sender_id: UserId,
        text: &str,
    ) -> InboundMessage {
        Self::event(conversation_id, sender_id, text)
    }

    pub(crate) fn stored_state(&self) -> serde_json::Value {
        let content = std::fs::read_to_string(&self.state_path).expect("state file should exist");
        serde_json::from_str(&content).expect("state file should be JSON")
    }
}

impl HarnessBuilder {
    pub(crate) fn watched(mut self, ids: &[UserId]) -> Self {
        self.watched = ids.to_vec();
        self
    }

    pub(crate) fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub(crate) fn policy(mut self, policy: AdminPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub(crate) fn script(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    pub(crate) fn build(self) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join(crate::settings::STATE_FILE_NAME);
        let toggle =
            Arc::new(PersistedToggle::open(&state_path, self.enabled).expect("toggle should open"));

        let config = MonitorConfig {
            enabled_by_default: self.enabled,
            watched_users: Arc::new(self.watched.into_iter().collect()),
            admin_policy: self.policy,
        };
        let (adapter, journal) = RecordingAdapter::new();
        let completer = Arc::new(ScriptedCompleter {
            journal: journal.clone(),
            script: self.script,
        });

        Harness {
            monitor: Monitor::new(&config, toggle, completer, Arc::new(adapter)),
            journal,
            state_path,
            _dir: dir,
        }
    }
}
