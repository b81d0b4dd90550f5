//! Console messaging adapter for local runs and piping.
//!
//! Inbound events are read as one JSON object per line from stdin:
//! `{"sender_id": 42, "card": "...", "nickname": "...", "text": "...", "conversation_id": "..."}`.
//! Outbound messages are written to stdout, one JSON object per line, with a
//! `rendered` field using OneBot CQ codes for mentions.

use crate::error::MessagingError;
use crate::messaging::traits::{InboundStream, Messaging};
use crate::{InboundMessage, OutboundMessage, Segment, SenderProfile, UserId};

use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::Mutex;
use tokio_stream::wrappers::LinesStream;

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Console adapter state.
pub struct ConsoleAdapter {
    reader: Mutex<Option<BoxedReader>>,
    writer: Mutex<BoxedWriter>,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct ConsoleEvent {
    sender_id: UserId,
    #[serde(default)]
    card: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(alias = "group_id")]
    conversation_id: ConversationKey,
}

/// Group ids arrive as numbers from OneBot and as strings from everything else.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConversationKey {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKey::Number(id) => write!(f, "{}", id),
            ConversationKey::Text(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Serialize)]
struct ConsoleOutput<'a> {
    conversation_id: &'a str,
    segments: &'a [Segment],
    rendered: String,
}

impl ConsoleAdapter {
    pub fn new(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Mutex::new(Box::new(writer)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Adapter bound to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

fn parse_line(line: &str, next_id: &AtomicU64) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let event: ConsoleEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "skipping malformed console event");
            return None;
        }
    };

    Some(InboundMessage {
        id: next_id.fetch_add(1, Ordering::Relaxed).to_string(),
        source: "console".into(),
        conversation_id: event.conversation_id.to_string().into(),
        sender_id: event.sender_id,
        sender: SenderProfile {
            card: event.card,
            nickname: event.nickname,
        },
        text: event.text,
        timestamp: chrono::Utc::now(),
    })
}

impl Messaging for ConsoleAdapter {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| MessagingError::Closed("console".into()))?;
        let next_id = self.next_id.clone();

        let stream = LinesStream::new(reader.lines()).filter_map(move |line| {
            let message = match line {
                Ok(line) => parse_line(&line, &next_id),
                Err(error) => {
                    tracing::warn!(%error, "failed to read console input line");
                    None
                }
            };
            futures::future::ready(message)
        });

        tracing::info!("console adapter started");
        Ok(Box::pin(stream))
    }

    async fn send(&self, conversation_id: &str, message: OutboundMessage) -> crate::Result<()> {
        let send_error = |error: std::io::Error| MessagingError::SendFailed {
            conversation_id: conversation_id.to_string(),
            message: error.to_string(),
        };

        let output = ConsoleOutput {
            conversation_id,
            segments: &message.segments,
            rendered: message.to_string(),
        };
        let mut line = serde_json::to_string(&output)
            .map_err(|error| anyhow::anyhow!("failed to encode console output: {error}"))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.map_err(send_error)?;
        writer.flush().await.map_err(send_error)?;
        Ok(())
    }

    async fn shutdown(&self) -> crate::Result<()> {
        self.writer.lock().await.flush().await?;
        tracing::info!("console adapter shut down");
        Ok(())
    }
}
