//! Console channel: stdin/stdout transport for dry runs.
//!
//! Reads one JSON-encoded [`ChatMessage`] per stdin line and prints every
//! outbound action to stdout instead of touching a real chat service. Sent
//! text is echoed back into the inbound stream, the same way a chat service
//! echoes the bot's own messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{ChatClient, ChatHistory, ChatMessage, Identity, MessageStream};
use crate::error::ChannelError;

/// Ids for echoed messages start high so they never collide with replayed input.
const ECHO_ID_BASE: u64 = 1 << 62;

/// Maximum number of messages kept for history lookups.
const HISTORY_LIMIT: usize = 500;

pub struct ConsoleChannel {
    me: Identity,
    channel_id: u64,
    seen: Arc<RwLock<Vec<ChatMessage>>>,
    echo_tx: RwLock<Option<mpsc::UnboundedSender<ChatMessage>>>,
    next_echo_id: AtomicU64,
}

impl ConsoleChannel {
    pub fn new(me: Identity, channel_id: u64) -> Self {
        Self {
            me,
            channel_id,
            seen: Arc::new(RwLock::new(Vec::new())),
            echo_tx: RwLock::new(None),
            next_echo_id: AtomicU64::new(ECHO_ID_BASE),
        }
    }

    fn emit(&self, line: &str) {
        println!("{line}");
        tracing::debug!(action = %line, "Console action");
    }
}

async fn remember(seen: &RwLock<Vec<ChatMessage>>, msg: &ChatMessage) {
    let mut seen = seen.write().await;
    seen.push(msg.clone());
    if seen.len() > HISTORY_LIMIT {
        let overflow = seen.len() - HISTORY_LIMIT;
        seen.drain(..overflow);
    }
}

#[async_trait]
impl ChatClient for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn self_identity(&self) -> Identity {
        self.me.clone()
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.echo_tx.write().await = Some(tx.clone());

        let seen = Arc::clone(&self.seen);
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let msg: ChatMessage = match serde_json::from_str(line) {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping malformed console input");
                                continue;
                            }
                        };
                        remember(&seen, &msg).await;
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.emit(&format!("SEND {text}"));

        let echo = ChatMessage::text(
            self.next_echo_id.fetch_add(1, Ordering::Relaxed),
            self.channel_id,
            self.me.clone(),
            text,
            Utc::now(),
        );
        remember(&self.seen, &echo).await;
        if let Some(tx) = self.echo_tx.read().await.as_ref() {
            // Receiver gone means the session is shutting down.
            let _ = tx.send(echo);
        }
        Ok(())
    }

    async fn add_reaction(&self, message_id: u64, emoji: &str) -> Result<(), ChannelError> {
        self.emit(&format!("REACT {message_id} {emoji}"));
        Ok(())
    }

    async fn click_component(
        &self,
        message_id: u64,
        component_id: &str,
    ) -> Result<(), ChannelError> {
        self.emit(&format!("CLICK {message_id} {component_id}"));
        Ok(())
    }
}

#[async_trait]
impl ChatHistory for ConsoleChannel {
    async fn history(
        &self,
        channel_id: u64,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ChannelError> {
        let seen = self.seen.read().await;
        let mut found: Vec<ChatMessage> = seen
            .iter()
            .filter(|m| m.channel_id == channel_id && m.created_at > after && m.created_at < before)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }
}
