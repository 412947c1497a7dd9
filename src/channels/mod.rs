//! Chat transport abstraction.
//!
//! The decision engine never talks to the chat service directly. Everything it
//! needs from the outside world is expressed by the two traits here:
//! - [`ChatClient`]: inbound message stream plus the three outbound actions
//! - [`ChatHistory`]: read access to recent channel history (owner lookup)

pub mod console;

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use console::ConsoleChannel;

/// Boxed inbound message stream.
pub type MessageStream = Pin<Box<dyn Stream<Item = ChatMessage> + Send>>;

/// A chat participant.
///
/// Two identities are the same participant iff their ids match; the display
/// name is informational and may change between messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
}

impl Identity {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Identity known only by id (e.g. parsed from a mention).
    pub fn from_id(id: u64) -> Self {
        Self {
            id,
            display_name: String::new(),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "<@{}>", self.id)
        } else {
            write!(f, "{}", self.display_name)
        }
    }
}

/// Structured attachment on a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A clickable button on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    /// Icon identifier, e.g. `kakeraY`.
    #[serde(default)]
    pub emoji: Option<String>,
}

/// One inbound chat message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author: Identity,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Component>,
    pub created_at: DateTime<Utc>,
    /// User whose slash-command produced this message, when the transport knows it.
    #[serde(default)]
    pub interaction_user: Option<Identity>,
}

impl ChatMessage {
    /// Plain text message with no attachments.
    pub fn text(
        id: u64,
        channel_id: u64,
        author: Identity,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_id,
            author,
            content: content.into(),
            embeds: Vec::new(),
            components: Vec::new(),
            created_at,
            interaction_user: None,
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_component(mut self, id: impl Into<String>, emoji: Option<&str>) -> Self {
        self.components.push(Component {
            id: id.into(),
            emoji: emoji.map(String::from),
        });
        self
    }

    pub fn with_interaction_user(mut self, user: Identity) -> Self {
        self.interaction_user = Some(user);
        self
    }

    /// Short single-line rendering for debug logs.
    pub fn summary(&self) -> String {
        let content = crate::mudae::markup::strip(&self.content);
        let preview = abbreviate(&content, 20, 20, 10);
        let preview = if preview.is_empty() {
            "<<EMPTY>>".to_string()
        } else {
            preview
        };
        format!(
            "ChatMessage(id={}, author={:?}, content={:?})",
            self.id, self.author.display_name, preview
        )
    }
}

/// Keep the head and tail of long text.
fn abbreviate(text: &str, head: usize, tail: usize, min_gap: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= head + tail + min_gap {
        return text.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{start}...{end}")
}

/// Capability to talk to the chat service.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Transport name (e.g. "discord", "console").
    fn name(&self) -> &str;

    /// The automated user this client is logged in as.
    fn self_identity(&self) -> Identity;

    /// Start receiving inbound messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send plain text to the configured channel.
    async fn send(&self, text: &str) -> Result<(), ChannelError>;

    /// Add a simple emoji reaction to a message.
    async fn add_reaction(&self, message_id: u64, emoji: &str) -> Result<(), ChannelError>;

    /// Click a button on a message.
    async fn click_component(
        &self,
        message_id: u64,
        component_id: &str,
    ) -> Result<(), ChannelError>;
}

/// Read access to channel history.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Messages with `after < created_at < before`, oldest first.
    async fn history(
        &self,
        channel_id: u64,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ChannelError>;
}
