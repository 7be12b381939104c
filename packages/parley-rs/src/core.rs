//! Core identifiers and message types.
//!
//! # Overview
//!
//! Parley separates **streams** from **payloads**:
//! - [`ChatId`] = the canonical key of a conversation stream
//! - [`Message`] = an inbound payload on that stream
//!
//! Callers usually address conversations by a [`ChatTarget`], which is either
//! a canonical id or a human-facing alias. Aliases are resolved through the
//! wrapped transport before any listener state is touched.
//!
//! # Request Records
//!
//! An outbound send produces a [`SentMessage`], the request record. When
//! `ask` succeeds, the record is attached to the matched inbound message as a
//! [`Reply`], so callers can correlate question and answer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical identifier of a conversation stream.
///
/// At most one listener can be pending per `ChatId` at any time. The id is
/// opaque to parley; the wrapped transport defines what it means (a group
/// chat, a direct-message thread, a channel).
///
/// # Example
///
/// ```ignore
/// use parley::ChatId;
///
/// let chat = ChatId::new(42);
/// assert_eq!(chat.get(), 42);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChatId(i64);

impl ChatId {
    /// Create a chat id from its canonical integer form.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner integer value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message sender.
///
/// A user's direct-message stream is keyed by the user's own id, so
/// user-scoped conveniences listen on `ChatId::new(user.get())`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(i64);

impl UserId {
    /// Create a user id from its canonical integer form.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner integer value.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The conversation key of this user's direct-message stream.
    pub const fn direct_chat(self) -> ChatId {
        ChatId::new(self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation addressed either canonically or by alias.
///
/// The client facade accepts anything convertible into a `ChatTarget`:
/// integers and [`ChatId`]s pass through without touching the transport,
/// strings are resolved through [`ChatTransport::resolve_alias`].
///
/// [`ChatTransport::resolve_alias`]: crate::ChatTransport::resolve_alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    /// Already-canonical conversation key.
    Id(ChatId),
    /// Human-facing identifier (e.g. `"@support"`); needs resolution.
    Alias(String),
}

impl From<ChatId> for ChatTarget {
    fn from(id: ChatId) -> Self {
        Self::Id(id)
    }
}

impl From<i64> for ChatTarget {
    fn from(id: i64) -> Self {
        Self::Id(ChatId::new(id))
    }
}

impl From<&str> for ChatTarget {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

impl From<String> for ChatTarget {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Alias(alias) => write!(f, "{}", alias),
        }
    }
}

/// An inbound message delivered by the event source.
///
/// This is the unit of dispatch: each message carries the conversation key
/// used for listener lookup and a payload that filters can inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// Conversation stream this message belongs to.
    pub chat: ChatId,
    /// Sender, when the transport knows one.
    pub from: Option<UserId>,
    /// Text payload.
    pub text: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Create a message on the given conversation.
    pub fn new(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat,
            from: None,
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    /// Set the sender.
    pub fn with_from(mut self, user: UserId) -> Self {
        self.from = Some(user);
        self
    }
}

/// Payload for an outbound send.
///
/// # Example
///
/// ```ignore
/// use parley::OutboundMessage;
///
/// let outbound = OutboundMessage::text("what's your order number?")
///     .silent();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Text payload.
    pub text: String,
    /// Message this one replies to, if any.
    pub reply_to: Option<Uuid>,
    /// Suppress notifications on the receiving side.
    pub silent: bool,
}

impl OutboundMessage {
    /// Create a plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
            silent: false,
        }
    }

    /// Mark this message as a reply to an earlier one.
    pub fn with_reply_to(mut self, message_id: Uuid) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    /// Suppress notifications for this message.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Request record produced by a successful send.
///
/// Owned by the caller; parley keeps no state about it beyond log lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Id assigned by the transport.
    pub id: Uuid,
    /// Conversation the message was sent to.
    pub chat: ChatId,
    /// Text that was sent.
    pub text: String,
    /// When the send completed.
    pub sent_at: DateTime<Utc>,
}

/// Result of a successful `ask`: the matched reply paired with the request
/// record of the send that prompted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The request record from the outbound send.
    pub request: SentMessage,
    /// The inbound message that answered it.
    pub message: Message,
}

impl Reply {
    /// Text of the inbound reply.
    pub fn text(&self) -> &str {
        &self.message.text
    }
}
