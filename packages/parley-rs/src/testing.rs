//! Testing utilities: in-memory fakes for the transport and handlers.
//!
//! This module is available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! parley = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use parley::testing::{MemoryTransport, RecordingHandler};
//! use parley::{Client, ChatId};
//!
//! let transport = MemoryTransport::new().with_alias("@support", ChatId::new(7));
//! let client = Client::new(transport);
//!
//! // ... drive the client, then assert on what was sent:
//! assert_eq!(client.transport().sent_count(), 1);
//! client.transport().assert_sent_to(ChatId::new(7));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::client::ChatTransport;
use crate::core::{ChatId, Message, OutboundMessage, SentMessage};
use crate::dispatch::MessageHandler;

/// In-memory [`ChatTransport`] that records sends for test assertions.
///
/// Sends do NOT produce inbound messages - this transport only records them.
/// Drive inbound flow explicitly through the registry or a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    aliases: Arc<Mutex<HashMap<String, ChatId>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    send_error: Arc<Mutex<Option<String>>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style alias registration.
    pub fn with_alias(self, alias: impl Into<String>, chat: ChatId) -> Self {
        self.register_alias(alias, chat);
        self
    }

    /// Register an alias after construction.
    pub fn register_alias(&self, alias: impl Into<String>, chat: ChatId) {
        self.aliases.lock().unwrap().insert(alias.into(), chat);
    }

    /// Make every subsequent send fail with the given message.
    pub fn fail_sends_with(&self, message: impl Into<String>) {
        *self.send_error.lock().unwrap() = Some(message.into());
    }

    /// Let sends succeed again.
    pub fn clear_send_failure(&self) {
        *self.send_error.lock().unwrap() = None;
    }

    /// All recorded sends, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of recorded sends.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// The most recent send, if any.
    pub fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Assert at least one message was sent to `chat`.
    ///
    /// # Panics
    ///
    /// Panics if no send to `chat` was recorded.
    pub fn assert_sent_to(&self, chat: ChatId) {
        let sent = self.sent.lock().unwrap();
        assert!(
            sent.iter().any(|s| s.chat == chat),
            "expected a send to chat {}, recorded sends: {:?}",
            chat,
            sent.iter().map(|s| s.chat).collect::<Vec<_>>()
        );
    }

    /// Clear all recorded sends.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn resolve_alias(&self, alias: &str) -> Result<ChatId> {
        self.aliases
            .lock()
            .unwrap()
            .get(alias)
            .copied()
            .ok_or_else(|| anyhow!("unknown chat alias: {alias}"))
    }

    async fn send_message(
        &self,
        chat: ChatId,
        outbound: OutboundMessage,
    ) -> Result<SentMessage> {
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        let sent = SentMessage {
            id: Uuid::new_v4(),
            chat,
            text: outbound.text,
            sent_at: Utc::now(),
        };
        self.sent.lock().unwrap().push(sent.clone());
        Ok(sent)
    }
}

/// [`MessageHandler`] that records every message it handles.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl RecordingHandler {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All handled messages, in order.
    pub fn seen(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of handled messages.
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Clear the record.
    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }

    /// Assert a handled message had exactly this text.
    ///
    /// # Panics
    ///
    /// Panics if no handled message matches.
    pub fn assert_saw_text(&self, text: &str) {
        let seen = self.seen.lock().unwrap();
        assert!(
            seen.iter().any(|m| m.text == text),
            "expected a handled message with text '{}', saw: {:?}",
            text,
            seen.iter().map(|m| m.text.as_str()).collect::<Vec<_>>()
        );
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) -> Result<()> {
        self.seen.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_resolves_known_alias() {
        let transport = MemoryTransport::new().with_alias("@ops", ChatId::new(3));
        let chat = transport.resolve_alias("@ops").await.unwrap();
        assert_eq!(chat, ChatId::new(3));
    }

    #[tokio::test]
    async fn test_memory_transport_unknown_alias_errors() {
        let transport = MemoryTransport::new();
        let result = transport.resolve_alias("@missing").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("@missing"));
    }

    #[tokio::test]
    async fn test_memory_transport_records_sends() {
        let transport = MemoryTransport::new();
        let sent = transport
            .send_message(ChatId::new(1), OutboundMessage::text("hello"))
            .await
            .unwrap();

        assert_eq!(sent.chat, ChatId::new(1));
        assert_eq!(sent.text, "hello");
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.last_sent().unwrap().id, sent.id);
        transport.assert_sent_to(ChatId::new(1));
    }

    #[tokio::test]
    async fn test_memory_transport_send_failure_toggle() {
        let transport = MemoryTransport::new();
        transport.fail_sends_with("boom");

        let result = transport
            .send_message(ChatId::new(1), OutboundMessage::text("x"))
            .await;
        assert!(result.is_err());
        assert_eq!(transport.sent_count(), 0);

        transport.clear_send_failure();
        assert!(transport
            .send_message(ChatId::new(1), OutboundMessage::text("x"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_memory_transport_clone_shares_state() {
        let transport = MemoryTransport::new();
        let other = transport.clone();

        other
            .send_message(ChatId::new(2), OutboundMessage::text("shared"))
            .await
            .unwrap();

        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_recording_handler() {
        let handler = RecordingHandler::new();
        handler
            .handle(&Message::new(ChatId::new(1), "one"))
            .await
            .unwrap();
        handler
            .handle(&Message::new(ChatId::new(1), "two"))
            .await
            .unwrap();

        assert_eq!(handler.count(), 2);
        handler.assert_saw_text("one");
        handler.assert_saw_text("two");

        handler.clear();
        assert_eq!(handler.count(), 0);
    }
}
