//! # Parley
//!
//! A reply-await layer for event-driven chat clients: callers can suspend
//! until the next matching inbound message on a conversation, instead of
//! only reacting through registered handlers.
//!
//! ## Core Concepts
//!
//! Parley separates **waiting** from **handling**:
//! - A [`ListenerRegistry`] holds at most one pending waiter per
//!   conversation key.
//! - A [`Dispatcher`] sits in front of the normal handler chain and gives
//!   the pending waiter first refusal on every inbound message.
//!
//! The key guarantee: **one `listen` call, one terminal outcome**. A waiter
//! finishes exactly once - matched, canceled, or timed out - and its slot is
//! removed exactly once, on whichever path fires first.
//!
//! ## Architecture
//!
//! ```text
//! caller ──listen/ask──► Client ──────────► ListenerRegistry
//!                          │                     ▲        │
//!                          │ send (transport)    │ resolve│ suspend caller
//!                          ▼                     │        ▼
//!                     ChatTransport         Dispatcher   oneshot cell
//!                                                ▲
//!                                                │ inbound message
//!                                          event source
//!                                                │
//!                                                ▼ fell through
//!                                          handler chain
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One waiter per key** - a second `listen` on an occupied key cancels
//!    the superseded waiter explicitly (it fails fast, it does not hang)
//! 2. **Single resolution** - match, cancel, and timeout converge on one
//!    completion cell; the first terminal transition wins
//! 3. **Identity-checked removal** - a `listen` call only ever clears the
//!    slot it installed
//! 4. **Predicate-gated matching** - a waiter resolves only on messages its
//!    filter accepts; rejected (or filter-failing) messages fall through to
//!    normal handlers
//! 5. **Dispatch never dies** - filter errors, handler errors, and handler
//!    panics are logged and contained
//!
//! ## Example
//!
//! ```ignore
//! use parley::{Client, ListenOptions, Message, OutboundMessage};
//! use std::time::Duration;
//!
//! let client = Client::new(transport);
//!
//! // Wire the dispatcher into the transport's inbound stream.
//! let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(64);
//! tokio::spawn(client.dispatcher().with_handler(MyHandler).run(inbound_rx));
//!
//! // Ask and wait for the answer on the same conversation.
//! let reply = client
//!     .ask(
//!         "@customer",
//!         OutboundMessage::text("what's your order number?"),
//!         ListenOptions::new()
//!             .with_filter(|m: &Message| m.text.chars().all(|c| c.is_ascii_digit()))
//!             .with_timeout(Duration::from_secs(30)),
//!     )
//!     .await?;
//!
//! println!("order number: {}", reply.text());
//! ```
//!
//! ## What This Is Not
//!
//! Parley is **not**:
//! - a transport (it wraps one; protocol, auth, and delivery stay outside)
//! - a serialization layer
//! - a general handler framework (it only fronts one with the interception
//!   point pending waits need)
//!
//! Parley **is**:
//! > a keyed table of pending waits, the protocol by which an inbound
//! > message resolves one or falls through, and the timeout/cancel
//! > lifecycle around it.

// Core modules
mod client;
mod core;
mod dispatch;
mod error;
mod registry;

// Message filters (used by both waiters and handlers)
pub mod filter;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core types
pub use crate::core::{
    ChatId, ChatTarget, Message, OutboundMessage, Reply, SentMessage, UserId,
};

// Re-export the client facade
pub use crate::client::{
    Chat, ChatTransport, Client, ListenOptions, User, DEFAULT_ASK_TIMEOUT,
};

// Re-export dispatch types
pub use crate::dispatch::{DispatchOutcome, Dispatcher, MessageHandler};

// Re-export error types
pub use crate::error::{ListenError, ListenResult};

// Re-export the registry
pub use crate::registry::ListenerRegistry;

// Re-export filter essentials at the crate root
pub use crate::filter::{FilterExt, MessageFilter};

// Re-export commonly used external types
pub use async_trait::async_trait;
