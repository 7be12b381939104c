//! The listener registry: a keyed table of pending waiters.
//!
//! This is the heart of parley. Each conversation key holds at most one
//! pending [`Waiter`]; an inbound message either completes that waiter or
//! falls through to normal handler dispatch.
//!
//! # Lifecycle
//!
//! A waiter is created by [`ListenerRegistry::listen`] and terminates exactly
//! once, through one of three paths:
//! - **matched**: [`ListenerRegistry::resolve`] fed it an accepted message
//! - **canceled**: [`ListenerRegistry::cancel`] fired, or a later `listen`
//!   on the same key superseded it
//! - **timed out**: the caller's deadline expired
//!
//! Whichever path fires first wins; the others become no-ops. The slot is
//! removed on every exit path by an identity-checked guard, so a guard never
//! evicts a waiter installed by a later `listen` call.
//!
//! # Occupied Keys
//!
//! A second `listen` on a key with a pending waiter does not silently
//! orphan the first caller. The superseded waiter is completed with
//! `Canceled` before the new one is installed, so the first caller fails
//! fast instead of hanging to its own deadline.
//!
//! # Concurrency
//!
//! The key→waiter map is the only shared mutable state. All terminal
//! transitions go through `DashMap::remove`/`remove_if`, which is the atomic
//! check-and-set that keeps `resolve`, `cancel`, and guard removal from
//! racing on the same slot. The completion cell is a oneshot channel: the
//! sender leaves the map exactly once, so double resolution is impossible
//! by construction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{ChatId, Message};
use crate::error::ListenError;
use crate::filter::MessageFilter;

/// Identity of a single `listen` call.
///
/// Used to guard removals: a slot is only cleared by the call that installed
/// its current occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterToken(Uuid);

impl WaiterToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WaiterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome delivered through a waiter's completion cell.
///
/// Timeouts are not represented here: the deadline lives at the receiving
/// end of the cell, inside `listen`.
enum WaiterOutcome {
    Matched(Message),
    Canceled,
}

/// A single pending wait on one conversation key.
struct Waiter {
    token: WaiterToken,
    filter: Option<Arc<dyn MessageFilter>>,
    tx: oneshot::Sender<WaiterOutcome>,
    registered_at: DateTime<Utc>,
}

/// Keyed table of pending waiters, one slot per conversation.
///
/// Owned by the client facade and shared with dispatchers by `Arc` - there
/// is no process-global state.
#[derive(Default)]
pub struct ListenerRegistry {
    slots: DashMap<ChatId, Waiter>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Suspend until the next accepted message on `chat`.
    ///
    /// Installs a waiter for `chat`, superseding (and canceling) any waiter
    /// already pending there, then blocks the calling task until the waiter
    /// is matched, canceled, or the deadline expires. `timeout: None` or a
    /// zero duration means wait indefinitely.
    ///
    /// The slot is removed on every exit path - normal return, timeout,
    /// cancellation, or the caller's task being dropped - but only while it
    /// still holds this call's waiter.
    pub async fn listen(
        &self,
        chat: ChatId,
        filter: Option<Arc<dyn MessageFilter>>,
        timeout: Option<Duration>,
    ) -> Result<Message, ListenError> {
        let token = WaiterToken::new();
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            token,
            filter,
            tx,
            registered_at: Utc::now(),
        };

        if let Some(previous) = self.slots.insert(chat, waiter) {
            warn!(
                %chat,
                superseded = %previous.token,
                "superseding pending listener"
            );
            let _ = previous.tx.send(WaiterOutcome::Canceled);
        }
        debug!(%chat, %token, "listener registered");

        let _cleanup = RemovalGuard {
            registry: self,
            chat,
            token,
        };

        let received = match timeout.filter(|deadline| !deadline.is_zero()) {
            Some(deadline) => match time::timeout(deadline, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(%chat, %token, "listener timed out");
                    return Err(ListenError::TimedOut { waited: deadline });
                }
            },
            None => rx.await,
        };

        match received {
            Ok(WaiterOutcome::Matched(message)) => Ok(message),
            // A dropped sender means the registry went away; treat it the
            // same as an explicit cancel.
            Ok(WaiterOutcome::Canceled) | Err(_) => Err(ListenError::Canceled),
        }
    }

    /// Offer `message` to the waiter pending on `chat`, if any.
    ///
    /// Returns `true` when a waiter consumed the message. Returns `false` -
    /// and leaves the waiter untouched - when there is no waiter, the
    /// waiter's filter rejects the message, the filter errors (logged,
    /// treated as rejection), or the waiter already reached a terminal
    /// state. Callers fall through to normal handler dispatch on `false`.
    ///
    /// Safe to call concurrently with `listen` and `cancel` on the same key.
    pub async fn resolve(&self, chat: ChatId, message: Message) -> bool {
        // Snapshot the pending waiter; the filter must not be evaluated
        // while a map shard is locked.
        let (token, filter) = match self.slots.get(&chat) {
            None => return false,
            Some(entry) => {
                if entry.tx.is_closed() {
                    // The listening task is gone (aborted or dropped) but
                    // its guard never ran. Clear the stale slot and let the
                    // message reach normal handlers.
                    let token = entry.token;
                    drop(entry);
                    self.remove(chat, token);
                    debug!(%chat, "cleared stale listener slot");
                    return false;
                }
                (entry.token, entry.filter.clone())
            }
        };

        if let Some(filter) = filter {
            match filter.accepts(&message).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(error) => {
                    warn!(
                        %chat,
                        error = %error,
                        "listener filter failed; message falls through"
                    );
                    return false;
                }
            }
        }

        self.complete(chat, token, message)
    }

    /// Cancel the waiter pending on `chat`.
    ///
    /// The waiting caller observes [`ListenError::Canceled`]. Returns `true`
    /// when a live waiter was canceled; a missing or already-terminal waiter
    /// makes this a no-op returning `false`.
    pub fn cancel(&self, chat: ChatId) -> bool {
        match self.slots.remove(&chat) {
            Some((_, waiter)) => {
                debug!(%chat, token = %waiter.token, "listener canceled");
                waiter.tx.send(WaiterOutcome::Canceled).is_ok()
            }
            None => false,
        }
    }

    /// Returns true if a waiter is currently registered for `chat`.
    pub fn is_listening(&self, chat: ChatId) -> bool {
        self.slots.contains_key(&chat)
    }

    /// Number of conversations with a pending waiter.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// When the waiter pending on `chat` was registered, if any.
    pub fn listening_since(&self, chat: ChatId) -> Option<DateTime<Utc>> {
        self.slots.get(&chat).map(|entry| entry.registered_at)
    }

    /// Identity-guarded removal: clears the slot for `chat` only while it
    /// still holds the waiter identified by `token`. Idempotent.
    fn remove(&self, chat: ChatId, token: WaiterToken) {
        self.slots
            .remove_if(&chat, |_, waiter| waiter.token == token);
    }

    /// Final step of resolution: take the waiter out of the map (identity
    /// checked) and feed it the message. A send into a dropped receiver
    /// means the caller already gave up; report "not consumed" so the
    /// message still reaches normal handlers.
    fn complete(&self, chat: ChatId, token: WaiterToken, message: Message) -> bool {
        match self.slots.remove_if(&chat, |_, waiter| waiter.token == token) {
            Some((_, waiter)) => {
                let consumed = waiter.tx.send(WaiterOutcome::Matched(message)).is_ok();
                if consumed {
                    debug!(%chat, %token, "listener resolved");
                }
                consumed
            }
            None => false,
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("pending_count", &self.slots.len())
            .finish()
    }
}

/// Removes a waiter's slot on drop, identity-checked.
///
/// Held across the suspension inside `listen` so the slot is cleared on
/// every exit path, including the listening task being dropped mid-await.
struct RemovalGuard<'a> {
    registry: &'a ListenerRegistry,
    chat: ChatId,
    token: WaiterToken,
}

impl Drop for RemovalGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.chat, self.token);
    }
}
