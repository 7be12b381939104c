//! Client facade: listen/ask conveniences over an external chat transport.
//!
//! The facade composes two things:
//! - the **transport** (the external message client): resolves aliases and
//!   performs outbound sends
//! - the **registry**: the keyed table of pending waiters
//!
//! It owns the registry instance - there is no ambient global table - and
//! hands it to dispatchers by `Arc`. The facade wraps the external client by
//! composition; nothing is patched into it.
//!
//! # Example
//!
//! ```ignore
//! use parley::{Client, ListenOptions, OutboundMessage};
//! use std::time::Duration;
//!
//! let client = Client::new(transport);
//!
//! // send a question, wait up to 30s for the answer on the same chat
//! let reply = client
//!     .ask(
//!         "@customer",
//!         OutboundMessage::text("what's your order number?"),
//!         ListenOptions::new().with_timeout(Duration::from_secs(30)),
//!     )
//!     .await?;
//! println!("order: {} (asked in {})", reply.text(), reply.request.id);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::{ChatId, ChatTarget, Message, OutboundMessage, Reply, SentMessage, UserId};
use crate::dispatch::Dispatcher;
use crate::error::ListenError;
use crate::filter::MessageFilter;
use crate::registry::ListenerRegistry;

/// Default deadline for `ask` and `listen_or_none` when the caller does not
/// set one.
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(119);

/// The external message client the facade wraps.
///
/// Parley only needs two operations from it: mapping a human-facing alias to
/// a canonical conversation key, and performing an outbound send that yields
/// a request record. Everything else about the transport (protocol,
/// authentication, delivery) is its own business.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Resolve a human-facing alias to a canonical conversation key.
    async fn resolve_alias(&self, alias: &str) -> Result<ChatId>;

    /// Send a message, returning the request record.
    async fn send_message(&self, chat: ChatId, outbound: OutboundMessage)
        -> Result<SentMessage>;
}

/// Per-wait options: an optional match filter and an optional deadline.
///
/// ```ignore
/// let opts = ListenOptions::new()
///     .with_filter(|m: &Message| m.text.starts_with("order "))
///     .with_timeout(Duration::from_secs(30));
/// ```
#[derive(Clone, Default)]
pub struct ListenOptions {
    filter: Option<Arc<dyn MessageFilter>>,
    timeout: Option<Duration>,
}

impl ListenOptions {
    /// No filter, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only messages the filter accepts resolve the wait.
    pub fn with_filter(mut self, filter: impl MessageFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Reuse an already-shared filter.
    pub fn with_shared_filter(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Fail with `TimedOut` if no match arrives within `timeout`.
    ///
    /// Without this, `listen` waits indefinitely while `ask` and
    /// `listen_or_none` fall back to [`DEFAULT_ASK_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ListenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenOptions")
            .field("has_filter", &self.filter.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Facade over an external chat transport with reply-await conveniences.
///
/// Cheap to clone: clones share the transport and the listener registry.
pub struct Client<T> {
    transport: Arc<T>,
    registry: Arc<ListenerRegistry>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: ChatTransport> Client<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Wrap an already-shared transport.
    pub fn from_arc(transport: Arc<T>) -> Self {
        Self {
            transport,
            registry: Arc::new(ListenerRegistry::new()),
        }
    }

    /// The listener registry this client owns.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// A dispatcher wired to this client's registry. Register handlers on
    /// it and feed it the transport's inbound messages.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.registry.clone())
    }

    async fn resolve(&self, target: ChatTarget) -> Result<ChatId, ListenError> {
        match target {
            ChatTarget::Id(id) => Ok(id),
            ChatTarget::Alias(alias) => self
                .transport
                .resolve_alias(&alias)
                .await
                .map_err(|source| ListenError::Resolution {
                    target: alias,
                    source,
                }),
        }
    }

    /// Suspend until the next matching message on `target`.
    ///
    /// Without a timeout in `opts`, waits indefinitely.
    pub async fn listen(
        &self,
        target: impl Into<ChatTarget>,
        opts: ListenOptions,
    ) -> Result<Message, ListenError> {
        let chat = self.resolve(target.into()).await?;
        self.registry.listen(chat, opts.filter, opts.timeout).await
    }

    /// Send a message, then wait for the next matching message on the same
    /// conversation; the reply carries the request record of the send.
    ///
    /// The send happens first: a send failure surfaces as
    /// [`ListenError::Send`] with no listener registered. Without a timeout
    /// in `opts`, [`DEFAULT_ASK_TIMEOUT`] applies.
    ///
    /// This does NOT guarantee a reply exists. It sends, then waits for the
    /// next matching message - honest event-driven behavior, not RPC. A
    /// reply landing in the window between the send completing and the
    /// listener registering is dispatched normally.
    pub async fn ask(
        &self,
        target: impl Into<ChatTarget>,
        outbound: OutboundMessage,
        opts: ListenOptions,
    ) -> Result<Reply, ListenError> {
        let chat = self.resolve(target.into()).await?;
        let request = self
            .transport
            .send_message(chat, outbound)
            .await
            .map_err(|source| ListenError::Send { source })?;
        debug!(%chat, request = %request.id, "request sent; awaiting reply");

        let timeout = opts.timeout.unwrap_or(DEFAULT_ASK_TIMEOUT);
        match self.registry.listen(chat, opts.filter, Some(timeout)).await {
            Ok(message) => Ok(Reply { request, message }),
            Err(error) => {
                // The send succeeded even though the ask failed; keep the
                // request record traceable.
                warn!(%chat, request = %request.id, error = %error, "no reply to request");
                Err(error)
            }
        }
    }

    /// Like [`Client::listen`], but a timeout yields `Ok(None)` instead of
    /// an error. All other failures still propagate.
    ///
    /// Without a timeout in `opts`, [`DEFAULT_ASK_TIMEOUT`] applies.
    pub async fn listen_or_none(
        &self,
        target: impl Into<ChatTarget>,
        opts: ListenOptions,
    ) -> Result<Option<Message>, ListenError> {
        let chat = self.resolve(target.into()).await?;
        let timeout = opts.timeout.unwrap_or(DEFAULT_ASK_TIMEOUT);
        match self.registry.listen(chat, opts.filter, Some(timeout)).await {
            Ok(message) => Ok(Some(message)),
            Err(error) if error.is_timed_out() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Cancel the pending listener on `target`, if any.
    ///
    /// The waiting caller observes [`ListenError::Canceled`]. Returns
    /// whether a live listener was canceled.
    pub async fn cancel_listener(
        &self,
        target: impl Into<ChatTarget>,
    ) -> Result<bool, ListenError> {
        let chat = self.resolve(target.into()).await?;
        Ok(self.registry.cancel(chat))
    }

    /// Resolve `target` once and bind the conveniences to it.
    pub async fn chat(&self, target: impl Into<ChatTarget>) -> Result<Chat<T>, ListenError> {
        Ok(Chat {
            id: self.resolve(target.into()).await?,
            client: self.clone(),
        })
    }

    /// Bind the conveniences to an already-canonical conversation key.
    pub fn chat_by_id(&self, id: ChatId) -> Chat<T> {
        Chat {
            id,
            client: self.clone(),
        }
    }

    /// Bind the conveniences to a user's direct-message stream.
    pub fn user(&self, id: UserId) -> User<T> {
        User {
            id,
            client: self.clone(),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pending_listeners", &self.registry.pending_count())
            .finish_non_exhaustive()
    }
}

/// A conversation with the client conveniences bound to its key.
///
/// Purely delegating; holds no state beyond the key and a client handle.
pub struct Chat<T> {
    client: Client<T>,
    id: ChatId,
}

impl<T> Clone for Chat<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            id: self.id,
        }
    }
}

impl<T: ChatTransport> Chat<T> {
    /// This conversation's canonical key.
    pub fn id(&self) -> ChatId {
        self.id
    }

    /// See [`Client::listen`].
    pub async fn listen(&self, opts: ListenOptions) -> Result<Message, ListenError> {
        self.client.listen(self.id, opts).await
    }

    /// See [`Client::ask`].
    pub async fn ask(
        &self,
        outbound: OutboundMessage,
        opts: ListenOptions,
    ) -> Result<Reply, ListenError> {
        self.client.ask(self.id, outbound, opts).await
    }

    /// See [`Client::listen_or_none`].
    pub async fn listen_or_none(
        &self,
        opts: ListenOptions,
    ) -> Result<Option<Message>, ListenError> {
        self.client.listen_or_none(self.id, opts).await
    }

    /// See [`Client::cancel_listener`].
    pub async fn cancel_listener(&self) -> Result<bool, ListenError> {
        self.client.cancel_listener(self.id).await
    }
}

impl<T> fmt::Debug for Chat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chat").field("id", &self.id).finish()
    }
}

/// A user with the client conveniences bound to their direct-message stream.
pub struct User<T> {
    client: Client<T>,
    id: UserId,
}

impl<T> Clone for User<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            id: self.id,
        }
    }
}

impl<T: ChatTransport> User<T> {
    /// This user's id.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// See [`Client::listen`].
    pub async fn listen(&self, opts: ListenOptions) -> Result<Message, ListenError> {
        self.client.listen(self.id.direct_chat(), opts).await
    }

    /// See [`Client::ask`].
    pub async fn ask(
        &self,
        outbound: OutboundMessage,
        opts: ListenOptions,
    ) -> Result<Reply, ListenError> {
        self.client.ask(self.id.direct_chat(), outbound, opts).await
    }

    /// See [`Client::listen_or_none`].
    pub async fn listen_or_none(
        &self,
        opts: ListenOptions,
    ) -> Result<Option<Message>, ListenError> {
        self.client.listen_or_none(self.id.direct_chat(), opts).await
    }

    /// See [`Client::cancel_listener`].
    pub async fn cancel_listener(&self) -> Result<bool, ListenError> {
        self.client.cancel_listener(self.id.direct_chat()).await
    }
}

impl<T> fmt::Debug for User<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("id", &self.id).finish()
    }
}
