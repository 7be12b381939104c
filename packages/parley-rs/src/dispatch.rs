//! Inbound dispatch: listener interception in front of the handler chain.
//!
//! Every inbound message goes through [`Dispatcher::dispatch`], which gives
//! the pending listener for that conversation first refusal:
//!
//! ```text
//! inbound message
//!     │
//!     ▼
//! ListenerRegistry::resolve ── consumed ──► done (handlers skipped)
//!     │
//!     ▼ fell through
//! handler chain (each handler's filter decides applicability)
//! ```
//!
//! The embedding event source must route every inbound message through the
//! dispatcher before any of its own processing, so that a pending wait
//! always sees new messages before ordinary handlers do.
//!
//! # Failure Policy
//!
//! Dispatch never dies because of user code. A handler filter error skips
//! that handler; a handler error is logged and later handlers still run; a
//! handler panic is caught and logged. The dispatch stream itself only ends
//! when the inbound channel closes.

use std::any::type_name;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::Message;
use crate::filter::MessageFilter;
use crate::registry::ListenerRegistry;

/// An ordinary message handler, called for messages no listener consumed.
///
/// Handlers are registered on a [`Dispatcher`] with an optional
/// [`MessageFilter`] deciding applicability - the same capability listeners
/// use for matching.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process an inbound message.
    ///
    /// Errors are logged by the dispatcher and do not stop later handlers.
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

struct RegisteredHandler {
    /// Handler type name, for log lines.
    name: &'static str,
    filter: Option<Arc<dyn MessageFilter>>,
    handler: Box<dyn MessageHandler>,
}

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A pending listener consumed the message; handlers were skipped.
    Listener,
    /// The message fell through to the handler chain.
    Handlers {
        /// Number of handlers whose filter accepted the message.
        invoked: usize,
    },
}

impl DispatchOutcome {
    /// Returns true if a pending listener consumed the message.
    pub fn consumed_by_listener(&self) -> bool {
        matches!(self, DispatchOutcome::Listener)
    }
}

/// Routes inbound messages: listeners first, then the handler chain.
///
/// # Example
///
/// ```ignore
/// let dispatcher = client
///     .dispatcher()
///     .with_handler(LogHandler)
///     .with_filtered_handler(filter::text_contains("!help"), HelpHandler);
///
/// let (tx, rx) = tokio::sync::mpsc::channel(64);
/// tokio::spawn(dispatcher.run(rx));
/// // transport glue pushes inbound messages into tx
/// ```
pub struct Dispatcher {
    registry: Arc<ListenerRegistry>,
    handlers: Vec<RegisteredHandler>,
}

impl Dispatcher {
    /// Create a dispatcher routing to the given registry.
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self {
            registry,
            handlers: Vec::new(),
        }
    }

    /// Register a handler that sees every fallthrough message.
    ///
    /// Handlers run in registration order.
    pub fn with_handler<H: MessageHandler>(mut self, handler: H) -> Self {
        self.handlers.push(RegisteredHandler {
            name: type_name::<H>(),
            filter: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Register a handler gated by a filter.
    pub fn with_filtered_handler<F, H>(mut self, filter: F, handler: H) -> Self
    where
        F: MessageFilter,
        H: MessageHandler,
    {
        self.handlers.push(RegisteredHandler {
            name: type_name::<H>(),
            filter: Some(Arc::new(filter)),
            handler: Box::new(handler),
        });
        self
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The registry this dispatcher intercepts for.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Route one inbound message.
    ///
    /// The pending listener for the message's conversation gets first
    /// refusal; only when no listener consumes it does the handler chain
    /// run.
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        if self.registry.resolve(message.chat, message.clone()).await {
            debug!(chat = %message.chat, "message consumed by listener");
            return DispatchOutcome::Listener;
        }

        let mut invoked = 0;
        for registered in &self.handlers {
            if let Some(filter) = &registered.filter {
                match filter.accepts(&message).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        warn!(
                            handler = registered.name,
                            error = %err,
                            "handler filter failed; skipping handler"
                        );
                        continue;
                    }
                }
            }

            invoked += 1;
            // AssertUnwindSafe: the handler is not touched again after a
            // panic.
            let outcome = AssertUnwindSafe(registered.handler.handle(&message))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(handler = registered.name, error = %err, "handler failed");
                }
                Err(panic) => {
                    error!(
                        handler = registered.name,
                        panic = %panic_message(&panic),
                        "handler panicked"
                    );
                }
            }
        }

        DispatchOutcome::Handlers { invoked }
    }

    /// Serial dispatch pump: process inbound messages one at a time until
    /// the channel closes.
    ///
    /// Typically spawned as a background task:
    ///
    /// ```ignore
    /// tokio::spawn(dispatcher.run(inbound_rx));
    /// ```
    pub async fn run(self, mut inbound: mpsc::Receiver<Message>) {
        info!(handler_count = self.handlers.len(), "dispatch loop starting");
        while let Some(message) = inbound.recv().await {
            self.dispatch(message).await;
        }
        info!("dispatch loop stopped");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Extract a human-readable message from a panic payload.
fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
