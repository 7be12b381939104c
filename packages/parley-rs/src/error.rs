//! Structured error types for listen/ask operations.
//!
//! `ListenError` is the only error type the public API returns. The rule of
//! thumb mirrors the collaborator traits: transports, filters, and handlers
//! speak `anyhow::Error` at their boundary, and the facade wraps those into
//! pattern-matchable variants here.
//!
//! Callers are expected to branch on the terminal kind:
//!
//! ```ignore
//! match client.listen(chat, opts).await {
//!     Ok(message) => reply_to(message),
//!     Err(e) if e.is_timed_out() => retry_later(),
//!     Err(e) if e.is_canceled() => abort(),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

/// Error returned by `listen`, `ask`, and their conveniences.
#[derive(Debug, Error)]
pub enum ListenError {
    /// No matching message arrived within the deadline. The listener slot
    /// has been removed.
    #[error("timed out after {waited:?} waiting for a reply")]
    TimedOut {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The listener was canceled, either by an explicit `cancel_listener`
    /// call or because a later `listen` on the same conversation superseded
    /// it. Distinguishable from [`ListenError::TimedOut`] so callers can
    /// branch (retry vs. abort).
    #[error("listener was canceled")]
    Canceled,

    /// The transport could not resolve a chat alias to a canonical id.
    /// Surfaced before any listener is registered.
    #[error("could not resolve chat target '{target}': {source}")]
    Resolution {
        /// The alias that failed to resolve.
        target: String,
        /// The transport's error.
        source: anyhow::Error,
    },

    /// The outbound send in `ask` failed. Surfaced before any listener is
    /// registered, so no waiter is leaked.
    #[error("send failed: {source}")]
    Send {
        /// The transport's error.
        source: anyhow::Error,
    },
}

impl ListenError {
    /// Returns true if the wait expired without a matching message.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ListenError::TimedOut { .. })
    }

    /// Returns true if the listener was canceled or superseded.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ListenError::Canceled)
    }
}

/// Result alias for listen/ask operations.
pub type ListenResult<T> = Result<T, ListenError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_timed_out_display() {
        let err = ListenError::TimedOut {
            waited: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_canceled_display() {
        let err = ListenError::Canceled;
        assert!(err.to_string().contains("canceled"));
    }

    #[test]
    fn test_resolution_display_names_target() {
        let err = ListenError::Resolution {
            target: "@support".to_string(),
            source: anyhow!("no such alias"),
        };
        let display = err.to_string();
        assert!(display.contains("@support"));
        assert!(display.contains("no such alias"));
    }

    #[test]
    fn test_send_display_carries_source() {
        let err = ListenError::Send {
            source: anyhow!("connection reset"),
        };
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_branch_helpers() {
        let timed_out = ListenError::TimedOut {
            waited: Duration::from_secs(1),
        };
        assert!(timed_out.is_timed_out());
        assert!(!timed_out.is_canceled());

        let canceled = ListenError::Canceled;
        assert!(canceled.is_canceled());
        assert!(!canceled.is_timed_out());
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = ListenError::TimedOut {
            waited: Duration::from_secs(30),
        };

        match err {
            ListenError::TimedOut { waited } => {
                assert_eq!(waited, Duration::from_secs(30));
            }
            _ => panic!("expected TimedOut"),
        }
    }
}
