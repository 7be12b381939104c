//! Message filters: the "is this of interest" capability.
//!
//! Filters are used identically in two places:
//! - a pending listener's match predicate (the waiter only resolves on
//!   messages the filter accepts)
//! - a registered handler's applicability check
//!
//! A filter returns `Result<bool>` rather than `bool`: filters may consult
//! fallible state. A filter error is never fatal to dispatch - the caller
//! treats it as "not interested" and logs it.
//!
//! Plain closures work directly:
//!
//! ```ignore
//! use parley::ListenOptions;
//!
//! let opts = ListenOptions::new()
//!     .with_filter(|m: &parley::Message| m.text.starts_with("order "));
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{Message, UserId};

/// Decides whether a message is of interest to a listener or handler.
///
/// **Note**: any `Fn(&Message) -> bool + Send + Sync + 'static` closure
/// implements this trait via a blanket impl, so most call sites never
/// implement it by hand. Implement it directly when the decision is async
/// or fallible.
#[async_trait]
pub trait MessageFilter: Send + Sync + 'static {
    /// Return `Ok(true)` to accept the message.
    ///
    /// Errors are treated as rejection by every caller in this crate.
    async fn accepts(&self, message: &Message) -> Result<bool>;
}

// Blanket implementation so plain predicates need no boilerplate.
#[async_trait]
impl<F> MessageFilter for F
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    async fn accepts(&self, message: &Message) -> Result<bool> {
        Ok(self(message))
    }
}

/// Combinator extensions for filters.
///
/// # Example
///
/// ```ignore
/// use parley::filter::{from_user, text_contains, FilterExt};
///
/// let filter = from_user(UserId::new(5)).and(text_contains("yes"));
/// ```
pub trait FilterExt: MessageFilter + Sized {
    /// Accept only when both filters accept.
    fn and<G: MessageFilter>(self, other: G) -> And<Self, G> {
        And {
            left: self,
            right: other,
        }
    }

    /// Accept when either filter accepts.
    fn or<G: MessageFilter>(self, other: G) -> Or<Self, G> {
        Or {
            left: self,
            right: other,
        }
    }
}

impl<F: MessageFilter + Sized> FilterExt for F {}

/// Conjunction of two filters. Short-circuits on the left.
pub struct And<L, R> {
    left: L,
    right: R,
}

#[async_trait]
impl<L: MessageFilter, R: MessageFilter> MessageFilter for And<L, R> {
    async fn accepts(&self, message: &Message) -> Result<bool> {
        Ok(self.left.accepts(message).await? && self.right.accepts(message).await?)
    }
}

/// Disjunction of two filters. Short-circuits on the left.
pub struct Or<L, R> {
    left: L,
    right: R,
}

#[async_trait]
impl<L: MessageFilter, R: MessageFilter> MessageFilter for Or<L, R> {
    async fn accepts(&self, message: &Message) -> Result<bool> {
        Ok(self.left.accepts(message).await? || self.right.accepts(message).await?)
    }
}

/// Accept only messages sent by the given user.
pub fn from_user(user: UserId) -> impl MessageFilter {
    move |message: &Message| message.from == Some(user)
}

/// Accept only messages whose text contains the given needle.
pub fn text_contains(needle: impl Into<String>) -> impl MessageFilter {
    let needle = needle.into();
    move |message: &Message| message.text.contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChatId;
    use anyhow::anyhow;

    fn message(text: &str) -> Message {
        Message::new(ChatId::new(1), text)
    }

    #[tokio::test]
    async fn test_closure_is_a_filter() {
        let filter = |m: &Message| m.text == "yes";
        assert!(filter.accepts(&message("yes")).await.unwrap());
        assert!(!filter.accepts(&message("no")).await.unwrap());
    }

    #[tokio::test]
    async fn test_from_user() {
        let filter = from_user(UserId::new(5));
        let from_five = message("hi").with_from(UserId::new(5));
        let from_six = message("hi").with_from(UserId::new(6));

        assert!(filter.accepts(&from_five).await.unwrap());
        assert!(!filter.accepts(&from_six).await.unwrap());
        assert!(!filter.accepts(&message("hi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_text_contains() {
        let filter = text_contains("order");
        assert!(filter.accepts(&message("my order is late")).await.unwrap());
        assert!(!filter.accepts(&message("hello")).await.unwrap());
    }

    #[tokio::test]
    async fn test_and_requires_both() {
        let filter = from_user(UserId::new(5)).and(text_contains("yes"));

        let both = message("yes please").with_from(UserId::new(5));
        let wrong_user = message("yes please").with_from(UserId::new(6));
        let wrong_text = message("no").with_from(UserId::new(5));

        assert!(filter.accepts(&both).await.unwrap());
        assert!(!filter.accepts(&wrong_user).await.unwrap());
        assert!(!filter.accepts(&wrong_text).await.unwrap());
    }

    #[tokio::test]
    async fn test_or_requires_either() {
        let filter = text_contains("yes").or(text_contains("ok"));

        assert!(filter.accepts(&message("yes")).await.unwrap());
        assert!(filter.accepts(&message("ok then")).await.unwrap());
        assert!(!filter.accepts(&message("no")).await.unwrap());
    }

    struct FailingFilter;

    #[async_trait]
    impl MessageFilter for FailingFilter {
        async fn accepts(&self, _message: &Message) -> Result<bool> {
            Err(anyhow!("lookup failed"))
        }
    }

    #[tokio::test]
    async fn test_combinator_propagates_errors() {
        let filter = FailingFilter.and(text_contains("yes"));
        let result = filter.accepts(&message("yes")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_or_short_circuits_before_error() {
        let filter = text_contains("yes").or(FailingFilter);
        assert!(filter.accepts(&message("yes")).await.unwrap());
        assert!(filter.accepts(&message("no")).await.is_err());
    }
}
