//! Stress tests designed to break the listener registry.
//!
//! These exercise the races the per-key single-resolution guarantee has to
//! survive: concurrent cancel/resolve, supersede storms, and timeout jitter.

#[cfg(test)]
mod stress_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time;

    use crate::core::{ChatId, Message};
    use crate::error::ListenError;
    use crate::registry::ListenerRegistry;

    async fn wait_for_listener(registry: &ListenerRegistry, chat: ChatId) {
        for _ in 0..500 {
            if registry.is_listening(chat) {
                return;
            }
            time::sleep(Duration::from_millis(2)).await;
        }
        panic!("listener for {chat} never registered");
    }

    /// Many concurrent listeners on distinct keys: each gets exactly its
    /// own message, none observes a neighbor's.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_distinct_keys_are_isolated() {
        let registry = Arc::new(ListenerRegistry::new());
        let mut listeners = Vec::new();

        for i in 0..100i64 {
            let registry = registry.clone();
            listeners.push(tokio::spawn(async move {
                registry
                    .listen(ChatId::new(i), None, Some(Duration::from_secs(5)))
                    .await
            }));
        }

        for i in 0..100i64 {
            wait_for_listener(&registry, ChatId::new(i)).await;
        }

        for i in 0..100i64 {
            let chat = ChatId::new(i);
            assert!(
                registry
                    .resolve(chat, Message::new(chat, format!("payload-{i}")))
                    .await
            );
        }

        for (i, listener) in listeners.into_iter().enumerate() {
            let message = listener.await.unwrap().unwrap();
            assert_eq!(message.chat, ChatId::new(i as i64));
            assert_eq!(message.text, format!("payload-{i}"));
        }

        assert_eq!(registry.pending_count(), 0);
    }

    /// Concurrent cancel and resolve on the same key: the waiting caller
    /// observes exactly one terminal outcome, and the registry never leaks
    /// the slot.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_vs_resolve_single_winner() {
        let registry = Arc::new(ListenerRegistry::new());
        let chat = ChatId::new(1);

        for round in 0..50 {
            let listener = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .listen(chat, None, Some(Duration::from_secs(5)))
                        .await
                })
            };
            wait_for_listener(&registry, chat).await;

            let canceler = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.cancel(chat) })
            };
            let resolver = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.resolve(chat, Message::new(chat, "race")).await
                })
            };

            let canceled = canceler.await.unwrap();
            let resolved = resolver.await.unwrap();
            let outcome = listener.await.unwrap();

            // Exactly one terminal path wins, and the caller observes the
            // winner.
            assert!(
                canceled ^ resolved,
                "round {round}: canceled={canceled} resolved={resolved}"
            );
            match outcome {
                Ok(message) => {
                    assert!(resolved, "round {round}: got a message without a resolve win");
                    assert_eq!(message.text, "race");
                }
                Err(ListenError::Canceled) => {
                    assert!(canceled, "round {round}: canceled without a cancel win");
                }
                Err(other) => panic!("round {round}: unexpected outcome {other:?}"),
            }

            assert!(!registry.is_listening(chat), "round {round}: slot leaked");
        }
    }

    /// A storm of listeners fighting over one key: exactly one survives to
    /// receive the message, every superseded caller observes Canceled.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_supersede_storm_has_one_survivor() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let registry = Arc::new(ListenerRegistry::new());
        let chat = ChatId::new(2);
        let canceled_count = Arc::new(AtomicUsize::new(0));

        let mut listeners = Vec::new();
        for _ in 0..20 {
            let registry = registry.clone();
            let canceled_count = canceled_count.clone();
            listeners.push(tokio::spawn(async move {
                let outcome = registry
                    .listen(chat, None, Some(Duration::from_secs(5)))
                    .await;
                if matches!(outcome, Err(ListenError::Canceled)) {
                    canceled_count.fetch_add(1, Ordering::SeqCst);
                }
                outcome
            }));
            // Stagger a little so inserts interleave with registrations.
            time::sleep(Duration::from_micros(fastrand::u64(0..200))).await;
        }

        // 19 cancellations means all 20 registered and exactly one is left.
        for _ in 0..500 {
            if canceled_count.load(Ordering::SeqCst) == 19 {
                break;
            }
            time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(canceled_count.load(Ordering::SeqCst), 19);

        wait_for_listener(&registry, chat).await;
        assert!(registry.resolve(chat, Message::new(chat, "survivor")).await);

        let mut winners = 0;
        let mut canceled = 0;
        for listener in listeners {
            match listener.await.unwrap() {
                Ok(message) => {
                    assert_eq!(message.text, "survivor");
                    winners += 1;
                }
                Err(ListenError::Canceled) => canceled += 1,
                Err(other) => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(canceled, 19);
        assert_eq!(registry.pending_count(), 0);
    }

    /// Timeout racing a late resolve: the resolve's consumed flag always
    /// agrees with what the caller observed, and nothing hangs.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_vs_resolve_agree() {
        let registry = Arc::new(ListenerRegistry::new());

        for round in 0..30i64 {
            let chat = ChatId::new(100 + round);
            let listener = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .listen(chat, None, Some(Duration::from_millis(15)))
                        .await
                })
            };
            wait_for_listener(&registry, chat).await;

            // Land the resolve somewhere around the deadline.
            time::sleep(Duration::from_millis(fastrand::u64(0..30))).await;
            let consumed = registry.resolve(chat, Message::new(chat, "late?")).await;

            let outcome = listener.await.unwrap();
            match outcome {
                Ok(_) => assert!(consumed, "round {round}: caller got a message nobody sent"),
                Err(ListenError::TimedOut { .. }) => {
                    assert!(!consumed, "round {round}: message swallowed after timeout")
                }
                Err(other) => panic!("round {round}: unexpected outcome {other:?}"),
            }
            assert!(!registry.is_listening(chat), "round {round}: slot leaked");
        }
    }
}
