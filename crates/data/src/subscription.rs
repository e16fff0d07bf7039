//! Generic Change-of-Value subscription fan-out.
//!
//! A per-module table mapping a canonical point key to a transport-level
//! subscription handle (present iff at least one subscriber is registered)
//! and the set of subscriber callbacks for that key. Random (trivial, no
//! handle) and BACnet (a `SubscribeCOV` task handle) both build on this.

use std::{collections::HashMap, future::Future, hash::Hash};

use conduit_core::{GatewayError, PointValue};
use tokio::sync::Mutex;

use crate::module::CovCallback;

struct Entry<H> {
    handle: Option<H>,
    callbacks: HashMap<String, CovCallback>,
}

/// A subscription table for one data module.
///
/// `K` is the canonical point key (e.g. the parsed id, or `(address,
/// object_identifier)` for BACnet). `H` is whatever transport-level handle
/// the module needs to remember per key in order to cancel a subscription
/// later (`()` when there is none, as for the Random module).
pub struct SubscriptionTable<K, H> {
    entries: Mutex<HashMap<K, Entry<H>>>,
}

impl<K, H> Default for SubscriptionTable<K, H>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, H> SubscriptionTable<K, H>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `key` keyed by `subscriber_id`.
    ///
    /// If `key` is already present, the existing transport handle is
    /// reused and `install` is not called. Otherwise `install` runs while
    /// the table's mutex is held, and:
    ///
    /// - `Ok(None)` means the module does not support COV for this point:
    ///   the table is left unchanged and this returns `Ok(false)`.
    /// - `Ok(Some(handle))` installs the entry and returns `Ok(true)`.
    /// - `Err(e)` propagates without installing anything.
    pub async fn register<F, Fut>(
        &self,
        key: K,
        subscriber_id: String,
        callback: CovCallback,
        install: F,
    ) -> Result<bool, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<H>, GatewayError>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&key) {
            entry.callbacks.insert(subscriber_id, callback);
            return Ok(true);
        }

        match install().await? {
            None => Ok(false),
            Some(handle) => {
                let mut callbacks = HashMap::new();
                callbacks.insert(subscriber_id, callback);
                entries.insert(
                    key,
                    Entry {
                        handle: Some(handle),
                        callbacks,
                    },
                );
                Ok(true)
            }
        }
    }

    /// Removes `subscriber_id`'s callback for `key`. If it was the last
    /// subscriber, the entry is dropped from the table and `cancel` is
    /// invoked with the transport handle so the caller can tear it down.
    ///
    /// No-op (and `cancel` is not called) if `key`/`subscriber_id` was not
    /// subscribed.
    pub async fn remove<F>(&self, key: &K, subscriber_id: &str, cancel: F)
    where
        F: FnOnce(H),
    {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.callbacks.remove(subscriber_id).is_none() {
            return;
        }
        if entry.callbacks.is_empty() {
            if let Some(removed) = entries.remove(key) {
                if let Some(handle) = removed.handle {
                    cancel(handle);
                }
            }
        }
    }

    /// Fans `value` out to every callback registered for `key`, under the
    /// table's lock (serializing dispatch against concurrent
    /// register/remove).
    ///
    /// A callback that returns `Err` is logged and does not prevent the
    /// remaining callbacks from running, nor later dispatches. If `key` is
    /// not present, the call is a no-op (not an error): an inbound
    /// notification for a key nobody is subscribed to anymore is an
    /// ordinary race, not a defect.
    pub async fn dispatch(&self, key: &K, id: &str, value: &PointValue) {
        let entries = self.entries.lock().await;
        let Some(entry) = entries.get(key) else {
            return;
        };
        for callback in entry.callbacks.values() {
            if let Err(err) = callback(id.to_string(), value.clone()).await {
                tracing::warn!(error = %err, id, "exception while calling COV callback");
            }
        }
    }

    /// Returns the number of subscribers currently registered for `key`
    /// (`0` if `key` is not present). Exposed for tests verifying reference
    /// counting.
    pub async fn subscriber_count(&self, key: &K) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |entry| entry.callbacks.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rstest::rstest;

    use super::*;

    fn counting_callback(counter: Arc<AtomicUsize>) -> CovCallback {
        Arc::new(move |_id, _value| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[rstest]
    #[tokio::test]
    async fn test_register_reuses_handle_for_second_subscriber() {
        let table: SubscriptionTable<String, u32> = SubscriptionTable::new();
        let installs = Arc::new(AtomicUsize::new(0));

        let install = {
            let installs = installs.clone();
            move || {
                let installs = installs.clone();
                async move {
                    installs.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(1u32))
                }
            }
        };
        let counter = Arc::new(AtomicUsize::new(0));
        table
            .register(
                "p1".to_string(),
                "a".to_string(),
                counting_callback(counter.clone()),
                install,
            )
            .await
            .unwrap();

        let install2 = || async { Ok(Some(2u32)) };
        let ok = table
            .register(
                "p1".to_string(),
                "b".to_string(),
                counting_callback(counter.clone()),
                install2,
            )
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(table.subscriber_count(&"p1".to_string()).await, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_register_unsupported_returns_false() {
        let table: SubscriptionTable<String, u32> = SubscriptionTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ok = table
            .register(
                "p1".to_string(),
                "a".to_string(),
                counting_callback(counter),
                || async { Ok(None) },
            )
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(table.subscriber_count(&"p1".to_string()).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reference_counting_leaves_table_empty() {
        let table: SubscriptionTable<String, u32> = SubscriptionTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for sub in ["a", "b", "c"] {
            table
                .register(
                    "p1".to_string(),
                    sub.to_string(),
                    counting_callback(counter.clone()),
                    || async { Ok(Some(1u32)) },
                )
                .await
                .unwrap();
        }
        assert_eq!(table.subscriber_count(&"p1".to_string()).await, 3);

        let cancelled = Arc::new(AtomicUsize::new(0));
        for sub in ["a", "b", "c"] {
            let cancelled = cancelled.clone();
            table
                .remove(&"p1".to_string(), sub, move |_handle| {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        assert_eq!(table.subscriber_count(&"p1".to_string()).await, 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_dispatch_fans_out_to_all_subscribers_and_survives_error() {
        let table: SubscriptionTable<String, u32> = SubscriptionTable::new();
        let good_counter = Arc::new(AtomicUsize::new(0));
        let good = good_counter.clone();
        table
            .register(
                "p1".to_string(),
                "good".to_string(),
                Arc::new(move |_id, _value| {
                    let good = good.clone();
                    Box::pin(async move {
                        good.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
                || async { Ok(Some(1u32)) },
            )
            .await
            .unwrap();
        table
            .register(
                "p1".to_string(),
                "bad".to_string(),
                Arc::new(|_id, _value| Box::pin(async { Err("boom".to_string()) })),
                || async { Ok(Some(1u32)) },
            )
            .await
            .unwrap();

        table
            .dispatch(
                &"p1".to_string(),
                "p1",
                &PointValue::Single("5".to_string()),
            )
            .await;

        assert_eq!(good_counter.load(Ordering::SeqCst), 1);
    }
}
