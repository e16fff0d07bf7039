//! The data-module contract every protocol adapter implements.

use std::collections::HashMap;

use async_trait::async_trait;
use conduit_core::{GatewayError, PointValue};
use futures::future::{join_all, BoxFuture};

/// A Change-of-Value callback.
///
/// Invoked with the canonical point id and the new value whenever the
/// underlying device reports a change. Returns `Err` (as a display string,
/// not a panic) when the callback itself fails; that
/// failure must be logged and must never stop delivery to the remaining
/// callbacks or later notifications.
pub type CovCallback =
    std::sync::Arc<dyn Fn(String, PointValue) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Every protocol adapter (Random, Modbus, SNMP, BACnet) implements this
/// contract uniformly; the [`DataController`](crate::DataController) and the
/// scheme renderer only ever see a `dyn DataModule`.
///
/// Default implementations of the batched operations issue concurrent
/// single-point calls and join the results; a module that
/// supports native batching (BACnet's `ReadPropertyMultiple`) overrides
/// them.
#[async_trait]
pub trait DataModule: Send + Sync {
    /// The module's registry name, e.g. `"random"`.
    fn name(&self) -> &'static str;

    /// Starts the module. Must be called before any other operation and
    /// must complete before it returns. Idempotent.
    async fn start(&self) -> Result<(), GatewayError>;

    /// Stops the module: cancels all outstanding operations and releases
    /// the transport. Idempotent.
    async fn stop(&self) -> Result<(), GatewayError>;

    /// Reads a single point.
    async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError>;

    /// Reads many points.
    ///
    /// The default implementation issues concurrent [`Self::get_value`]
    /// calls; on any individual failure, the whole call fails with that
    /// error (the first one observed by join order).
    async fn get_value_multiple(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PointValue>, GatewayError> {
        let results = join_all(ids.iter().map(|id| self.get_value(id))).await;
        let mut out = HashMap::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            out.insert(id.clone(), result?);
        }
        Ok(out)
    }

    /// Writes a single point, returning the echoed/accepted value, or
    /// `None` when the device acknowledges without echoing one.
    async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError>;

    /// Writes many points.
    ///
    /// The default implementation issues concurrent [`Self::set_value`]
    /// calls; on any individual failure, the whole call fails with that
    /// error.
    async fn set_value_multiple(
        &self,
        pairs: &[(String, String)],
    ) -> Result<HashMap<String, Option<String>>, GatewayError> {
        let results = join_all(pairs.iter().map(|(id, value)| self.set_value(id, value))).await;
        let mut out = HashMap::with_capacity(pairs.len());
        for ((id, _), result) in pairs.iter().zip(results) {
            out.insert(id.clone(), result?);
        }
        Ok(out)
    }

    /// Subscribes `callback` (keyed by the caller-chosen `subscriber_id`)
    /// to changes of `id`.
    ///
    /// Returns `Ok(false)` when the module does not support COV for this
    /// point (the caller should fall back to polling); this is a
    /// behavioural outcome, not an error. The
    /// default implementation always returns `Ok(false)`.
    async fn register_cov(
        &self,
        _id: &str,
        _subscriber_id: &str,
        _callback: CovCallback,
    ) -> Result<bool, GatewayError> {
        Ok(false)
    }

    /// Removes a previously registered subscription. Idempotent; a no-op
    /// if `subscriber_id` was never subscribed to `id`.
    async fn remove_cov(&self, _id: &str, _subscriber_id: &str) -> Result<(), GatewayError> {
        Ok(())
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

    struct CountingModule {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataModule for CountingModule {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn start(&self) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id == "bad" {
                return Err(GatewayError::NotFound(id.to_string()));
            }
            Ok(PointValue::Single(id.to_string()))
        }

        async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("{id}={value}")))
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_default_get_value_multiple_joins_results() {
        let module = CountingModule {
            calls: AtomicUsize::new(0),
        };
        let ids = vec!["a".to_string(), "b".to_string()];
        let result = module.get_value_multiple(&ids).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(module.calls.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_default_get_value_multiple_fails_on_first_error() {
        let module = CountingModule {
            calls: AtomicUsize::new(0),
        };
        let ids = vec!["a".to_string(), "bad".to_string()];
        let result = module.get_value_multiple(&ids).await;
        assert!(result.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn test_default_register_cov_is_unsupported() {
        let module = CountingModule {
            calls: AtomicUsize::new(0),
        };
        let callback: CovCallback = Arc::new(|_, _| Box::pin(async { Ok(()) }));
        let result = module.register_cov("x", "sub", callback).await.unwrap();
        assert!(!result);
    }
}
