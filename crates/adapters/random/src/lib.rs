//! The Random data module: a synthetic, purely local
//! source with no transport. Reference implementation of the data-module
//! contract and of the local subscription fan-out protocol every other
//! module's COV support is expected to honour.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use conduit_core::{error::GatewayError, parsing::split_id, value::PointValue};
use conduit_data::{module::CovCallback, DataModule, SubscriptionTable};
use rand::Rng;

/// A value is considered fresh (and is returned verbatim rather than
/// re-randomized) for this long after it was last set.
const VALUE_FRESHNESS_WINDOW: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RandomType {
    Int,
    Float,
    Bool,
    Str,
}

impl RandomType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "str" => Some(Self::Str),
            _ => None,
        }
    }
}

struct ParsedId {
    name: String,
    data_type: RandomType,
    min: f64,
    max: f64,
}

fn parse_data_id(id: &str) -> Result<ParsedId, GatewayError> {
    let parts = split_id(id, 1)?;
    let data_type = match parts.get(1) {
        Some(raw) => RandomType::parse(raw).ok_or_else(|| GatewayError::InvalidId {
            id: id.to_string(),
            reason: format!("unknown type '{raw}'"),
        })?,
        None => RandomType::Int,
    };
    let min = match parts.get(2) {
        Some(raw) => conduit_core::parsing::parse_id_component(id, raw, "min")?,
        None => 0.0,
    };
    let max = match parts.get(3) {
        Some(raw) => conduit_core::parsing::parse_id_component(id, raw, "max")?,
        None => 100.0,
    };
    Ok(ParsedId {
        name: parts[0].to_string(),
        data_type,
        min,
        max,
    })
}

fn generate(data_type: RandomType, min: f64, max: f64) -> String {
    let mut rng = rand::rng();
    match data_type {
        RandomType::Str => {
            const WORDS: [&str; 5] = ["Lorem", "Ipsum", "Dolor", "Sit", "Amet"];
            WORDS[rng.random_range(0..WORDS.len())].to_string()
        }
        RandomType::Float => (rng.random::<f64>() * (max - min) + min).to_string(),
        RandomType::Bool => rng.random::<bool>().to_string(),
        RandomType::Int => rng.random_range(min as i64..=max as i64).to_string(),
    }
}

/// The Random data module: `values` holds the most recently written value
/// per name plus when it was written; `subscriptions` fans out writes to
/// registered callbacks.
pub struct RandomModule {
    values: Mutex<HashMap<String, (Instant, String)>>,
    subscriptions: SubscriptionTable<String, ()>,
}

impl Default for RandomModule {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            subscriptions: SubscriptionTable::new(),
        }
    }
}

#[async_trait]
impl DataModule for RandomModule {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn start(&self) -> Result<(), GatewayError> {
        tracing::debug!("random data module started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        tracing::debug!("random data module stopped");
        Ok(())
    }

    async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
        let parsed = parse_data_id(id)?;
        tracing::debug!(id, "random get");
        if let Some((set_at, value)) = self.values.lock().unwrap().get(&parsed.name) {
            if set_at.elapsed() < VALUE_FRESHNESS_WINDOW {
                return Ok(PointValue::Single(value.clone()));
            }
        }
        Ok(PointValue::Single(generate(
            parsed.data_type,
            parsed.min,
            parsed.max,
        )))
    }

    async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
        let parsed = parse_data_id(id)?;
        tracing::debug!(id, value, "random set");
        self.values
            .lock()
            .unwrap()
            .insert(parsed.name.clone(), (Instant::now(), value.to_string()));
        self.subscriptions
            .dispatch(&parsed.name, id, &PointValue::Single(value.to_string()))
            .await;
        Ok(Some(value.to_string()))
    }

    async fn register_cov(
        &self,
        id: &str,
        subscriber_id: &str,
        callback: CovCallback,
    ) -> Result<bool, GatewayError> {
        let parsed = parse_data_id(id)?;
        tracing::debug!(id, subscriber_id, "random register_cov");
        self.subscriptions
            .register(parsed.name, subscriber_id.to_string(), callback, || async {
                Ok(Some(()))
            })
            .await
    }

    async fn remove_cov(&self, id: &str, subscriber_id: &str) -> Result<(), GatewayError> {
        let parsed = parse_data_id(id)?;
        tracing::debug!(id, subscriber_id, "random remove_cov");
        self.subscriptions
            .remove(&parsed.name, subscriber_id, |_handle| {})
            .await;
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

    #[rstest]
    fn test_parse_data_id_defaults() {
        let parsed = parse_data_id("t1").unwrap();
        assert_eq!(parsed.name, "t1");
        assert_eq!(parsed.data_type, RandomType::Int);
        assert_eq!(parsed.min, 0.0);
        assert_eq!(parsed.max, 100.0);
    }

    #[rstest]
    fn test_parse_data_id_full() {
        let parsed = parse_data_id("room1::float::0::1").unwrap();
        assert_eq!(parsed.name, "room1");
        assert_eq!(parsed.data_type, RandomType::Float);
        assert_eq!(parsed.min, 0.0);
        assert_eq!(parsed.max, 1.0);
    }

    #[rstest]
    fn test_parse_data_id_rejects_unknown_type() {
        assert!(parse_data_id("t1::weird").is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn test_round_trip_set_then_get() {
        let module = RandomModule::new();
        module.set_value("t::int::0::10", "7").await.unwrap();
        let value = module.get_value("t::int::0::10").await.unwrap();
        assert_eq!(value, PointValue::Single("7".to_string()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_cov_fires_on_set_and_stops_after_remove() {
        let module = RandomModule::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: CovCallback = Arc::new(move |_id, _value| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let ok = module
            .register_cov("room::int", "sub-a", callback)
            .await
            .unwrap();
        assert!(ok);

        module.set_value("room::int", "1").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        module.remove_cov("room::int", "sub-a").await.unwrap();
        module.set_value("room::int", "2").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_subscription_reference_counting() {
        let module = RandomModule::new();
        let noop: CovCallback = Arc::new(|_, _| Box::pin(async { Ok(()) }));
        for sub in ["a", "b", "c"] {
            module
                .register_cov("p::int", sub, noop.clone())
                .await
                .unwrap();
        }
        for sub in ["a", "b", "c"] {
            module.remove_cov("p::int", sub).await.unwrap();
        }
        assert_eq!(module.subscriptions.subscriber_count(&"p".to_string()).await, 0);
    }
}
