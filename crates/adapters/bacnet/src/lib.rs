//! The BACnet/IP data module — the hard part: a single
//! long-lived application object, segmented confirmed services, an
//! outstanding-transaction registry, periodic COV re-subscription and
//! inbound notification dispatch.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod config;
pub mod ids;
pub mod tasks;
pub mod value;
mod value_decode;
pub mod worker;

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use conduit_core::{GatewayError, PointValue};
use conduit_data::{module::CovCallback, DataModule, SubscriptionTable};

use config::BacnetModuleConfig;
use ids::{canonical_id, parse_data_id, BacnetAddress, ObjectId};
use tasks::CovTaskHandle;
use worker::{CovNotification, WorkerCommand};

type SubscriptionKey = (BacnetAddress, ObjectId);

/// The BACnet/IP data module.
pub struct BacnetModule {
    config: BacnetModuleConfig,
    worker: Mutex<Option<std::sync::mpsc::Sender<WorkerCommand>>>,
    subscriptions: Arc<SubscriptionTable<SubscriptionKey, CovTaskHandle>>,
    background: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl BacnetModule {
    /// Builds a module from its `[bacnet]` configuration table. The
    /// application object and background tasks are created in
    /// [`DataModule::start`], not here.
    #[must_use]
    pub fn new(config: BacnetModuleConfig) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
            subscriptions: Arc::new(SubscriptionTable::new()),
            background: Mutex::new(Vec::new()),
        }
    }

    fn worker_sender(&self) -> Result<std::sync::mpsc::Sender<WorkerCommand>, GatewayError> {
        self.worker
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Protocol {
                id: self.config.device_name.clone(),
                reason: "BACnet module was not started".to_string(),
            })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

#[async_trait]
impl DataModule for BacnetModule {
    fn name(&self) -> &'static str {
        "bacnet"
    }

    async fn start(&self) -> Result<(), GatewayError> {
        let (cov_tx, cov_rx) = std::sync::mpsc::channel::<CovNotification>();
        let worker_tx = worker::spawn(self.config.clone(), cov_tx);
        *self.worker.lock().unwrap() = Some(worker_tx);

        // Bridges the worker thread's synchronous COV channel onto the
        // async side, where the dispatcher can take the subscription
        // table's tokio mutex.
        let (async_tx, mut async_rx) = tokio::sync::mpsc::unbounded_channel::<CovNotification>();
        std::thread::Builder::new()
            .name("bacnet-cov-bridge".to_string())
            .spawn(move || {
                while let Ok(notification) = cov_rx.recv() {
                    if async_tx.send(notification).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn BACnet COV bridge thread");

        let subscriptions = self.subscriptions.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(notification) = async_rx.recv().await {
                let key = (notification.address.clone(), notification.object.clone());
                let id = canonical_id(&notification.address, &notification.object, &notification.property);
                let value = notification.value.into_point_value();
                // An unrecognised key must be skipped, never abort the
                // dispatcher entirely.
                subscriptions.dispatch(&key, &id, &value).await;
            }
        });
        self.background.lock().unwrap().push(dispatcher);

        tracing::info!(device = self.config.device_name, "bacnet module started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.send(WorkerCommand::Shutdown);
        }
        for task in self.background.lock().unwrap().drain(..) {
            task.abort();
        }
        Ok(())
    }

    async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
        let parsed = parse_data_id(id, true)?;
        let property = parsed.property.expect("require_property=true");
        tracing::debug!(id, "bacnet read");

        let worker = self.worker_sender()?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        worker
            .send(WorkerCommand::ReadProperty {
                address: parsed.address,
                object: parsed.object,
                property,
                respond_to: tx,
            })
            .map_err(|_| GatewayError::Protocol {
                id: id.to_string(),
                reason: "BACnet worker is not running".to_string(),
            })?;

        let raw = await_with_timeout(rx, self.timeout(), id).await?;
        Ok(raw.into_point_value())
    }

    async fn get_value_multiple(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PointValue>, GatewayError> {
        // Groups requests first by address then by object so each group
        // becomes a single `ReadPropertyMultiple` request.
        let mut parsed_by_id = Vec::with_capacity(ids.len());
        let mut grouped: HashMap<BacnetAddress, HashMap<ObjectId, Vec<String>>> = HashMap::new();
        for id in ids {
            let parsed = parse_data_id(id, true)?;
            let property = parsed.property.clone().expect("require_property=true");
            grouped
                .entry(parsed.address.clone())
                .or_default()
                .entry(parsed.object.clone())
                .or_default()
                .push(property.clone());
            parsed_by_id.push((id.clone(), parsed.address, parsed.object, property));
        }

        let requests: Vec<(BacnetAddress, Vec<(ObjectId, Vec<String>)>)> = grouped
            .into_iter()
            .map(|(address, objects)| (address, objects.into_iter().collect()))
            .collect();

        let worker = self.worker_sender()?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        worker
            .send(WorkerCommand::ReadPropertyMultiple {
                requests,
                respond_to: tx,
            })
            .map_err(|_| GatewayError::Protocol {
                id: "bacnet".to_string(),
                reason: "BACnet worker is not running".to_string(),
            })?;

        let results = await_with_timeout(rx, self.timeout(), "bacnet batched read").await?;

        let mut out = HashMap::with_capacity(parsed_by_id.len());
        for (id, address, object, property) in parsed_by_id {
            let raw = results
                .get(&(address, object, property))
                .cloned()
                .ok_or_else(|| GatewayError::Protocol {
                    id: id.clone(),
                    reason: "missing result in ReadPropertyMultiple response".to_string(),
                })?;
            out.insert(id, raw.into_point_value());
        }
        Ok(out)
    }

    async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
        let parsed = parse_data_id(id, true)?;
        let property = parsed.property.expect("require_property=true");
        tracing::debug!(id, value, "bacnet write");

        // An `AnyAtomic`-typed property carries an explicit
        // `dtype:value` prefix naming its primitive constructor; anything
        // else is a plain `Atomic` property, whose registered datatype
        // (looked up from the object type) decides the primitive
        // constructor.
        let raw_value = if is_any_atomic_write(value) {
            value::parse_any_atomic(id, value)?
        } else {
            let kind = value::atomic_kind_for(&parsed.object.object_type, &property);
            value::parse_atomic(id, kind, value)?
        };

        let worker = self.worker_sender()?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        worker
            .send(WorkerCommand::WriteProperty {
                address: parsed.address,
                object: parsed.object,
                property,
                value: raw_value,
                respond_to: tx,
            })
            .map_err(|_| GatewayError::Protocol {
                id: id.to_string(),
                reason: "BACnet worker is not running".to_string(),
            })?;

        let acked = await_with_timeout(rx, self.timeout(), id).await?;
        Ok(acked.then(|| value.to_string()))
    }

    async fn register_cov(
        &self,
        id: &str,
        subscriber_id: &str,
        callback: CovCallback,
    ) -> Result<bool, GatewayError> {
        let parsed = parse_data_id(id, false)?;
        let key = (parsed.address.clone(), parsed.object.clone());
        let lifetime_secs = self.config.cov_lifetime_secs;
        let timeout = self.timeout();
        let worker = self.worker_sender()?;

        self.subscriptions
            .register(key, subscriber_id.to_string(), callback, move || async move {
                tasks::install(worker, parsed.address, parsed.object, lifetime_secs, timeout).await
            })
            .await
    }

    async fn remove_cov(&self, id: &str, subscriber_id: &str) -> Result<(), GatewayError> {
        let parsed = parse_data_id(id, false)?;
        let key = (parsed.address, parsed.object);
        self.subscriptions
            .remove(&key, subscriber_id, |handle| handle.cancel())
            .await;
        Ok(())
    }
}

const ANY_ATOMIC_DTYPES: [&str; 11] = [
    "b", "u", "i", "r", "d", "o", "c", "bs", "date", "time", "id",
];

fn is_any_atomic_write(value: &str) -> bool {
    value
        .split_once(':')
        .is_some_and(|(dtype, _)| ANY_ATOMIC_DTYPES.contains(&dtype))
}

async fn await_with_timeout<T>(
    rx: tokio::sync::oneshot::Receiver<Result<T, GatewayError>>,
    timeout: Duration,
    id: &str,
) -> Result<T, GatewayError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(GatewayError::Protocol {
            id: id.to_string(),
            reason: "BACnet worker dropped the request".to_string(),
        }),
        Err(_) => Err(GatewayError::Timeout {
            id: id.to_string(),
            deadline_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn sample_config() -> BacnetModuleConfig {
        BacnetModuleConfig {
            device_name: "gateway".to_string(),
            device_identifier: 1001,
            address: "0.0.0.0".to_string(),
            port: 0xBAC0,
            max_apdu_length_accepted: 1_476,
            segmentation_supported: config::SegmentationSupport::None,
            vendor_identifier: 0,
            timeout_ms: 5_000,
            cov_lifetime_secs: 300,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_value_before_start_is_a_protocol_error() {
        let module = BacnetModule::new(sample_config());
        let err = module
            .get_value("10.0.0.5::analogInput:3::presentValue")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[rstest]
    #[tokio::test]
    async fn test_register_cov_before_start_is_a_protocol_error() {
        let module = BacnetModule::new(sample_config());
        let callback: CovCallback = std::sync::Arc::new(|_, _| Box::pin(async { Ok(()) }));
        let err = module
            .register_cov("10.0.0.5::analogInput:3", "sub", callback)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
