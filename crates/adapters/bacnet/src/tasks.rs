//! The `SubscribeCOV` task: owns one subscription's lifetime,
//! from the initial install through periodic re-confirmation to
//! cancellation.
//!
//! State machine: `Pending` -(SimpleAck)-> `Active` -(lifetime timer)->
//! `Reconfirming` -(SimpleAck)-> `Active`; any state -(error or
//! `cancel_task`)-> `Cancelled` (terminal).

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use conduit_core::GatewayError;
use rand::Rng;
use tokio::sync::oneshot;

use crate::{
    ids::{BacnetAddress, ObjectId},
    worker::WorkerCommand,
};

/// A handle to a running `SubscribeCOV` task. Dropping it does not cancel
/// the task; call [`CovTaskHandle::cancel`] explicitly.
pub struct CovTaskHandle {
    cancelled: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

impl CovTaskHandle {
    /// Flips the cancellation flag. The task observes this at its next re-arm check and
    /// does not re-install; in-flight requests are left to finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.join.abort();
    }
}

/// Installs a COV subscription and spawns the task that keeps it alive.
///
/// Resolves once the *initial* `SubscribeCOV` completes: `true` on
/// `SimpleAck`, `false` on any I/O error. The returned handle keeps the
/// periodic re-confirmation running in the background for as long as it
/// is not cancelled.
pub async fn install(
    worker: std::sync::mpsc::Sender<WorkerCommand>,
    address: BacnetAddress,
    object: ObjectId,
    lifetime_secs: u32,
    request_timeout: Duration,
) -> Result<Option<CovTaskHandle>, GatewayError> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = oneshot::channel();

    let task_cancelled = cancelled.clone();
    let join = tokio::spawn(run(
        worker,
        address,
        object,
        lifetime_secs,
        request_timeout,
        task_cancelled,
        ready_tx,
    ));

    match ready_rx.await {
        Ok(Ok(true)) => Ok(Some(CovTaskHandle { cancelled, join })),
        Ok(Ok(false)) => Ok(None),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(GatewayError::Protocol {
            id: format!("{address}"),
            reason: "COV subscription task terminated before reporting".to_string(),
        }),
    }
}

async fn run(
    worker: std::sync::mpsc::Sender<WorkerCommand>,
    address: BacnetAddress,
    object: ObjectId,
    lifetime_secs: u32,
    request_timeout: Duration,
    cancelled: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<bool, GatewayError>>,
) {
    let mut ready_tx = Some(ready_tx);

    loop {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        let result = send_subscribe(&worker, &address, &object, lifetime_secs, request_timeout).await;
        let ok = matches!(result, Ok(true));
        if !ok {
            cancelled.store(true, Ordering::SeqCst);
        }

        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(result);
        } else if !ok {
            tracing::warn!(object = %object, address = %address, "COV reconfirmation failed; subscription cancelled");
        } else {
            tracing::debug!(object = %object, address = %address, "COV reconfirmed");
        }

        if !ok {
            return;
        }

        let jitter_ms = rand::rng().random_range(0..(lifetime_secs as u64 * 50).max(1));
        let sleep_for = Duration::from_secs(lifetime_secs as u64).saturating_sub(Duration::from_millis(jitter_ms));
        tokio::time::sleep(sleep_for).await;
    }
}

async fn send_subscribe(
    worker: &std::sync::mpsc::Sender<WorkerCommand>,
    address: &BacnetAddress,
    object: &ObjectId,
    lifetime_secs: u32,
    request_timeout: Duration,
) -> Result<bool, GatewayError> {
    let (tx, rx) = oneshot::channel();
    worker
        .send(WorkerCommand::SubscribeCov {
            address: address.clone(),
            object: object.clone(),
            lifetime_secs,
            respond_to: tx,
        })
        .map_err(|_| GatewayError::Protocol {
            id: object.to_string(),
            reason: "BACnet worker is not running".to_string(),
        })?;

    match tokio::time::timeout(request_timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(GatewayError::Protocol {
            id: object.to_string(),
            reason: "BACnet worker dropped the request".to_string(),
        }),
        Err(_) => Err(GatewayError::Timeout {
            id: object.to_string(),
            deadline_ms: request_timeout.as_millis() as u64,
        }),
    }
}
