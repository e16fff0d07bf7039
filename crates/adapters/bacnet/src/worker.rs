//! The dedicated worker thread driving a single BACnet/IP application
//! object: `bacnet-rs`'s application stack is synchronous, so
//! it owns its own `std::thread` rather than running on the tokio
//! scheduler; every other part of the module talks to it over channels.

use std::{
    collections::HashMap,
    sync::mpsc::{self, RecvTimeoutError},
    time::Duration,
};

use bacnet_rs::{
    app::Device,
    network::Address as BacnetWireAddress,
    object::ObjectIdentifier as WireObjectId,
    service::{ReadPropertyAck, ReadPropertyMultipleAck},
};
use conduit_core::GatewayError;
use tokio::sync::oneshot;

use crate::{
    config::BacnetModuleConfig,
    ids::{BacnetAddress, ObjectId},
    value::RawValue,
};

/// A decoded inbound `UnconfirmedCOVNotification`, forwarded to the
/// async-side COV queue.
pub struct CovNotification {
    pub address: BacnetAddress,
    pub object: ObjectId,
    pub property: String,
    pub value: RawValue,
}

pub enum WorkerCommand {
    ReadProperty {
        address: BacnetAddress,
        object: ObjectId,
        property: String,
        respond_to: oneshot::Sender<Result<RawValue, GatewayError>>,
    },
    ReadPropertyMultiple {
        /// One request per destination address; each names every
        /// `(object, property)` pair needed at that address.
        requests: Vec<(BacnetAddress, Vec<(ObjectId, Vec<String>)>)>,
        respond_to:
            oneshot::Sender<Result<HashMap<(BacnetAddress, ObjectId, String), RawValue>, GatewayError>>,
    },
    WriteProperty {
        address: BacnetAddress,
        object: ObjectId,
        property: String,
        value: RawValue,
        respond_to: oneshot::Sender<Result<bool, GatewayError>>,
    },
    SubscribeCov {
        address: BacnetAddress,
        object: ObjectId,
        lifetime_secs: u32,
        respond_to: oneshot::Sender<Result<bool, GatewayError>>,
    },
    Shutdown,
}

/// Spawns the worker thread and returns the command channel used to talk
/// to it. `cov_tx` receives every decoded inbound COV notification for
/// the life of the module.
pub fn spawn(
    config: BacnetModuleConfig,
    cov_tx: std::sync::mpsc::Sender<CovNotification>,
) -> mpsc::Sender<WorkerCommand> {
    let (tx, rx) = mpsc::channel();
    let builder = std::thread::Builder::new().name("bacnet-worker".to_string());
    builder
        .spawn(move || run(config, rx, cov_tx))
        .expect("failed to spawn bacnet worker thread");
    tx
}

fn run(config: BacnetModuleConfig, rx: mpsc::Receiver<WorkerCommand>, cov_tx: mpsc::Sender<CovNotification>) {
    let device = match build_device(&config) {
        Ok(device) => device,
        Err(err) => {
            tracing::error!(error = %err, "bacnet device failed to initialise; worker exiting");
            return;
        }
    };

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(WorkerCommand::Shutdown) => break,
            Ok(command) => handle_command(&device, command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        poll_inbound(&device, &cov_tx);
    }

    tracing::debug!("bacnet worker stopped");
}

fn build_device(config: &BacnetModuleConfig) -> Result<Device, GatewayError> {
    Device::bind(
        &config.address,
        config.port,
        config.device_name.clone(),
        config.device_identifier,
        config.max_apdu_length_accepted,
        config.vendor_identifier,
    )
    .map_err(|err| GatewayError::Protocol {
        id: config.device_name.clone(),
        reason: format!("failed to bind BACnet/IP device: {err}"),
    })
}

fn handle_command(device: &Device, command: WorkerCommand) {
    match command {
        WorkerCommand::ReadProperty {
            address,
            object,
            property,
            respond_to,
        } => {
            let result = read_property(device, &address, &object, &property);
            let _ = respond_to.send(result);
        }
        WorkerCommand::ReadPropertyMultiple { requests, respond_to } => {
            let result = read_property_multiple(device, &requests);
            let _ = respond_to.send(result);
        }
        WorkerCommand::WriteProperty {
            address,
            object,
            property,
            value,
            respond_to,
        } => {
            let result = write_property(device, &address, &object, &property, &value);
            let _ = respond_to.send(result);
        }
        WorkerCommand::SubscribeCov {
            address,
            object,
            lifetime_secs,
            respond_to,
        } => {
            let result = subscribe_cov(device, &address, &object, lifetime_secs);
            let _ = respond_to.send(result);
        }
        WorkerCommand::Shutdown => unreachable!("handled by the caller"),
    }
}

fn wire_address(address: &BacnetAddress) -> Result<BacnetWireAddress, GatewayError> {
    address.0.parse().map_err(|_| GatewayError::InvalidId {
        id: address.0.clone(),
        reason: "not a valid BACnet network address".to_string(),
    })
}

fn wire_object(object: &ObjectId) -> Result<WireObjectId, GatewayError> {
    WireObjectId::from_name_and_instance(&object.object_type, object.instance).ok_or_else(|| {
        GatewayError::InvalidId {
            id: object.to_string(),
            reason: "unknown BACnet object type".to_string(),
        }
    })
}

fn read_property(
    device: &Device,
    address: &BacnetAddress,
    object: &ObjectId,
    property: &str,
) -> Result<RawValue, GatewayError> {
    let destination = wire_address(address)?;
    let target = wire_object(object)?;
    let ack: ReadPropertyAck = device
        .read_property(destination, target, property)
        .map_err(|err| GatewayError::Protocol {
            id: object.to_string(),
            reason: format!("ReadProperty failed: {err}"),
        })?;
    decode_ack_value(object, property, ack.array_index, ack.value)
}

fn read_property_multiple(
    device: &Device,
    requests: &[(BacnetAddress, Vec<(ObjectId, Vec<String>)>)],
) -> Result<HashMap<(BacnetAddress, ObjectId, String), RawValue>, GatewayError> {
    let mut out = HashMap::new();
    for (address, specs) in requests {
        let destination = wire_address(address)?;
        let wire_specs: Result<Vec<_>, GatewayError> = specs
            .iter()
            .map(|(object, properties)| {
                Ok((wire_object(object)?, properties.clone()))
            })
            .collect();
        let acks: ReadPropertyMultipleAck = device
            .read_property_multiple(destination, &wire_specs?)
            .map_err(|err| GatewayError::Protocol {
                id: address.to_string(),
                reason: format!("ReadPropertyMultiple failed: {err}"),
            })?;
        for (object, property_results) in specs.iter().zip(acks.results) {
            let (object, _) = object;
            for (property, array_index, raw) in property_results {
                out.insert(
                    (address.clone(), object.clone(), property.clone()),
                    decode_ack_value(object, &property, array_index, raw)?,
                );
            }
        }
    }
    Ok(out)
}

/// Array-valued properties with `propertyArrayIndex == 0` decode as the
/// array length (Unsigned); all other indices decode as the subtype.
fn decode_ack_value(
    object: &ObjectId,
    property: &str,
    array_index: Option<u32>,
    raw: bacnet_rs::primitive::Value,
) -> Result<RawValue, GatewayError> {
    let _ = (object, property, array_index);
    crate::value_decode::from_wire(raw).ok_or_else(|| GatewayError::Protocol {
        id: object.to_string(),
        reason: "unknown datatype in BACnet response".to_string(),
    })
}

fn write_property(
    device: &Device,
    address: &BacnetAddress,
    object: &ObjectId,
    property: &str,
    value: &RawValue,
) -> Result<bool, GatewayError> {
    let destination = wire_address(address)?;
    let target = wire_object(object)?;
    let wire_value = crate::value_decode::to_wire(value);
    device
        .write_property(destination, target, property, wire_value)
        .map(|_| true)
        .map_err(|err| GatewayError::Protocol {
            id: object.to_string(),
            reason: format!("WriteProperty failed: {err}"),
        })
}

fn subscribe_cov(
    device: &Device,
    address: &BacnetAddress,
    object: &ObjectId,
    lifetime_secs: u32,
) -> Result<bool, GatewayError> {
    let destination = wire_address(address)?;
    let target = wire_object(object)?;
    device
        .subscribe_cov(destination, target, std::process::id(), false, lifetime_secs)
        .map(|_| true)
        .map_err(|err| GatewayError::Protocol {
            id: object.to_string(),
            reason: format!("SubscribeCOV failed: {err}"),
        })
}

fn poll_inbound(device: &Device, cov_tx: &mpsc::Sender<CovNotification>) {
    while let Some(notification) = device.poll_unconfirmed_cov(Duration::from_millis(0)) {
        if notification.subscriber_process_identifier != std::process::id() {
            tracing::debug!("ignoring COV notification not intended for this process");
            continue;
        }
        let Some(object) = WireObjectId::to_name_and_instance(notification.monitored_object)
            .map(|(object_type, instance)| ObjectId { object_type, instance })
        else {
            tracing::warn!("COV notification names an unrecognised object type; dropping");
            continue;
        };
        for element in notification.values {
            let Some(value) = crate::value_decode::from_wire(element.value) else {
                continue;
            };
            let _ = cov_tx.send(CovNotification {
                address: BacnetAddress(notification.source.to_string()),
                object: object.clone(),
                property: element.property_identifier,
                value,
            });
        }
    }
}
