//! Canonical BACnet point identifiers:
//! `<network_address>::<object_type>:<instance>::<property>`, with the
//! property component optional when parsing a subscription target.

use std::fmt;

use conduit_core::GatewayError;

/// A BACnet/IP network address, as the opaque string bacnet-rs accepts
/// (`"host[:port]"` or a MAC-level form); canonicalised by round-tripping
/// through `bacnet_rs::network::Address` at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BacnetAddress(pub String);

impl fmt::Display for BacnetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(object_type, instance)`, e.g. `analogInput:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub object_type: String,
    pub instance: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

/// A fully parsed point identifier: address, object, and (when present)
/// the property name.
pub struct ParsedId {
    pub address: BacnetAddress,
    pub object: ObjectId,
    pub property: Option<String>,
}

/// Builds the canonical id string `"<address>::<object_type>:<instance>::<property>"`
/// used both for outbound request echoes and inbound COV dispatch.
pub fn canonical_id(address: &BacnetAddress, object: &ObjectId, property: &str) -> String {
    format!("{address}::{object}::{property}")
}

/// Parses `id`. `require_property` is `false` for subscription targets,
/// where the property component is optional.
pub fn parse_data_id(id: &str, require_property: bool) -> Result<ParsedId, GatewayError> {
    let parts: Vec<&str> = id.split("::").collect();
    if parts.len() < 2 || parts.iter().take(2).any(|p| p.is_empty()) {
        return Err(GatewayError::InvalidId {
            id: id.to_string(),
            reason: "expected '<address>::<object_type>:<instance>[::<property>]'".to_string(),
        });
    }
    let object = parse_object_id(id, parts[1])?;
    let property = match parts.get(2) {
        Some(raw) if !raw.is_empty() => Some((*raw).to_string()),
        _ => None,
    };
    if require_property && property.is_none() {
        return Err(GatewayError::InvalidId {
            id: id.to_string(),
            reason: "missing property component".to_string(),
        });
    }
    Ok(ParsedId {
        address: BacnetAddress(parts[0].to_string()),
        object,
        property,
    })
}

fn parse_object_id(id: &str, raw: &str) -> Result<ObjectId, GatewayError> {
    let (object_type, instance) = raw.split_once(':').ok_or_else(|| GatewayError::InvalidId {
        id: id.to_string(),
        reason: format!("'{raw}' is not '<object_type>:<instance>'"),
    })?;
    let instance = instance.parse::<u32>().map_err(|_| GatewayError::InvalidId {
        id: id.to_string(),
        reason: format!("'{instance}' is not a valid object instance"),
    })?;
    Ok(ObjectId {
        object_type: object_type.to_string(),
        instance,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_parse_full_id() {
        let parsed = parse_data_id("10.0.0.5::analogInput:3::presentValue", true).unwrap();
        assert_eq!(parsed.address.0, "10.0.0.5");
        assert_eq!(parsed.object.object_type, "analogInput");
        assert_eq!(parsed.object.instance, 3);
        assert_eq!(parsed.property.as_deref(), Some("presentValue"));
    }

    #[rstest]
    fn test_parse_subscription_id_without_property() {
        let parsed = parse_data_id("10.0.0.5::analogInput:3", false).unwrap();
        assert!(parsed.property.is_none());
    }

    #[rstest]
    fn test_parse_rejects_missing_property_when_required() {
        assert!(parse_data_id("10.0.0.5::analogInput:3", true).is_err());
    }

    #[rstest]
    fn test_canonical_id_round_trips() {
        let address = BacnetAddress("10.0.0.5".to_string());
        let object = ObjectId {
            object_type: "analogInput".to_string(),
            instance: 3,
        };
        let id = canonical_id(&address, &object, "presentValue");
        assert_eq!(id, "10.0.0.5::analogInput:3::presentValue");
        let parsed = parse_data_id(&id, true).unwrap();
        assert_eq!(parsed.address, address);
        assert_eq!(parsed.object, object);
    }
}
