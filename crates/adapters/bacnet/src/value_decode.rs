//! Conversion between `bacnet-rs`'s wire-level primitive value and this
//! module's [`RawValue`].

use bacnet_rs::primitive::Value as WireValue;

use crate::value::RawValue;

/// Decodes a wire value. `None` only for a primitive `bacnet-rs` itself
/// could not classify (an unknown tag), mirroring the reference
/// implementation's "unknown datatype" error path.
pub fn from_wire(value: WireValue) -> Option<RawValue> {
    match value {
        WireValue::Boolean(v) => Some(RawValue::Boolean(v)),
        WireValue::Unsigned(v) => Some(RawValue::Unsigned(v)),
        WireValue::Integer(v) => Some(RawValue::Integer(v)),
        WireValue::Real(v) => Some(RawValue::Real(v)),
        WireValue::Double(v) => Some(RawValue::Double(v)),
        WireValue::OctetString(bytes) => Some(RawValue::OctetString(bytes)),
        WireValue::CharacterString(s) => Some(RawValue::CharacterString(s)),
        WireValue::BitString(bits) => Some(RawValue::BitString(bits)),
        WireValue::Date(d) => Some(RawValue::Date(d.to_string())),
        WireValue::Time(t) => Some(RawValue::Time(t.to_string())),
        WireValue::ObjectIdentifier(oid) => Some(RawValue::ObjectIdentifier(oid.to_string())),
        WireValue::Array(items) => {
            let decoded: Option<Vec<RawValue>> = items.into_iter().map(from_wire).collect();
            decoded.map(RawValue::Array)
        }
        _ => None,
    }
}

/// Encodes a value for an outbound `WriteProperty` request.
pub fn to_wire(value: &RawValue) -> WireValue {
    match value {
        RawValue::Boolean(v) => WireValue::Boolean(*v),
        RawValue::Unsigned(v) => WireValue::Unsigned(*v),
        RawValue::Integer(v) => WireValue::Integer(*v),
        RawValue::Real(v) => WireValue::Real(*v),
        RawValue::Double(v) => WireValue::Double(*v),
        RawValue::OctetString(bytes) => WireValue::OctetString(bytes.clone()),
        RawValue::CharacterString(s) => WireValue::CharacterString(s.clone()),
        RawValue::BitString(bits) => WireValue::BitString(bits.clone()),
        RawValue::Date(s) => WireValue::Date(s.parse().unwrap_or_default()),
        RawValue::Time(s) => WireValue::Time(s.parse().unwrap_or_default()),
        RawValue::ObjectIdentifier(s) => WireValue::ObjectIdentifier(s.parse().unwrap_or_default()),
        RawValue::Array(items) => WireValue::Array(items.iter().map(to_wire).collect()),
    }
}
