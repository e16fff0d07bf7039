//! Decoded BACnet primitive values and the `AnyAtomic` write dtype
//! dispatch table.

use conduit_core::{GatewayError, PointValue};

/// A decoded property value, before being flattened to [`PointValue`]'s
/// printable form. Mirrors the primitive/array shape `ReadProperty`(Multiple)
/// responses carry.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Boolean(bool),
    Unsigned(u64),
    Integer(i64),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(Vec<bool>),
    Date(String),
    Time(String),
    ObjectIdentifier(String),
    Array(Vec<RawValue>),
}

impl RawValue {
    fn stringify(&self) -> String {
        match self {
            Self::Boolean(v) => v.to_string(),
            Self::Unsigned(v) => v.to_string(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::OctetString(bytes) => hex::encode(bytes),
            Self::CharacterString(s) => s.clone(),
            Self::BitString(bits) => bits
                .iter()
                .map(|b| if *b { '1' } else { '0' })
                .collect(),
            Self::Date(s) | Self::Time(s) | Self::ObjectIdentifier(s) => s.clone(),
            Self::Array(_) => unreachable!("arrays are flattened before stringify"),
        }
    }

    /// Flattens into the module boundary's `string | [string]` shape
    ///: a single-element array collapses to a scalar, matching
    /// `ReadProperty`'s own single/array distinction.
    pub fn into_point_value(self) -> PointValue {
        match self {
            Self::Array(items) => {
                PointValue::from_values(items.into_iter().map(|v| v.stringify()).collect())
            }
            other => PointValue::Single(other.stringify()),
        }
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Constructs the value to write for an `AnyAtomic`-typed property from
/// its `dtype:value` encoded write string: the dtype prefix
/// selects the primitive constructor from the fixed set
/// `{b,u,i,r,d,o,c,bs,date,time,id}`.
pub fn parse_any_atomic(id: &str, value: &str) -> Result<RawValue, GatewayError> {
    let (dtype, raw) = value.split_once(':').ok_or_else(|| GatewayError::InvalidValue {
        id: id.to_string(),
        value: value.to_string(),
        reason: "expected '<dtype>:<value>' for an AnyAtomic property".to_string(),
    })?;
    let invalid = |reason: &str| GatewayError::InvalidValue {
        id: id.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    match dtype {
        "b" => raw.parse::<bool>().map(RawValue::Boolean).map_err(|_| invalid("not a valid bool")),
        "u" => raw.parse::<u64>().map(RawValue::Unsigned).map_err(|_| invalid("not a valid unsigned")),
        "i" => raw.parse::<i64>().map(RawValue::Integer).map_err(|_| invalid("not a valid integer")),
        "r" => raw.parse::<f32>().map(RawValue::Real).map_err(|_| invalid("not a valid real")),
        "d" => raw.parse::<f64>().map(RawValue::Double).map_err(|_| invalid("not a valid double")),
        "o" => Ok(RawValue::OctetString(raw.as_bytes().to_vec())),
        "c" => Ok(RawValue::CharacterString(raw.to_string())),
        "bs" => Ok(RawValue::BitString(raw.chars().map(|c| c == '1').collect())),
        "date" => Ok(RawValue::Date(raw.to_string())),
        "time" => Ok(RawValue::Time(raw.to_string())),
        "id" => Ok(RawValue::ObjectIdentifier(raw.to_string())),
        other => Err(invalid(&format!("unknown AnyAtomic dtype '{other}'"))),
    }
}

/// The plain (non-`AnyAtomic`) primitive datatypes a property's registry
/// entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    Integer,
    Real,
    Unsigned,
    /// Boolean, character string, or any other atomic carried verbatim.
    Other,
}

/// Looks up the plain `Atomic` datatype a standard object's property is
/// declared to carry, the way a BACnet stack's object-property registry
/// would. Only `presentValue` varies by object type; every other writable
/// property is carried verbatim.
#[must_use]
pub fn atomic_kind_for(object_type: &str, property: &str) -> AtomicKind {
    if property != "presentValue" {
        return AtomicKind::Other;
    }
    match object_type {
        "analogInput" | "analogOutput" | "analogValue" | "loop" | "averaging"
        | "pulseConverter" => AtomicKind::Real,
        "binaryInput" | "binaryOutput" | "binaryValue" | "multiStateInput"
        | "multiStateOutput" | "multiStateValue" | "lifeSafetyPoint" | "lifeSafetyZone" => {
            AtomicKind::Unsigned
        }
        "accumulator" | "positiveIntegerValue" => AtomicKind::Unsigned,
        "integerValue" => AtomicKind::Integer,
        _ => AtomicKind::Other,
    }
}

/// Constructs the value to write for a property whose registered
/// datatype is a plain `Atomic` primitive (not `AnyAtomic`):
/// integer/real/unsigned get numeric parsing, everything else is carried
/// verbatim as a character string.
pub fn parse_atomic(id: &str, kind: AtomicKind, value: &str) -> Result<RawValue, GatewayError> {
    let invalid = |reason: &str| GatewayError::InvalidValue {
        id: id.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    match kind {
        AtomicKind::Integer => value.parse::<i64>().map(RawValue::Integer).map_err(|_| invalid("not a valid integer")),
        AtomicKind::Real => value.parse::<f64>().map(RawValue::Double).map_err(|_| invalid("not a valid real")),
        AtomicKind::Unsigned => value.parse::<u64>().map(RawValue::Unsigned).map_err(|_| invalid("not a valid unsigned")),
        AtomicKind::Other => Ok(RawValue::CharacterString(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("analogValue", "presentValue", AtomicKind::Real)]
    #[case("binaryOutput", "presentValue", AtomicKind::Unsigned)]
    #[case("multiStateValue", "presentValue", AtomicKind::Unsigned)]
    #[case("analogInput", "description", AtomicKind::Other)]
    #[case("device", "presentValue", AtomicKind::Other)]
    fn test_atomic_kind_for_known_object_types(
        #[case] object_type: &str,
        #[case] property: &str,
        #[case] expected: AtomicKind,
    ) {
        assert_eq!(atomic_kind_for(object_type, property), expected);
    }

    #[rstest]
    fn test_parse_atomic_dispatches_on_kind() {
        assert_eq!(parse_atomic("x", AtomicKind::Real, "1.5").unwrap(), RawValue::Double(1.5));
        assert_eq!(
            parse_atomic("x", AtomicKind::Unsigned, "3").unwrap(),
            RawValue::Unsigned(3)
        );
        assert_eq!(
            parse_atomic("x", AtomicKind::Other, "active").unwrap(),
            RawValue::CharacterString("active".to_string())
        );
    }

    #[rstest]
    #[case("b:true", RawValue::Boolean(true))]
    #[case("u:7", RawValue::Unsigned(7))]
    #[case("i:-3", RawValue::Integer(-3))]
    #[case("r:1.5", RawValue::Real(1.5))]
    #[case("c:hello", RawValue::CharacterString("hello".to_string()))]
    fn test_parse_any_atomic_ok(#[case] input: &str, #[case] expected: RawValue) {
        assert_eq!(parse_any_atomic("x", input).unwrap(), expected);
    }

    #[rstest]
    fn test_parse_any_atomic_rejects_unknown_dtype() {
        assert!(parse_any_atomic("x", "zz:1").is_err());
    }

    #[rstest]
    fn test_parse_any_atomic_requires_colon() {
        assert!(parse_any_atomic("x", "novalue").is_err());
    }

    #[rstest]
    fn test_into_point_value_collapses_single_element_array() {
        let value = RawValue::Array(vec![RawValue::Integer(5)]).into_point_value();
        assert_eq!(value, PointValue::Single("5".to_string()));
    }

    #[rstest]
    fn test_into_point_value_keeps_multi_element_array() {
        let value =
            RawValue::Array(vec![RawValue::Integer(1), RawValue::Integer(2)]).into_point_value();
        assert_eq!(
            value,
            PointValue::Multiple(vec!["1".to_string(), "2".to_string()])
        );
    }
}
