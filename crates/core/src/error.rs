//! The closed error taxonomy shared by every data-module adapter.
//!
//! Every adapter converts its protocol-specific failures into one of these
//! variants at the module boundary; low-level errors are never leaked raw
//! across the [`conduit_data::DataModule`](../conduit_data/trait.DataModule.html)
//! contract. The HTTP/WebSocket transport maps each kind to a status code
//! (400 for client errors, 404 for [`GatewayError::NotFound`], 500 for
//! server errors).

use thiserror::Error;

/// Errors a data-module operation (read, write, subscribe) can fail with.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The point identifier did not parse according to the owning module's
    /// syntax.
    #[error("invalid point id '{id}': {reason}")]
    InvalidId {
        /// The offending identifier.
        id: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// A write payload could not be coerced to the expected datatype.
    #[error("invalid value '{value}' for '{id}': {reason}")]
    InvalidValue {
        /// The point identifier being written.
        id: String,
        /// The value that could not be coerced.
        value: String,
        /// Why the coercion failed.
        reason: String,
    },

    /// An unknown module, scheme, element, or connection id was referenced.
    #[error("not found: {0}")]
    NotFound(String),

    /// A device or transport deadline was exceeded.
    #[error("timeout communicating with '{id}' after {deadline_ms}ms")]
    Timeout {
        /// The point or connection id that timed out.
        id: String,
        /// The configured deadline, in milliseconds.
        deadline_ms: u64,
    },

    /// An adapter-specific transport or decoding failure (BACnet error APDU,
    /// Modbus exception response, SNMP engine/PDU error, Influx client
    /// error).
    #[error("protocol error on '{id}': {reason}")]
    Protocol {
        /// The point or connection id involved.
        id: String,
        /// The underlying protocol failure, stringified.
        reason: String,
    },

    /// A configuration defect: duplicate id, unknown template/group
    /// reference, missing required field, unresolved variable. Fatal at
    /// startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The module does not implement the requested operation for this
    /// point.
    ///
    /// Note: for `register_cov` specifically, callers expect a plain
    /// `false` return, not an `Err`. The variant is kept so adapters have
    /// a uniform way to log the condition before translating it to that
    /// boolean.
    #[error("unsupported operation '{operation}' on '{id}'")]
    Unsupported {
        /// The point id the operation was attempted against.
        id: String,
        /// The operation name, e.g. "register_cov".
        operation: String,
    },
}

impl GatewayError {
    /// The HTTP status code this error maps to
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidId { .. } | Self::InvalidValue { .. } | Self::Configuration(_) => 400,
            Self::NotFound(_) => 404,
            Self::Timeout { .. } | Self::Protocol { .. } | Self::Unsupported { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::invalid_id(GatewayError::InvalidId { id: "x".into(), reason: "y".into() }, 400)]
    #[case::invalid_value(GatewayError::InvalidValue { id: "x".into(), value: "y".into(), reason: "z".into() }, 400)]
    #[case::configuration(GatewayError::Configuration("dup".into()), 400)]
    #[case::not_found(GatewayError::NotFound("module".into()), 404)]
    #[case::timeout(GatewayError::Timeout { id: "x".into(), deadline_ms: 500 }, 500)]
    #[case::protocol(GatewayError::Protocol { id: "x".into(), reason: "y".into() }, 500)]
    fn test_status_code_mapping(#[case] error: GatewayError, #[case] expected: u16) {
        assert_eq!(error.status_code(), expected);
    }
}
