//! The SNMP data module: UDP request/response with
//! community or USM authentication. Every request opens a fresh engine and
//! transport; no session state survives between requests.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod config;

use std::{collections::HashMap, net::SocketAddr, str::FromStr, time::Duration};

use async_trait::async_trait;
use conduit_core::{GatewayError, PointValue};
use conduit_data::DataModule;
use csnmp::{ObjectIdentifier, ObjectValue, Snmp2cClient};

use config::{SnmpConnectionConfig, SnmpModuleConfig};

/// The SNMP data module: a fixed, duplicate-checked set of named
/// connections.
pub struct SnmpModule {
    connections: HashMap<String, SnmpConnectionConfig>,
}

impl SnmpModule {
    /// Builds a module from its resolved `[snmp]` configuration table.
    /// Callers should run [`SnmpModuleConfig::resolve`] first so
    /// `auth_key_file`/`priv_key_file` have already been read and
    /// duplicate `conn_id`s rejected.
    #[must_use]
    pub fn new(config: SnmpModuleConfig) -> Self {
        let connections = config
            .conn
            .into_iter()
            .map(|conn| (conn.conn_id.clone(), conn))
            .collect();
        Self { connections }
    }

    fn lookup(&self, conn_id: &str) -> Result<&SnmpConnectionConfig, GatewayError> {
        self.connections
            .get(conn_id)
            .ok_or_else(|| GatewayError::NotFound(format!("SNMP connection '{conn_id}'")))
    }

    fn community(conn: &SnmpConnectionConfig) -> &str {
        conn.community_auth
            .as_ref()
            .map_or("public", |auth| auth.community_name.as_str())
    }

    async fn client(&self, conn: &SnmpConnectionConfig) -> Result<Snmp2cClient, GatewayError> {
        if conn.usm_auth.is_some() {
            return Err(GatewayError::Unsupported {
                id: conn.conn_id.clone(),
                operation: "SNMPv3 USM authentication".to_string(),
            });
        }
        let target: SocketAddr = format!("{}:{}", conn.address, conn.port)
            .parse()
            .map_err(|_| {
                GatewayError::Configuration(format!(
                    "invalid SNMP target address '{}:{}'",
                    conn.address, conn.port
                ))
            })?;
        let bind_addr: SocketAddr = if conn.ipv6 { "[::]:0" } else { "0.0.0.0:0" }
            .parse()
            .expect("valid wildcard bind address");
        Snmp2cClient::new(
            target,
            Self::community(conn).as_bytes().to_vec(),
            Some(bind_addr),
            Duration::from_secs(conn.timeout_secs),
        )
        .await
        .map_err(|err| GatewayError::Protocol {
            id: conn.conn_id.clone(),
            reason: format!("failed to create SNMP client: {err}"),
        })
    }
}

fn parse_data_id(id: &str) -> Result<(&str, ObjectIdentifier), GatewayError> {
    let mut parts = id.splitn(2, "::");
    let conn_id = parts.next().filter(|s| !s.is_empty());
    let oid_tail = parts.next().filter(|s| !s.is_empty());
    let (conn_id, oid_tail) = match (conn_id, oid_tail) {
        (Some(conn_id), Some(oid_tail)) => (conn_id, oid_tail),
        _ => {
            return Err(GatewayError::InvalidId {
                id: id.to_string(),
                reason: "expected '<conn_id>::<oid_component>[::<oid_component>...]'".to_string(),
            })
        }
    };
    let dotted = oid_tail.replace("::", ".");
    let oid = ObjectIdentifier::from_str(&dotted).map_err(|err| GatewayError::InvalidId {
        id: id.to_string(),
        reason: format!("invalid OID '{dotted}': {err}"),
    })?;
    Ok((conn_id, oid))
}

fn format_object_value(value: &ObjectValue) -> String {
    match value {
        ObjectValue::Integer(v) => v.to_string(),
        ObjectValue::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ObjectValue::ObjectId(oid) => oid.to_string(),
        ObjectValue::IpAddress(addr) => addr.to_string(),
        ObjectValue::Counter32(v) | ObjectValue::Gauge32(v) => v.to_string(),
        ObjectValue::TimeTicks(v) => v.to_string(),
        ObjectValue::Counter64(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}

#[async_trait]
impl DataModule for SnmpModule {
    fn name(&self) -> &'static str {
        "snmp"
    }

    async fn start(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
        let (conn_id, oid) = parse_data_id(id)?;
        let conn = self.lookup(conn_id)?;
        tracing::debug!(conn = conn_id, oid = %oid, "SNMP get");

        let client = self.client(conn).await?;
        let value = client.get(oid).await.map_err(|err| {
            if err.to_string().to_lowercase().contains("timeout") {
                GatewayError::Timeout {
                    id: id.to_string(),
                    deadline_ms: conn.timeout_secs * 1_000,
                }
            } else {
                GatewayError::Protocol {
                    id: id.to_string(),
                    reason: format!("SNMP error: {err}"),
                }
            }
        })?;
        Ok(PointValue::Single(format_object_value(&value)))
    }

    async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
        let (conn_id, oid) = parse_data_id(id)?;
        let conn = self.lookup(conn_id)?;
        tracing::debug!(conn = conn_id, oid = %oid, value, "SNMP set");

        let client = self.client(conn).await?;
        let object_value = ObjectValue::String(value.as_bytes().to_vec());
        client
            .set(oid, object_value)
            .await
            .map_err(|err| GatewayError::Protocol {
                id: id.to_string(),
                reason: format!("SNMP set error: {err}"),
            })?;
        Ok(Some(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_parse_data_id_ok() {
        let (conn_id, oid) = parse_data_id("gw1::1::3::6::1::2::1::1::1::0").unwrap();
        assert_eq!(conn_id, "gw1");
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }

    #[rstest]
    fn test_parse_data_id_requires_oid() {
        assert!(parse_data_id("gw1").is_err());
    }

    #[test]
    fn test_community_defaults_to_public() {
        let conn = SnmpConnectionConfig {
            conn_id: "gw1".to_string(),
            address: "127.0.0.1".to_string(),
            port: 161,
            timeout_secs: 1,
            retries: 1,
            ipv6: false,
            community_auth: None,
            usm_auth: None,
        };
        assert_eq!(SnmpModule::community(&conn), "public");
    }

    #[test]
    fn test_lookup_unknown_connection_is_not_found() {
        let module = SnmpModule::new(SnmpModuleConfig::default());
        let err = module.lookup("nope").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
