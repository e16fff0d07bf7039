//! SNMP connection configuration.

use std::fs;

use conduit_core::GatewayError;
use serde::Deserialize;

fn default_port() -> u16 {
    161
}

fn default_timeout_secs() -> u64 {
    1
}

fn default_retries() -> u32 {
    5
}

fn default_community_version() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthProtocol {
    No,
    #[serde(rename = "HMACMD5")]
    HmacMd5,
    #[serde(rename = "HMACSHA")]
    HmacSha,
    #[serde(rename = "HMAC128SHA224")]
    Hmac128Sha224,
    #[serde(rename = "HMAC192SHA256")]
    Hmac192Sha256,
    #[serde(rename = "HMAC256SHA384")]
    Hmac256Sha384,
    #[serde(rename = "HMAC384SHA512")]
    Hmac384Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PrivProtocol {
    No,
    #[serde(rename = "DES")]
    Des,
    #[serde(rename = "3DESEDE")]
    DesEde,
    AesCfb128,
    AesCfb192,
    AesCfb256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunityAuthConfig {
    pub community_name: String,
    #[serde(default = "default_community_version")]
    pub version: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsmAuthConfig {
    pub username: String,
    #[serde(default)]
    pub auth_key: Option<String>,
    #[serde(default)]
    pub auth_key_file: Option<String>,
    #[serde(default)]
    pub priv_key: Option<String>,
    #[serde(default)]
    pub priv_key_file: Option<String>,
    #[serde(default)]
    pub auth_protocol: Option<AuthProtocol>,
    #[serde(default)]
    pub priv_protocol: Option<PrivProtocol>,
}

impl UsmAuthConfig {
    /// Reads `*_key_file` once, replacing the corresponding inline key
    /// field
    fn resolve_key_files(&mut self) -> Result<(), GatewayError> {
        if let Some(path) = &self.auth_key_file {
            self.auth_key = Some(fs::read_to_string(path).map_err(|err| {
                GatewayError::Configuration(format!("reading auth_key_file '{path}': {err}"))
            })?);
        }
        if let Some(path) = &self.priv_key_file {
            self.priv_key = Some(fs::read_to_string(path).map_err(|err| {
                GatewayError::Configuration(format!("reading priv_key_file '{path}': {err}"))
            })?);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConnectionConfig {
    pub conn_id: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub community_auth: Option<CommunityAuthConfig>,
    #[serde(default)]
    pub usm_auth: Option<UsmAuthConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnmpModuleConfig {
    #[serde(default)]
    pub conn: Vec<SnmpConnectionConfig>,
}

impl SnmpModuleConfig {
    /// Resolves all `*_key_file` fields and rejects duplicate `conn_id`s.
    /// Called once at startup, before connections become
    /// reachable.
    pub fn resolve(mut self) -> Result<Self, GatewayError> {
        let mut seen = std::collections::HashSet::new();
        for conn in &mut self.conn {
            if !seen.insert(conn.conn_id.clone()) {
                return Err(GatewayError::Configuration(format!(
                    "duplicate SNMP connection id '{}'",
                    conn.conn_id
                )));
            }
            if let Some(usm) = &mut conn.usm_auth {
                usm.resolve_key_files()?;
            }
        }
        Ok(self)
    }
}
