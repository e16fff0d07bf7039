//! BACnet/IP application configuration.

use serde::Deserialize;

fn default_port() -> u16 {
    0xBAC0
}

fn default_max_apdu_length() -> u16 {
    1_476
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_cov_lifetime_secs() -> u32 {
    300
}

/// Configuration for the single long-lived BACnet/IP application object
/// created at `start`.
#[derive(Debug, Clone, Deserialize)]
pub struct BacnetModuleConfig {
    pub device_name: String,
    pub device_identifier: u32,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_apdu_length")]
    pub max_apdu_length_accepted: u16,
    #[serde(default)]
    pub segmentation_supported: SegmentationSupport,
    pub vendor_identifier: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cov_lifetime_secs")]
    pub cov_lifetime_secs: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentationSupport {
    Both,
    Transmit,
    Receive,
    #[default]
    None,
}
