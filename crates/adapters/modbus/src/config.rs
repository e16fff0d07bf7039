//! Modbus connection configuration.

use serde::Deserialize;

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_retries() -> u32 {
    3
}

fn default_tcp_port() -> u16 {
    502
}

fn default_baudrate() -> u32 {
    9_600
}

fn default_bytesize() -> u8 {
    8
}

fn default_parity() -> char {
    'N'
}

fn default_stopbits() -> u8 {
    1
}

/// One named Modbus connection: either TCP or serial, never both.
#[derive(Debug, Clone, Deserialize)]
pub struct ModbusConnectionConfig {
    pub conn_id: String,
    /// Deadline for a single connect-and-transact attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of retries after the first failed attempt (so up to
    /// `retries + 1` attempts total per request).
    #[serde(default = "default_retries")]
    pub retries: u32,
    pub tcp: Option<ModbusTcpConfig>,
    pub serial: Option<ModbusSerialConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModbusTcpConfig {
    pub address: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Frame as RTU-over-TCP rather than the Modbus/TCP MBAP header.
    #[serde(default)]
    pub rtu: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModbusSerialConfig {
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    #[serde(default = "default_parity")]
    pub parity: char,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
}

/// Top-level `[modbus]` configuration table: a list of named connections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModbusModuleConfig {
    #[serde(default)]
    pub conn: Vec<ModbusConnectionConfig>,
}
