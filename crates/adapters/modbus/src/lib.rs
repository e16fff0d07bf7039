//! The Modbus data module: reads and writes coils,
//! discrete inputs, holding registers and input registers over Modbus/TCP,
//! RTU-over-TCP, or RTU-over-serial.
//!
//! `tokio-modbus` has no ASCII framer, so ASCII-over-serial (which the
//! pymodbus-based source supported) is not carried over; see `DESIGN.md`.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod config;

use std::{collections::HashMap, sync::LazyLock, time::Duration};

use async_trait::async_trait;
use conduit_core::{GatewayError, PointValue};
use conduit_data::DataModule;
use regex::Regex;
use tokio::net::TcpStream;
use tokio_modbus::{
    client::{rtu, tcp, Context, Reader, Writer},
    Slave,
};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

use config::{ModbusConnectionConfig, ModbusModuleConfig, ModbusSerialConfig};

static READ_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<conn>\w+)::(?P<slave>\d+)::(?P<obj>co|di|hr|ir):(?P<addr>\d+)(::(?P<count>\d+))?$")
        .expect("valid regex")
});

static WRITE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<conn>\w+)::(?P<slave>\d+)::(?P<obj>co|hr):(?P<addr>\d+)(::(?P<count>\d+))?$")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl ObjectType {
    fn parse(s: &str) -> Self {
        match s {
            "co" => Self::Coil,
            "di" => Self::DiscreteInput,
            "hr" => Self::HoldingRegister,
            "ir" => Self::InputRegister,
            other => unreachable!("regex only matches co|di|hr|ir, got {other}"),
        }
    }
}

struct ParsedId {
    conn_id: String,
    slave: u8,
    obj_type: ObjectType,
    addr: u16,
    count: u16,
}

fn parse_id(id: &str, re: &Regex) -> Result<ParsedId, GatewayError> {
    let captures = re.captures(id).ok_or_else(|| GatewayError::InvalidId {
        id: id.to_string(),
        reason: "does not match '<conn>::<slave>::<co|di|hr|ir>:<addr>[::<count>]'".to_string(),
    })?;
    let slave = captures["slave"]
        .parse::<u8>()
        .map_err(|_| GatewayError::InvalidId {
            id: id.to_string(),
            reason: "invalid slave id".to_string(),
        })?;
    let addr = captures["addr"]
        .parse::<u16>()
        .map_err(|_| GatewayError::InvalidId {
            id: id.to_string(),
            reason: "invalid address".to_string(),
        })?;
    let count = match captures.name("count") {
        Some(raw) => raw.as_str().parse::<u16>().map_err(|_| GatewayError::InvalidId {
            id: id.to_string(),
            reason: "invalid count".to_string(),
        })?,
        None => 1,
    };
    Ok(ParsedId {
        conn_id: captures["conn"].to_string(),
        slave,
        obj_type: ObjectType::parse(&captures["obj"]),
        addr,
        count,
    })
}

/// The Modbus data module: a fixed set of named connections, each opened
/// fresh (connect, transact, close) for every request.
pub struct ModbusModule {
    connections: HashMap<String, ModbusConnectionConfig>,
}

impl ModbusModule {
    /// Builds a module from its `[modbus]` configuration table.
    #[must_use]
    pub fn new(config: ModbusModuleConfig) -> Self {
        let connections = config
            .conn
            .into_iter()
            .map(|conn| (conn.conn_id.clone(), conn))
            .collect();
        Self { connections }
    }

    fn lookup(&self, conn_id: &str) -> Result<&ModbusConnectionConfig, GatewayError> {
        self.connections
            .get(conn_id)
            .ok_or_else(|| GatewayError::NotFound(format!("modbus connection '{conn_id}'")))
    }

    /// Opens a fresh connection, with the framer the connection's config
    /// selects: `tcp.rtu` frames an RTU stream over a raw TCP socket
    /// instead of the Modbus/TCP MBAP header.
    async fn open(&self, conn: &ModbusConnectionConfig) -> Result<Context, GatewayError> {
        if let Some(tcp_cfg) = &conn.tcp {
            let socket_addr = format!("{}:{}", tcp_cfg.address, tcp_cfg.port)
                .parse()
                .map_err(|_| GatewayError::Configuration(format!(
                    "invalid modbus TCP address '{}:{}'",
                    tcp_cfg.address, tcp_cfg.port
                )))?;
            if tcp_cfg.rtu {
                let stream = TcpStream::connect(socket_addr).await.map_err(|err| GatewayError::Protocol {
                    id: conn.conn_id.clone(),
                    reason: format!("tcp connect failed: {err}"),
                })?;
                return Ok(rtu::attach_slave(stream, Slave(0)));
            }
            let ctx = tcp::connect_slave(socket_addr, Slave(0))
                .await
                .map_err(|err| GatewayError::Protocol {
                    id: conn.conn_id.clone(),
                    reason: format!("tcp connect failed: {err}"),
                })?;
            return Ok(ctx);
        }
        if let Some(serial_cfg) = &conn.serial {
            let builder = build_serial_port(conn, serial_cfg)?;
            let port = builder.open_native_async().map_err(|err| GatewayError::Protocol {
                id: conn.conn_id.clone(),
                reason: format!("serial open failed: {err}"),
            })?;
            return Ok(rtu::attach_slave(port, Slave(0)));
        }
        Err(GatewayError::Configuration(format!(
            "modbus connection '{}' has neither tcp nor serial configured",
            conn.conn_id
        )))
    }

    /// Runs `attempt` against a freshly opened connection, under `conn`'s
    /// per-attempt deadline, retrying up to `conn.retries` times on
    /// failure.
    async fn with_retries<T, F, Fut>(
        &self,
        conn: &ModbusConnectionConfig,
        mut attempt: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(Context) -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let deadline = Duration::from_millis(conn.timeout_ms);
        let mut last_err = GatewayError::Configuration("modbus connection has zero attempts configured".to_string());
        for _ in 0..=conn.retries {
            let outcome = tokio::time::timeout(deadline, async {
                let ctx = self.open(conn).await?;
                attempt(ctx).await
            })
            .await;
            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => last_err = err,
                Err(_) => {
                    last_err = GatewayError::Timeout {
                        id: conn.conn_id.clone(),
                        deadline_ms: conn.timeout_ms,
                    }
                }
            }
        }
        Err(last_err)
    }
}

fn build_serial_port(
    conn: &ModbusConnectionConfig,
    serial_cfg: &ModbusSerialConfig,
) -> Result<tokio_serial::SerialPortBuilder, GatewayError> {
    let data_bits = match serial_cfg.bytesize {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => {
            return Err(GatewayError::Configuration(format!(
                "modbus connection '{}': invalid serial bytesize {other}",
                conn.conn_id
            )))
        }
    };
    let parity = match serial_cfg.parity {
        'N' => Parity::None,
        'E' => Parity::Even,
        'O' => Parity::Odd,
        other => {
            return Err(GatewayError::Configuration(format!(
                "modbus connection '{}': invalid serial parity '{other}'",
                conn.conn_id
            )))
        }
    };
    let stop_bits = match serial_cfg.stopbits {
        1 => StopBits::One,
        2 => StopBits::Two,
        other => {
            return Err(GatewayError::Configuration(format!(
                "modbus connection '{}': invalid serial stopbits {other}",
                conn.conn_id
            )))
        }
    };
    Ok(tokio_serial::new(&serial_cfg.port, serial_cfg.baudrate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits))
}

#[async_trait]
impl DataModule for ModbusModule {
    fn name(&self) -> &'static str {
        "modbus"
    }

    async fn start(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
        let parsed = parse_id(id, &READ_ID_RE)?;
        let conn = self.lookup(&parsed.conn_id)?;
        tracing::debug!(conn = parsed.conn_id, slave = parsed.slave, addr = parsed.addr, count = parsed.count, "modbus read");

        let values = self
            .with_retries(conn, |mut ctx| {
                let parsed = &parsed;
                async move {
                    ctx.set_slave(Slave(parsed.slave));
                    let values: Vec<String> = match parsed.obj_type {
                        ObjectType::Coil => ctx
                            .read_coils(parsed.addr, parsed.count)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?
                            .into_iter()
                            .map(|bit| bit.to_string())
                            .collect(),
                        ObjectType::DiscreteInput => ctx
                            .read_discrete_inputs(parsed.addr, parsed.count)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?
                            .into_iter()
                            .map(|bit| bit.to_string())
                            .collect(),
                        ObjectType::HoldingRegister => ctx
                            .read_holding_registers(parsed.addr, parsed.count)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?
                            .into_iter()
                            .map(|reg| reg.to_string())
                            .collect(),
                        ObjectType::InputRegister => ctx
                            .read_input_registers(parsed.addr, parsed.count)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?
                            .into_iter()
                            .map(|reg| reg.to_string())
                            .collect(),
                    };
                    Ok(values)
                }
            })
            .await?;

        Ok(PointValue::from_values(values))
    }

    async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
        let parsed = parse_id(id, &WRITE_ID_RE)?;
        if parsed.count != 1 {
            return Err(GatewayError::InvalidValue {
                id: id.to_string(),
                value: value.to_string(),
                reason: "cannot write multiple values in one request".to_string(),
            });
        }
        let conn = self.lookup(&parsed.conn_id)?;
        tracing::debug!(conn = parsed.conn_id, slave = parsed.slave, addr = parsed.addr, value, "modbus write");

        match parsed.obj_type {
            ObjectType::Coil => {
                let on = parse_bool(id, value)?;
                self.with_retries(conn, |mut ctx| {
                    let parsed = &parsed;
                    async move {
                        ctx.set_slave(Slave(parsed.slave));
                        ctx.write_single_coil(parsed.addr, on)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?;
                        Ok(on.to_string())
                    }
                })
                .await
                .map(Some)
            }
            ObjectType::HoldingRegister => {
                let word = value.parse::<u16>().map_err(|_| GatewayError::InvalidValue {
                    id: id.to_string(),
                    value: value.to_string(),
                    reason: "not a valid u16 register value".to_string(),
                })?;
                self.with_retries(conn, |mut ctx| {
                    let parsed = &parsed;
                    async move {
                        ctx.set_slave(Slave(parsed.slave));
                        ctx.write_single_register(parsed.addr, word)
                            .await
                            .map_err(|err| protocol_err(&parsed.conn_id, err))?
                            .map_err(|ex| exception_err(&parsed.conn_id, ex))?;
                        Ok(word.to_string())
                    }
                })
                .await
                .map(Some)
            }
            ObjectType::DiscreteInput | ObjectType::InputRegister => Err(GatewayError::Unsupported {
                id: id.to_string(),
                operation: "write to a read-only object type".to_string(),
            }),
        }
    }
}

fn parse_bool(id: &str, value: &str) -> Result<bool, GatewayError> {
    match value {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        _ => Err(GatewayError::InvalidValue {
            id: id.to_string(),
            value: value.to_string(),
            reason: "not a valid boolean".to_string(),
        }),
    }
}

fn protocol_err(conn_id: &str, err: std::io::Error) -> GatewayError {
    GatewayError::Protocol {
        id: conn_id.to_string(),
        reason: format!("modbus transport error: {err}"),
    }
}

fn exception_err(conn_id: &str, exception: tokio_modbus::ExceptionCode) -> GatewayError {
    GatewayError::Protocol {
        id: conn_id.to_string(),
        reason: format!("modbus exception response: {exception}"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_parse_read_id_with_count() {
        let parsed = parse_id("plc1::3::hr:10::4", &READ_ID_RE).unwrap();
        assert_eq!(parsed.conn_id, "plc1");
        assert_eq!(parsed.slave, 3);
        assert_eq!(parsed.obj_type, ObjectType::HoldingRegister);
        assert_eq!(parsed.addr, 10);
        assert_eq!(parsed.count, 4);
    }

    #[rstest]
    fn test_parse_read_id_default_count() {
        let parsed = parse_id("plc1::1::co:0", &READ_ID_RE).unwrap();
        assert_eq!(parsed.count, 1);
    }

    #[rstest]
    fn test_parse_read_id_rejects_write_only_wrong_shape() {
        assert!(parse_id("plc1::1", &READ_ID_RE).is_err());
    }

    #[rstest]
    fn test_write_id_rejects_input_register() {
        assert!(parse_id("plc1::1::ir:0", &WRITE_ID_RE).is_err());
    }

    #[rstest]
    fn test_parse_bool_accepts_common_spellings() {
        assert!(parse_bool("x", "1").unwrap());
        assert!(parse_bool("x", "true").unwrap());
        assert!(!parse_bool("x", "0").unwrap());
        assert!(parse_bool("x", "yes").is_err());
    }

    #[test]
    fn test_lookup_unknown_connection_is_not_found() {
        let module = ModbusModule::new(ModbusModuleConfig::default());
        let err = module.lookup("nope").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
