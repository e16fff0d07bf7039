//! Top-level gateway configuration: the tree-shaped file (or
//! directory of files) loaded at startup and used to build every data
//! module plus the scheme resolver/renderer.

use std::sync::Arc;

use conduit_bacnet::{config::BacnetModuleConfig, BacnetModule};
use conduit_core::GatewayError;
use conduit_data::{DataController, DataModule};
use conduit_modbus::{config::ModbusModuleConfig, ModbusModule};
use conduit_random::RandomModule;
use conduit_scheme::{ElementConfig, ElementGroupConfig, SchemeConfig, SchemeRenderer, SchemeResolver};
use conduit_snmp::{config::SnmpModuleConfig, SnmpModule};
use serde::Deserialize;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// `(host, port, debug, influx_db, schemes_dir, bacnet?, modbus?, snmp?,
/// scheme_element_template[], scheme_element_group[], scheme[])`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub influx_db: Option<String>,
    pub schemes_dir: String,
    #[serde(default)]
    pub bacnet: Option<BacnetModuleConfig>,
    #[serde(default)]
    pub modbus: Option<ModbusModuleConfig>,
    #[serde(default)]
    pub snmp: Option<SnmpModuleConfig>,
    #[serde(default)]
    pub scheme_element_template: Vec<ElementConfig>,
    #[serde(default)]
    pub scheme_element_group: Vec<ElementGroupConfig>,
    #[serde(default)]
    pub scheme: Vec<SchemeConfig>,
}

/// Everything built from [`GatewayConfig`] at process startup: the module
/// registry, the resolved scheme index, and the renderer.
pub struct Gateway {
    pub controller: Arc<DataController>,
    pub resolver: Arc<SchemeResolver>,
    pub renderer: Arc<SchemeRenderer>,
    pub influx_db: Option<String>,
}

impl GatewayConfig {
    /// Builds the module registry and scheme resolver/renderer. The random
    /// module is always present;
    /// BACnet/Modbus/SNMP are present only when configured.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let mut modules: Vec<Arc<dyn DataModule>> = vec![Arc::new(RandomModule::new())];
        if let Some(config) = self.bacnet {
            modules.push(Arc::new(BacnetModule::new(config)));
        }
        if let Some(config) = self.modbus {
            modules.push(Arc::new(ModbusModule::new(config)));
        }
        if let Some(config) = self.snmp {
            modules.push(Arc::new(SnmpModule::new(config.resolve()?)));
        }
        let controller = Arc::new(DataController::new(modules));

        let resolver = Arc::new(SchemeResolver::new(
            self.scheme_element_template,
            self.scheme_element_group,
            self.scheme,
        )?);
        let renderer = Arc::new(SchemeRenderer::new(self.schemes_dir));

        Ok(Gateway {
            controller,
            resolver,
            renderer,
            influx_db: self.influx_db,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_minimal_config_builds_with_only_the_random_module() {
        let config = GatewayConfig {
            host: default_host(),
            port: default_port(),
            debug: false,
            influx_db: None,
            schemes_dir: "/tmp".to_string(),
            bacnet: None,
            modbus: None,
            snmp: None,
            scheme_element_template: vec![],
            scheme_element_group: vec![],
            scheme: vec![],
        };
        assert!(config.build().is_ok());
    }
}
