//! The data controller: dispatches a request to the named
//! module, collapses single-point calls, and routes subscription
//! lifecycle. Stateless across requests; per-subscriber bookkeeping lives
//! in the external transport.

use std::collections::HashMap;

use conduit_core::{GatewayError, PointValue};
use indexmap::IndexMap;

use crate::module::{CovCallback, DataModule};

/// The process-wide, immutable-after-startup module registry plus the
/// request dispatch logic built on top of it.
pub struct DataController {
    modules: IndexMap<&'static str, std::sync::Arc<dyn DataModule>>,
}

impl DataController {
    /// Builds a controller over `modules`. Order is preserved for
    /// `start`/`stop`; `stop` runs in reverse.
    #[must_use]
    pub fn new(modules: Vec<std::sync::Arc<dyn DataModule>>) -> Self {
        let mut map = IndexMap::with_capacity(modules.len());
        for module in modules {
            map.insert(module.name(), module);
        }
        Self { modules: map }
    }

    /// Starts every module, in registration order.
    pub async fn start(&self) -> Result<(), GatewayError> {
        for module in self.modules.values() {
            tracing::debug!(module = module.name(), "starting data module");
            module.start().await?;
        }
        Ok(())
    }

    /// Stops every module, in reverse registration order.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        for module in self.modules.values().rev() {
            tracing::debug!(module = module.name(), "stopping data module");
            module.stop().await?;
        }
        Ok(())
    }

    fn lookup(&self, module: &str) -> Result<&std::sync::Arc<dyn DataModule>, GatewayError> {
        self.modules
            .get(module)
            .ok_or_else(|| GatewayError::NotFound(format!("data module '{module}'")))
    }

    /// Reads `data_ids` from `module`. A single id collapses to
    /// [`DataModule::get_value`]; more than one uses the batched API.
    pub async fn get_values(
        &self,
        module: &str,
        data_ids: &[String],
    ) -> Result<HashMap<String, PointValue>, GatewayError> {
        let module = self.lookup(module)?;
        if data_ids.len() == 1 {
            let value = module.get_value(&data_ids[0]).await?;
            let mut result = HashMap::with_capacity(1);
            result.insert(data_ids[0].clone(), value);
            return Ok(result);
        }
        module.get_value_multiple(data_ids).await
    }

    /// Writes `data` to `module`. A single pair collapses to
    /// [`DataModule::set_value`]; more than one uses the batched API.
    pub async fn set_values(
        &self,
        module: &str,
        data: &HashMap<String, String>,
    ) -> Result<HashMap<String, Option<String>>, GatewayError> {
        let module = self.lookup(module)?;
        if data.len() == 1 {
            let (id, value) = data.iter().next().expect("len checked above");
            let echoed = module.set_value(id, value).await?;
            let mut result = HashMap::with_capacity(1);
            result.insert(id.clone(), echoed);
            return Ok(result);
        }
        let pairs: Vec<(String, String)> = data
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();
        module.set_value_multiple(&pairs).await
    }

    /// Routes a subscription request to `module`.
    pub async fn register_cov(
        &self,
        module: &str,
        data_id: &str,
        subscriber_id: &str,
        callback: CovCallback,
    ) -> Result<bool, GatewayError> {
        let module = self.lookup(module)?;
        module.register_cov(data_id, subscriber_id, callback).await
    }

    /// Routes an unsubscribe request to `module`.
    pub async fn remove_cov(
        &self,
        module: &str,
        data_id: &str,
        subscriber_id: &str,
    ) -> Result<(), GatewayError> {
        let module = self.lookup(module)?;
        module.remove_cov(data_id, subscriber_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;

    struct EchoModule(&'static str);

    #[async_trait]
    impl DataModule for EchoModule {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn start(&self) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn get_value(&self, id: &str) -> Result<PointValue, GatewayError> {
            Ok(PointValue::Single(id.to_string()))
        }

        async fn set_value(&self, id: &str, value: &str) -> Result<Option<String>, GatewayError> {
            Ok(Some(format!("{id}:{value}")))
        }
    }

    fn controller() -> DataController {
        DataController::new(vec![Arc::new(EchoModule("random"))])
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_values_single_collapses() {
        let ids = vec!["t1".to_string()];
        let result = controller().get_values("random", &ids).await.unwrap();
        assert_eq!(result.get("t1"), Some(&PointValue::Single("t1".to_string())));
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_values_unknown_module_is_not_found() {
        let ids = vec!["t1".to_string()];
        let err = controller().get_values("nope", &ids).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[rstest]
    #[tokio::test]
    async fn test_set_values_multi_uses_batched_path() {
        let mut data = HashMap::new();
        data.insert("a".to_string(), "1".to_string());
        data.insert("b".to_string(), "2".to_string());
        let result = controller().set_values("random", &data).await.unwrap();
        assert_eq!(result.len(), 2);
    }
}
