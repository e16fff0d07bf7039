//! Shared process state handed to every `axum` handler.

use std::sync::Arc;

use conduit_data::DataController;
use conduit_scheme::{SchemeRenderer, SchemeResolver};

use crate::influx::InfluxClient;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DataController>,
    pub resolver: Arc<SchemeResolver>,
    pub renderer: Arc<SchemeRenderer>,
    pub influx: Option<Arc<InfluxClient>>,
}
