//! Minimal client forwarding scheme element `influx_query`s to the external
//! time-series store; kept deliberately thin, present only so the
//! workspace is runnable end to end.

use conduit_core::GatewayError;

/// Thin `reqwest` wrapper over one InfluxDB base URL.
pub struct InfluxClient {
    http: reqwest::Client,
    base_url: String,
}

impl InfluxClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Issues `query` against the store, requesting CSV output, and returns
    /// the response body verbatim.
    pub async fn query_csv(&self, query: &str, limit: &str) -> Result<String, GatewayError> {
        let response = self
            .http
            .get(format!("{}/query", self.base_url))
            .header("Accept", "application/csv")
            .query(&[("q", query), ("epoch", "ms"), ("limit", limit)])
            .send()
            .await
            .map_err(|err| GatewayError::Protocol {
                id: query.to_string(),
                reason: format!("influx request failed: {err}"),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Protocol {
                id: query.to_string(),
                reason: format!("influx returned status {}", response.status()),
            });
        }

        response.text().await.map_err(|err| GatewayError::Protocol {
            id: query.to_string(),
            reason: format!("could not read influx response body: {err}"),
        })
    }
}
