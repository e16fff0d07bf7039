//! `GET /schemes/{scheme_id}` and `GET /schemes/{scheme_id}/influx/{svg_id}`.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use conduit_core::GatewayError;

use crate::{error::ApiError, state::AppState};

pub async fn get_scheme(
    State(state): State<AppState>,
    Path(scheme_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let svg = state
        .renderer
        .build_svg(&state.resolver, &scheme_id, &state.controller)
        .await?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

#[derive(serde::Deserialize)]
pub struct InfluxQuery {
    #[serde(default = "default_limit")]
    limit: String,
}

fn default_limit() -> String {
    "-1h".to_string()
}

pub async fn get_scheme_influx(
    State(state): State<AppState>,
    Path((scheme_id, svg_id)): Path<(String, String)>,
    Query(query): Query<InfluxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let element = state.resolver.get_element(&scheme_id, &svg_id)?;
    let influx = state.influx.as_ref().ok_or_else(|| GatewayError::Configuration(
        "no influx_db configured".to_string(),
    ))?;
    let csv = influx.query_csv(&element.influx_query, &query.limit).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv))
}
