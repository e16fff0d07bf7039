//! `GET`/`POST /data/{module}`.

use std::collections::HashMap;

use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use conduit_core::{GatewayError, PointValue};

use crate::{error::ApiError, state::AppState};

/// `axum::extract::Query` deserializes repeated keys into a `Vec` only
/// with a form-encoding crate this workspace doesn't depend on, so
/// `data_id=a&data_id=b` is parsed by hand from the raw query string using
/// `url`'s form-encoding decoder (already a workspace dependency).
fn parse_data_ids(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    url::form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| key == "data_id")
        .map(|(_, value)| value.into_owned())
        .collect()
}

pub async fn get_data(
    State(state): State<AppState>,
    Path(module): Path<String>,
    RawQuery(raw): RawQuery,
) -> Result<Json<HashMap<String, PointValue>>, ApiError> {
    let data_ids = parse_data_ids(raw.as_deref());
    if data_ids.is_empty() {
        return Err(ApiError(GatewayError::InvalidId {
            id: String::new(),
            reason: "at least one data_id query parameter is required".to_string(),
        }));
    }
    let values = state.controller.get_values(&module, &data_ids).await?;
    Ok(Json(values))
}

pub async fn post_data(
    State(state): State<AppState>,
    Path(module): Path<String>,
    Json(body): Json<HashMap<String, String>>,
) -> Result<Json<HashMap<String, Option<String>>>, ApiError> {
    if body.is_empty() {
        return Err(ApiError(GatewayError::InvalidValue {
            id: String::new(),
            value: String::new(),
            reason: "request body must contain at least one id".to_string(),
        }));
    }
    let result = state.controller.set_values(&module, &body).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_parse_data_ids_collects_repeated_keys() {
        let ids = parse_data_ids(Some("data_id=a&data_id=b&other=x"));
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[rstest]
    fn test_parse_data_ids_empty_on_missing_query() {
        assert!(parse_data_ids(None).is_empty());
    }

    #[rstest]
    fn test_parse_data_ids_decodes_percent_encoding() {
        let ids = parse_data_ids(Some("data_id=room1%3A%3Aint"));
        assert_eq!(ids, vec!["room1::int".to_string()]);
    }
}
