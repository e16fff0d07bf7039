//! The HTTP/WebSocket transport, built on `axum`.

mod data;
mod schemes;
mod ws;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data/{module}", get(data::get_data).post(data::post_data))
        .route("/schemes/{scheme_id}", get(schemes::get_scheme))
        .route("/schemes/{scheme_id}/influx/{svg_id}", get(schemes::get_scheme_influx))
        .route("/ws/{module}", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
