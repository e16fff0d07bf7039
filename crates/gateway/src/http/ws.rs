//! `ws://.../ws/{module}` command surface: `get`/`set`/`cov` text
//! frames, with subscription cleanup on disconnect.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use conduit_core::PointValue;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(module): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, module))
}

#[derive(Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum Command {
    Get { data_ids: Vec<String> },
    Set { data: std::collections::HashMap<String, String> },
    Cov { data_ids: Vec<String> },
}

async fn handle_socket(socket: WebSocket, state: AppState, module: String) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();

    let forward = tokio::spawn(async move {
        while let Some(value) = out_rx.recv().await {
            if sender.send(Message::Text(value.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let subscriptions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let reply = handle_command(&state, &module, &text, &out_tx, &subscriptions).await;
        if let Some(reply) = reply {
            if out_tx.send(reply).is_err() {
                break;
            }
        }
    }

    for subscriber_id in subscriptions.lock().unwrap().drain(..).collect::<Vec<_>>() {
        // subscriber_id encodes its own data_id as `"{data_id}#{uuid}"` so
        // cleanup does not need a second table kept in lockstep.
        if let Some((data_id, subscriber_id)) = subscriber_id.split_once('#') {
            let _ = state.controller.remove_cov(&module, data_id, subscriber_id).await;
        }
    }

    drop(out_tx);
    let _ = forward.await;
}

async fn handle_command(
    state: &AppState,
    module: &str,
    text: &str,
    out_tx: &tokio::sync::mpsc::UnboundedSender<Value>,
    subscriptions: &Arc<Mutex<Vec<String>>>,
) -> Option<Value> {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(_) => return Some(invalid_command_or_message(text)),
    };

    match command {
        Command::Get { data_ids } => match state.controller.get_values(module, &data_ids).await {
            Ok(values) => Some(serde_json::to_value(values).unwrap_or_else(|_| json!({}))),
            Err(err) => Some(json!({ "status": err.status_code(), "detail": err.to_string() })),
        },
        Command::Set { data } => match state.controller.set_values(module, &data).await {
            Ok(result) => Some(serde_json::to_value(result).unwrap_or_else(|_| json!({}))),
            Err(err) => Some(json!({ "status": err.status_code(), "detail": err.to_string() })),
        },
        Command::Cov { data_ids } => {
            for data_id in data_ids {
                let reply = subscribe_one(state, module, &data_id, out_tx.clone(), subscriptions).await;
                if out_tx.send(reply).is_err() {
                    break;
                }
            }
            None
        }
    }
}

async fn subscribe_one(
    state: &AppState,
    module: &str,
    data_id: &str,
    out_tx: tokio::sync::mpsc::UnboundedSender<Value>,
    subscriptions: &Arc<Mutex<Vec<String>>>,
) -> Value {
    let subscriber_id = uuid::Uuid::new_v4().to_string();
    let callback: conduit_data::module::CovCallback = {
        let out_tx = out_tx.clone();
        Arc::new(move |id: String, value: PointValue| {
            let out_tx = out_tx.clone();
            Box::pin(async move {
                out_tx
                    .send(json!({ id: value }))
                    .map_err(|err| err.to_string())
            })
        })
    };

    match state.controller.register_cov(module, data_id, &subscriber_id, callback).await {
        Ok(true) => {
            subscriptions
                .lock()
                .unwrap()
                .push(format!("{data_id}#{subscriber_id}"));
            json!({ "status": 200, "detail": "Subscribed" })
        }
        Ok(false) => json!({ "status": 403, "detail": "Module does not support COV messages" }),
        Err(err) => json!({ "status": err.status_code(), "detail": err.to_string() }),
    }
}

fn invalid_command_or_message(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => match obj.get("command").and_then(Value::as_str) {
            Some(command) => json!({ "status": 400, "detail": format!("Invalid command '{command}'") }),
            None => json!({ "status": 400, "detail": "Invalid message" }),
        },
        _ => json!({ "status": 400, "detail": "Invalid message" }),
    }
}
