use std::sync::Arc;
use futures::{StreamExt, SinkExt};
use serde_json::json;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio::sync::{Mutex, mpsc};

use crate::dynamics::VehicleInput;
use crate::race::RaceSession;
use crate::state::SharedGameState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind websocket listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------
// INCOMING CLIENT MESSAGE
// ---------------------------------------------
#[derive(Debug)]
struct ClientMessage {
    msg_type: String,
    input: VehicleInput,
}

impl ClientMessage {
    fn from_json(txt: &str) -> Option<Self> {
        let v = serde_json::from_str::<serde_json::Value>(txt).ok()?;
        let axis = |key: &str| v.get(key).and_then(|x| x.as_f64()).unwrap_or(0.0) as f32;
        let flag = |key: &str| v.get(key).and_then(|x| x.as_bool()).unwrap_or(false);

        Some(ClientMessage {
            msg_type: v.get("type")?.as_str()?.to_string(),
            input: VehicleInput {
                throttle: axis("throttle"),
                brake: axis("brake"),
                steering: axis("steer"),
                handbrake: flag("handbrake"),
                gear_up: flag("gear_up"),
                gear_down: flag("gear_down"),
            },
        })
    }
}

pub async fn start_websocket_server(
    bind_addr: String,
    state: Arc<Mutex<SharedGameState>>,
    race: Arc<Mutex<RaceSession>>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

    tracing::info!(addr = %bind_addr, "websocket listening");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(%err, "accept failed");
                continue;
            }
        };
        tracing::debug!(%peer, "tcp connection");

        tokio::spawn(handle_client(raw, Arc::clone(&state), Arc::clone(&race)));
    }
}

async fn handle_client(raw: TcpStream, state: Arc<Mutex<SharedGameState>>, race: Arc<Mutex<RaceSession>>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            tracing::warn!(%err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing message channel
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client_id = state.lock().await.register_client(tx.clone());

    // -------------------------------
    // 2) Send loop
    // -------------------------------
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 3) Grid slot for this client
    // -------------------------------
    let name = format!("player-{}", &client_id.simple().to_string()[..8]);
    let driver_id = race.lock().await.add_player(name.clone());
    match driver_id {
        Some(id) => {
            state.lock().await.bind_driver(client_id, id);
            tracing::info!(client = %client_id, driver = id, "player connected");
        }
        None => tracing::info!(client = %client_id, "grid full, spectating"),
    }

    let welcome = json!({
        "type": "welcome",
        "client_id": client_id.to_string(),
        "driver_id": driver_id,
        "name": name,
    });
    let _ = tx.send(welcome.to_string());

    // -------------------------------
    // 4) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };

        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let text = match msg.to_text() {
            Ok(t) => t,
            Err(_) => continue,
        };

        let parsed = match ClientMessage::from_json(text) {
            Some(v) => v,
            None => continue,
        };

        match parsed.msg_type.as_str() {
            "ping" => {
                let _ = tx.send(json!({ "type": "pong" }).to_string());
            }
            "input" => {
                if let Some(id) = driver_id {
                    race.lock().await.set_player_input(id, parsed.input);
                }
            }
            other => tracing::debug!(client = %client_id, msg_type = other, "ignored message"),
        }
    }

    tracing::info!(client = %client_id, "player disconnected");
    let driver = state.lock().await.remove_client(&client_id);
    if let Some(id) = driver {
        race.lock().await.remove_driver(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_with_missing_fields_as_neutral() {
        let msg = ClientMessage::from_json(r#"{"type":"input","throttle":0.8,"steer":-0.5,"handbrake":true}"#)
            .unwrap();
        assert_eq!(msg.msg_type, "input");
        assert_eq!(msg.input.throttle, 0.8);
        assert_eq!(msg.input.steering, -0.5);
        assert_eq!(msg.input.brake, 0.0);
        assert!(msg.input.handbrake);
        assert!(!msg.input.gear_up);
    }

    #[test]
    fn rejects_untyped_or_invalid_json() {
        assert!(ClientMessage::from_json(r#"{"throttle":1}"#).is_none());
        assert!(ClientMessage::from_json("not json").is_none());
    }
}
