//! WebSocket alert stream.
//!
//! On connect the server subscribes to the alert and graph-change topics
//! and forwards small envelopes: `{type:"alert",payload}` for alerts and
//! `{type:"graph"}` as a re-poll hint. Client-to-server content is
//! ignored but counts as liveness; idle connections close after 90 s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::debug;

use shadow_bus::{BusEvent, TOPIC_ALERTS, TOPIC_GRAPH_CHANGES};
use shadow_core::Alert;

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WsMessage<'a> {
    Alert { payload: &'a Alert },
    Graph,
    Ping,
}

fn ws_json(msg: &WsMessage<'_>) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let bus = &state.ctx.bus;
    let (alert_token, mut alert_rx) = bus.subscribe_channel(TOPIC_ALERTS, 256);
    let (graph_token, mut graph_rx) = bus.subscribe_channel(TOPIC_GRAPH_CHANGES, 256);

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            maybe = alert_rx.recv() => {
                let Some(event) = maybe else { break };
                if let BusEvent::Alert(alert) = event.as_ref() {
                    let text = ws_json(&WsMessage::Alert { payload: alert });
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
            maybe = graph_rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                if sender.send(Message::Text(ws_json(&WsMessage::Graph).into())).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => last_inbound = Instant::now(),
                    Some(Err(_)) => break,
                }
            }
            _ = ping.tick() => {
                if last_inbound.elapsed() >= IDLE_TIMEOUT {
                    debug!("closing idle websocket");
                    break;
                }
                if sender.send(Message::Text(ws_json(&WsMessage::Ping).into())).await.is_err() {
                    break;
                }
            }
        }
    }

    bus.unsubscribe(alert_token);
    bus.unsubscribe(graph_token);
}
