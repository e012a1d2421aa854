//! Messages carried on the broker topics.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use shadow_core::{Alert, FlowEvent};

/// Node/edge upsert notification, kept intentionally small: WebSocket
/// clients treat any graph change as a hint to re-poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphChange {
    Node { id: String },
    Edge { source: String, target: String },
}

/// Response-manager lifecycle events, consumed by the analyzer to drive
/// the endpoint state machine without a direct reference back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseEvent {
    Blocked {
        ip: IpAddr,
        expires_at: DateTime<Utc>,
        reason: String,
    },
    Expired {
        ip: IpAddr,
    },
    Unblocked {
        ip: IpAddr,
    },
}

/// One message on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Flow(FlowEvent),
    Alert(Box<Alert>),
    Graph(GraphChange),
    Response(ResponseEvent),
}
