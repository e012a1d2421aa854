//! Active probe scheduler.
//!
//! Given a suspicious external destination, issues `OPTIONS /` then
//! `GET /v1/models` and classifies the target as an AI service from the
//! response shape. Every safety guard must pass before a single byte
//! leaves the host; failed guards skip silently and count.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ipnet::IpNet;
use reqwest::header::HeaderMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

use shadow_bus::{Broker, BusEvent, GraphChange, TOPIC_GRAPH_CHANGES};
use shadow_core::config::DefenseConfig;
use shadow_core::net;
use shadow_core::{AlertRing, NodeType};
use shadow_graph::{GraphStore, NodeUpsert};

use crate::response::ResponseManager;

const CONFIRMED_NOTE: &str = " [Active probe: confirmed AI service]";
const UNCONFIRMED_NOTE: &str = " [Active probe: unconfirmed]";
const MAX_INFLIGHT_PROBES: usize = 2;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("probe deadline exceeded")]
    Timeout,
}

/// One probe request handed over by the analyzer.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub ip: IpAddr,
    pub port: u16,
    /// Graph node to relabel on confirmation.
    pub node_id: String,
    pub alert_id: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct InterrogatorStats {
    pub probes_sent: u64,
    pub probes_skipped: u64,
    pub probes_failed: u64,
    pub probes_confirmed: u64,
}

pub struct Interrogator {
    client: reqwest::Client,
    cooldowns: Mutex<HashMap<IpAddr, Instant>>,
    window: Mutex<VecDeque<Instant>>,
    inflight: Arc<Semaphore>,
    cooldown: Duration,
    rate_per_minute: usize,
    deadline: Duration,
    local_nets: Vec<IpNet>,
    responses: Arc<ResponseManager>,
    graph: Arc<RwLock<GraphStore>>,
    alerts: Arc<AlertRing>,
    bus: Arc<Broker>,
    sent: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    confirmed: AtomicU64,
}

impl Interrogator {
    pub fn new(
        config: &DefenseConfig,
        local_nets: Vec<IpNet>,
        responses: Arc<ResponseManager>,
        graph: Arc<RwLock<GraphStore>>,
        alerts: Arc<AlertRing>,
        bus: Arc<Broker>,
    ) -> Self {
        let client = reqwest::Client::builder()
            // Probes hit bare IPs; certificate names will never match.
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            cooldowns: Mutex::new(HashMap::new()),
            window: Mutex::new(VecDeque::new()),
            inflight: Arc::new(Semaphore::new(MAX_INFLIGHT_PROBES)),
            cooldown: Duration::from_secs(config.probe_cooldown_secs),
            rate_per_minute: config.probe_rate_per_minute,
            deadline: Duration::from_secs(config.probe_timeout_secs),
            local_nets,
            responses,
            graph,
            alerts,
            bus,
            sent: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            confirmed: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> InterrogatorStats {
        InterrogatorStats {
            probes_sent: self.sent.load(Ordering::Relaxed),
            probes_skipped: self.skipped.load(Ordering::Relaxed),
            probes_failed: self.failed.load(Ordering::Relaxed),
            probes_confirmed: self.confirmed.load(Ordering::Relaxed),
        }
    }

    /// Evaluate the safety guards; on pass, reserve a cooldown slot and a
    /// rate token and dispatch the probe onto the bounded worker pool.
    pub fn request_probe(self: &Arc<Self>, target: ProbeTarget) {
        if !self.guards_pass(&target) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(ip = %target.ip, "probe skipped by safety guards");
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            let Ok(_permit) = this.inflight.acquire().await else {
                return;
            };
            this.sent.fetch_add(1, Ordering::Relaxed);
            match tokio::time::timeout(this.deadline, this.probe(&target)).await {
                Ok(Ok(confirmed)) => this.conclude(&target, confirmed).await,
                Ok(Err(e)) => {
                    this.failed.fetch_add(1, Ordering::Relaxed);
                    debug!(ip = %target.ip, error = %e, "probe failed");
                }
                Err(_) => {
                    this.failed.fetch_add(1, Ordering::Relaxed);
                    debug!(ip = %target.ip, "probe timed out");
                }
            }
        });
    }

    fn guards_pass(&self, target: &ProbeTarget) -> bool {
        let ip = target.ip;
        if net::is_internal(ip, &self.local_nets)
            || net::is_multicast(ip)
            || net::is_loopback(ip)
        {
            return false;
        }
        if self.responses.is_blocked(ip) {
            return false;
        }

        let now = Instant::now();
        {
            let mut cooldowns = self.cooldowns.lock().unwrap();
            if let Some(last) = cooldowns.get(&ip) {
                if now.duration_since(*last) < self.cooldown {
                    return false;
                }
            }
            cooldowns.insert(ip, now);
        }

        self.try_take_token(now)
    }

    /// Rolling one-minute token window. At the limit, the next probe in
    /// the same window is dropped.
    fn try_take_token(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= Duration::from_secs(60) {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.rate_per_minute {
            return false;
        }
        window.push_back(now);
        true
    }

    async fn probe(&self, target: &ProbeTarget) -> Result<bool, ProbeError> {
        let scheme = if target.port == 443 { "https" } else { "http" };
        let base = match target.ip {
            IpAddr::V4(v4) => format!("{scheme}://{v4}:{}", target.port),
            IpAddr::V6(v6) => format!("{scheme}://[{v6}]:{}", target.port),
        };

        let options = self.client.request(reqwest::Method::OPTIONS, format!("{base}/")).send().await?;
        if is_ai_vendor_headers(options.headers()) {
            return Ok(true);
        }

        let models = self.client.get(format!("{base}/v1/models")).send().await?;
        if is_ai_vendor_headers(models.headers()) {
            return Ok(true);
        }
        let body = models.text().await?;
        Ok(is_models_listing(&body))
    }

    async fn conclude(&self, target: &ProbeTarget, confirmed: bool) {
        if confirmed {
            self.confirmed.fetch_add(1, Ordering::Relaxed);
            info!(ip = %target.ip, node = %target.node_id, "active probe confirmed AI service");
            self.alerts.annotate(&target.alert_id, CONFIRMED_NOTE);

            let seen = chrono::Utc::now();
            let mut graph = self.graph.write().await;
            let up = NodeUpsert::observed(NodeType::Shadow, seen);
            match graph.upsert_node(&target.node_id, &up) {
                Ok(_) => {
                    self.bus.publish(
                        TOPIC_GRAPH_CHANGES,
                        BusEvent::Graph(GraphChange::Node {
                            id: target.node_id.clone(),
                        }),
                    );
                }
                Err(e) => warn!(node = %target.node_id, error = %e, "shadow relabel failed"),
            }
        } else {
            self.alerts.annotate(&target.alert_id, UNCONFIRMED_NOTE);
        }
    }
}

/// AI vendor marker headers (`openai-*`, `anthropic-request-id`).
pub fn is_ai_vendor_headers(headers: &HeaderMap) -> bool {
    headers.keys().any(|name| {
        let name = name.as_str();
        name.starts_with("openai-") || name == "anthropic-request-id"
    })
}

/// True when `body` looks like a model listing: a JSON array of objects
/// with `id` fields, either at the top level or under `data`.
pub fn is_models_listing(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let array = match &value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => match map.get("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return false,
        },
        _ => return false,
    };
    !array.is_empty()
        && array
            .iter()
            .all(|item| item.as_object().is_some_and(|o| o.contains_key("id")))
}
