//! Auto-response blocklist with TTL eviction.
//!
//! In-process policy registry: the effect of an entry is advisory, but
//! its lifecycle events feed back into the analyzer over the bus so the
//! endpoint state machine can track quarantine without a direct
//! reference cycle.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use shadow_bus::{Broker, BusEvent, ResponseEvent, TOPIC_RESPONSES};
use shadow_core::net;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct BlocklistEntry {
    pub ip: IpAddr,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_alert_id: Option<String>,
}

pub struct ResponseManager {
    entries: Mutex<HashMap<IpAddr, BlocklistEntry>>,
    safe_ips: Vec<IpAddr>,
    default_ttl_secs: u64,
    bus: Arc<Broker>,
}

impl ResponseManager {
    pub fn new(bus: Arc<Broker>, safe_ips: Vec<IpAddr>, default_ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            safe_ips,
            default_ttl_secs,
            bus,
        }
    }

    /// Addresses that must never be blocked regardless of alerts.
    fn is_safe(&self, ip: IpAddr) -> bool {
        net::is_loopback(ip) || net::is_multicast(ip) || net::is_broadcast(ip)
            || self.safe_ips.contains(&ip)
    }

    /// Insert or refresh a block. Returns the entry, or `None` when the
    /// address is on the safe list.
    pub fn block(
        &self,
        ip: IpAddr,
        ttl: Option<Duration>,
        reason: impl Into<String>,
        source_alert_id: Option<String>,
    ) -> Option<BlocklistEntry> {
        if self.is_safe(ip) {
            warn!(%ip, "refusing to block safe-listed address");
            return None;
        }

        let now = Utc::now();
        let ttl_secs = ttl.map(|d| d.as_secs()).unwrap_or(self.default_ttl_secs);
        let entry = BlocklistEntry {
            ip,
            inserted_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
            reason: reason.into(),
            source_alert_id,
        };

        self.entries.lock().unwrap().insert(ip, entry.clone());
        info!(%ip, ttl_secs, reason = %entry.reason, "address blocked");
        self.bus.publish(
            TOPIC_RESPONSES,
            BusEvent::Response(ResponseEvent::Blocked {
                ip,
                expires_at: entry.expires_at,
                reason: entry.reason.clone(),
            }),
        );
        Some(entry)
    }

    /// True iff an unexpired entry exists. Expired entries encountered on
    /// the way are treated as absent (the sweeper removes them later).
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&ip)
            .map(|e| e.expires_at > Utc::now())
            .unwrap_or(false)
    }

    /// Unexpired entries only.
    pub fn list_blocked(&self) -> Vec<BlocklistEntry> {
        let now = Utc::now();
        let entries = self.entries.lock().unwrap();
        let mut out: Vec<BlocklistEntry> = entries
            .values()
            .filter(|e| e.expires_at > now)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.inserted_at);
        out
    }

    pub fn unblock(&self, ip: IpAddr) -> bool {
        let removed = self.entries.lock().unwrap().remove(&ip).is_some();
        if removed {
            info!(%ip, "address unblocked");
            self.bus.publish(
                TOPIC_RESPONSES,
                BusEvent::Response(ResponseEvent::Unblocked { ip }),
            );
        }
        removed
    }

    /// Remove expired entries, publishing an event per eviction. The lock
    /// is held only for the removal itself.
    pub fn sweep(&self) {
        let now = Utc::now();
        let expired: Vec<IpAddr> = {
            let mut entries = self.entries.lock().unwrap();
            let dead: Vec<IpAddr> = entries
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(ip, _)| *ip)
                .collect();
            for ip in &dead {
                entries.remove(ip);
            }
            dead
        };

        for ip in expired {
            info!(%ip, "block expired");
            self.bus.publish(
                TOPIC_RESPONSES,
                BusEvent::Response(ResponseEvent::Expired { ip }),
            );
        }
    }

    /// Background eviction loop.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => manager.sweep(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
