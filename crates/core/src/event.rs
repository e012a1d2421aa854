use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport/application protocol of an observed flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Http,
    Https,
    Dns,
    Other,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Https => write!(f, "HTTPS"),
            Protocol::Dns => write!(f, "DNS"),
            Protocol::Other => write!(f, "OTHER"),
        }
    }
}

/// Node classification in the network graph.
///
/// The type lattice only moves toward `Shadow`: once an external endpoint
/// is confirmed (or strongly suspected) to host a Shadow AI service it
/// stays `Shadow` until an explicit graph reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Internal,
    External,
    Shadow,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Internal => write!(f, "internal"),
            NodeType::External => write!(f, "external"),
            NodeType::Shadow => write!(f, "shadow"),
        }
    }
}

/// One aggregated flow record, produced by a source adapter.
///
/// Immutable once published to the bus. `source_port`/`destination_port`
/// of 0 mean "not applicable" (e.g. pure DNS records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub timestamp: DateTime<Utc>,
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: Protocol,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// 32-hex JA3 fingerprint for TLS client handshakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja3_hash: Option<String>,
    /// Open string map. Recognized keys: `host`, `sni`, `dns_query`,
    /// `user_agent`, `persona`, `duration_ms`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl FlowEvent {
    pub fn host(&self) -> Option<&str> {
        self.metadata.get("host").map(String::as_str)
    }

    pub fn sni(&self) -> Option<&str> {
        self.metadata.get("sni").map(String::as_str)
    }

    pub fn dns_query(&self) -> Option<&str> {
        self.metadata.get("dns_query").map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.metadata.get("user_agent").map(String::as_str)
    }

    pub fn persona(&self) -> Option<&str> {
        self.metadata.get("persona").map(String::as_str)
    }

    /// Observed flow-window span in milliseconds, when the source reports it.
    pub fn duration_ms(&self) -> f64 {
        self.metadata
            .get("duration_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }

    /// Best display name for the destination: HTTP Host, then TLS SNI,
    /// then the bare IP literal.
    pub fn destination_label(&self) -> String {
        self.host()
            .or_else(|| self.sni())
            .map(str::to_string)
            .unwrap_or_else(|| self.destination_ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_meta(pairs: &[(&str, &str)]) -> FlowEvent {
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: "10.0.0.5".parse().unwrap(),
            destination_ip: "104.18.32.7".parse().unwrap(),
            source_port: 51234,
            destination_port: 443,
            protocol: Protocol::Https,
            bytes_sent: 2048,
            bytes_received: 4096,
            ja3_hash: None,
            metadata: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn destination_label_prefers_host_over_sni() {
        let e = event_with_meta(&[("host", "api.openai.com"), ("sni", "cdn.openai.com")]);
        assert_eq!(e.destination_label(), "api.openai.com");

        let e = event_with_meta(&[("sni", "cdn.openai.com")]);
        assert_eq!(e.destination_label(), "cdn.openai.com");

        let e = event_with_meta(&[]);
        assert_eq!(e.destination_label(), "104.18.32.7");
    }

    #[test]
    fn protocol_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Protocol::Https).unwrap(), "\"HTTPS\"");
        assert_eq!(serde_json::to_string(&Protocol::Dns).unwrap(), "\"DNS\"");
    }

    #[test]
    fn flow_event_serde_roundtrip() {
        let e = event_with_meta(&[("sni", "api.openai.com")]);
        let json = serde_json::to_string(&e).unwrap();
        let back: FlowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.destination_ip, e.destination_ip);
        assert_eq!(back.sni(), Some("api.openai.com"));
        assert_eq!(back.protocol, Protocol::Https);
    }
}
