//! Rolling flow-window assembly.
//!
//! Packets are aggregated per 5-tuple; a packet matching the reverse
//! tuple is credited to the initiator's receive side. When a flow's
//! window elapses it is flushed as one [`FlowEvent`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::Utc;

use shadow_core::net;
use shadow_core::{FlowEvent, Protocol};

use crate::decode::{Packet, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::inspect;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlowKey {
    src: IpAddr,
    dst: IpAddr,
    sport: u16,
    dport: u16,
    proto: u8,
}

impl FlowKey {
    fn reversed(&self) -> FlowKey {
        FlowKey {
            src: self.dst,
            dst: self.src,
            sport: self.dport,
            dport: self.sport,
            proto: self.proto,
        }
    }
}

#[derive(Debug, Default)]
struct AppMeta {
    host: Option<String>,
    sni: Option<String>,
    ja3: Option<String>,
    dns_query: Option<String>,
    user_agent: Option<String>,
    saw_tls: bool,
    saw_http: bool,
}

struct FlowAgg {
    started: Instant,
    bytes_fwd: u64,
    bytes_rev: u64,
    meta: AppMeta,
}

pub struct FlowTable {
    flows: HashMap<FlowKey, FlowAgg>,
    window: Duration,
}

impl FlowTable {
    pub fn new(window: Duration) -> Self {
        Self {
            flows: HashMap::new(),
            window,
        }
    }

    /// Fold one decoded packet into the table.
    ///
    /// Non-IP frames never get here; loopback and multicast noise is
    /// dropped at this boundary.
    pub fn absorb(&mut self, pkt: &Packet<'_>, now: Instant) {
        if net::is_loopback(pkt.src_ip) || net::is_noise_destination(pkt.dst_ip) {
            return;
        }

        let key = FlowKey {
            src: pkt.src_ip,
            dst: pkt.dst_ip,
            sport: pkt.src_port,
            dport: pkt.dst_port,
            proto: pkt.ip_proto,
        };

        // Return traffic counts toward the initiator's receive side.
        if let Some(agg) = self.flows.get_mut(&key.reversed()) {
            agg.bytes_rev += pkt.wire_len;
            return;
        }

        let agg = self.flows.entry(key).or_insert_with(|| FlowAgg {
            started: now,
            bytes_fwd: 0,
            bytes_rev: 0,
            meta: AppMeta::default(),
        });
        agg.bytes_fwd += pkt.wire_len;
        Self::inspect_payload(&mut agg.meta, pkt);
    }

    fn inspect_payload(meta: &mut AppMeta, pkt: &Packet<'_>) {
        if pkt.payload.is_empty() {
            return;
        }
        if pkt.ip_proto == IPPROTO_TCP {
            if meta.sni.is_none() {
                if let Some(hello) = inspect::parse_tls_client_hello(pkt.payload) {
                    meta.sni = hello.sni;
                    meta.ja3 = Some(hello.ja3);
                    meta.saw_tls = true;
                    return;
                }
            }
            if meta.host.is_none() {
                if let Some(http) = inspect::sniff_http(pkt.payload) {
                    meta.host = http.host;
                    meta.user_agent = meta.user_agent.take().or(http.user_agent);
                    meta.saw_http = true;
                }
            }
        } else if pkt.ip_proto == IPPROTO_UDP
            && (pkt.dst_port == 53 || pkt.src_port == 53)
            && meta.dns_query.is_none()
        {
            meta.dns_query = inspect::parse_dns_qname(pkt.payload);
        }
    }

    /// Flush flows whose window has elapsed.
    pub fn expired(&mut self, now: Instant) -> Vec<FlowEvent> {
        let window = self.window;
        let due: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, agg)| now.duration_since(agg.started) >= window)
            .map(|(k, _)| k.clone())
            .collect();

        due.into_iter()
            .filter_map(|key| {
                let agg = self.flows.remove(&key)?;
                Some(Self::finish(key, agg, now))
            })
            .collect()
    }

    /// Flush everything regardless of age (shutdown path).
    pub fn drain(&mut self, now: Instant) -> Vec<FlowEvent> {
        let keys: Vec<FlowKey> = self.flows.keys().cloned().collect();
        keys.into_iter()
            .filter_map(|key| {
                let agg = self.flows.remove(&key)?;
                Some(Self::finish(key, agg, now))
            })
            .collect()
    }

    fn finish(key: FlowKey, agg: FlowAgg, now: Instant) -> FlowEvent {
        let protocol = classify_protocol(&key, &agg.meta);
        let duration = now.duration_since(agg.started);

        let mut metadata = HashMap::new();
        metadata.insert(
            "duration_ms".to_string(),
            duration.as_millis().to_string(),
        );
        if let Some(host) = agg.meta.host {
            metadata.insert("host".to_string(), host);
        }
        if let Some(sni) = agg.meta.sni {
            metadata.insert("sni".to_string(), sni);
        }
        if let Some(q) = agg.meta.dns_query {
            metadata.insert("dns_query".to_string(), q);
        }
        if let Some(ua) = agg.meta.user_agent {
            metadata.insert("user_agent".to_string(), ua);
        }

        FlowEvent {
            timestamp: Utc::now(),
            source_ip: key.src,
            destination_ip: key.dst,
            source_port: key.sport,
            destination_port: key.dport,
            protocol,
            bytes_sent: agg.bytes_fwd,
            bytes_received: agg.bytes_rev,
            ja3_hash: agg.meta.ja3,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

fn classify_protocol(key: &FlowKey, meta: &AppMeta) -> Protocol {
    if key.dport == 53 || key.sport == 53 {
        if meta.dns_query.is_some() || key.proto == IPPROTO_UDP {
            return Protocol::Dns;
        }
    }
    match key.proto {
        IPPROTO_TCP => {
            if meta.saw_tls || key.dport == 443 {
                Protocol::Https
            } else if meta.saw_http || key.dport == 80 {
                Protocol::Http
            } else {
                Protocol::Tcp
            }
        }
        IPPROTO_UDP => Protocol::Udp,
        IPPROTO_ICMP => Protocol::Icmp,
        _ => Protocol::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{parse_frame, tests as decode_tests};

    #[test]
    fn aggregates_bidirectional_bytes() {
        let mut table = FlowTable::new(Duration::from_secs(2));
        let t0 = Instant::now();

        let fwd = decode_tests::tcp_frame([10, 0, 0, 5], [104, 18, 32, 7], 50000, 443, &[0u8; 100]);
        let rev = decode_tests::tcp_frame([104, 18, 32, 7], [10, 0, 0, 5], 443, 50000, &[0u8; 400]);

        table.absorb(&parse_frame(&fwd).unwrap(), t0);
        table.absorb(&parse_frame(&rev).unwrap(), t0);
        table.absorb(&parse_frame(&fwd).unwrap(), t0);
        assert_eq!(table.len(), 1);

        let events = table.expired(t0 + Duration::from_secs(3));
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.source_ip.to_string(), "10.0.0.5");
        // 20 IP + 20 TCP + payload per packet.
        assert_eq!(e.bytes_sent, 2 * (40 + 100));
        assert_eq!(e.bytes_received, 40 + 400);
        assert_eq!(e.protocol, Protocol::Https);
    }

    #[test]
    fn window_holds_young_flows() {
        let mut table = FlowTable::new(Duration::from_secs(2));
        let t0 = Instant::now();
        let frame = decode_tests::udp_frame([10, 0, 0, 5], [10, 0, 0, 2], 50000, 53, &[0u8; 40]);
        table.absorb(&parse_frame(&frame).unwrap(), t0);

        assert!(table.expired(t0 + Duration::from_millis(500)).is_empty());
        assert_eq!(table.expired(t0 + Duration::from_secs(2)).len(), 1);
    }

    #[test]
    fn multicast_and_ssdp_are_dropped_at_source() {
        let mut table = FlowTable::new(Duration::from_secs(2));
        let t0 = Instant::now();
        let ssdp = decode_tests::udp_frame([10, 0, 0, 5], [239, 255, 255, 250], 50000, 1900, b"M-SEARCH");
        let mdns = decode_tests::udp_frame([10, 0, 0, 5], [224, 0, 0, 251], 5353, 5353, &[0u8; 20]);
        table.absorb(&parse_frame(&ssdp).unwrap(), t0);
        table.absorb(&parse_frame(&mdns).unwrap(), t0);
        assert!(table.is_empty());
    }

    #[test]
    fn dns_query_lands_in_metadata() {
        let mut table = FlowTable::new(Duration::from_secs(2));
        let t0 = Instant::now();

        let mut dns = vec![0u8; 12];
        dns[5] = 1;
        for label in ["api", "openai", "com"] {
            dns.push(label.len() as u8);
            dns.extend_from_slice(label.as_bytes());
        }
        dns.push(0);
        dns.extend_from_slice(&[0, 1, 0, 1]);

        let frame = decode_tests::udp_frame([10, 0, 0, 5], [10, 0, 0, 2], 51000, 53, &dns);
        table.absorb(&parse_frame(&frame).unwrap(), t0);
        let events = table.expired(t0 + Duration::from_secs(2));
        assert_eq!(events[0].dns_query(), Some("api.openai.com"));
        assert_eq!(events[0].protocol, Protocol::Dns);
    }
}
