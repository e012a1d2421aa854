//! Whitelist filter: traffic no detector should ever look at.

use ipnet::IpNet;

use shadow_core::net;
use shadow_core::FlowEvent;

/// Destination ports on internal services that stay interesting even for
/// purely internal flows (lateral movement, data-store access).
const INTERESTING_INTERNAL_PORTS: &[u16] = &[22, 3389, 5432, 3306, 6379, 9200, 27017];

/// True when the event should bypass detection entirely:
/// multicast/broadcast/SSDP destinations, or internal-to-internal
/// traffic that does not touch an interesting internal service.
pub fn is_whitelisted(event: &FlowEvent, local_nets: &[IpNet]) -> bool {
    if net::is_noise_destination(event.destination_ip) {
        return true;
    }

    let src_internal =
        net::is_internal(event.source_ip, local_nets) || net::is_loopback(event.source_ip);
    let dst_internal =
        net::is_internal(event.destination_ip, local_nets) || net::is_loopback(event.destination_ip);

    if src_internal && dst_internal {
        return !INTERESTING_INTERNAL_PORTS.contains(&event.destination_port);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shadow_core::Protocol;
    use std::collections::HashMap;

    fn event(src: &str, dst: &str, dport: u16) -> FlowEvent {
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: src.parse().unwrap(),
            destination_ip: dst.parse().unwrap(),
            source_port: 50000,
            destination_port: dport,
            protocol: Protocol::Tcp,
            bytes_sent: 10,
            bytes_received: 10,
            ja3_hash: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn multicast_broadcast_ssdp_are_whitelisted() {
        assert!(is_whitelisted(&event("10.0.0.5", "224.0.0.251", 5353), &[]));
        assert!(is_whitelisted(&event("10.0.0.5", "255.255.255.255", 67), &[]));
        assert!(is_whitelisted(&event("10.0.0.5", "239.255.255.250", 1900), &[]));
    }

    #[test]
    fn internal_chatter_is_whitelisted_unless_interesting() {
        assert!(is_whitelisted(&event("10.0.0.5", "10.0.0.9", 8123), &[]));
        assert!(!is_whitelisted(&event("10.0.0.5", "10.0.0.9", 22), &[]));
        assert!(!is_whitelisted(&event("10.0.0.5", "10.0.0.9", 5432), &[]));
    }

    #[test]
    fn outbound_traffic_is_not_whitelisted() {
        assert!(!is_whitelisted(&event("10.0.0.5", "104.18.32.7", 443), &[]));
    }
}
