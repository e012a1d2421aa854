//! IP address-space classification shared by the whitelist filter,
//! endpoint labeling, and probe safety guards.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::IpNet;

pub const SSDP_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// RFC1918 private space or loopback.
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// Internal endpoint: RFC1918, loopback, or inside a configured local prefix.
pub fn is_internal(ip: IpAddr, local_nets: &[IpNet]) -> bool {
    is_private(ip) || local_nets.iter().any(|n| n.contains(&ip))
}

pub fn is_multicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_multicast(),
        IpAddr::V6(v6) => v6.is_multicast(),
    }
}

pub fn is_broadcast(ip: IpAddr) -> bool {
    matches!(ip, IpAddr::V4(v4) if v4.is_broadcast())
}

pub fn is_ssdp(ip: IpAddr) -> bool {
    matches!(ip, IpAddr::V4(v4) if v4 == SSDP_ADDR)
}

pub fn is_loopback(ip: IpAddr) -> bool {
    ip.is_loopback()
}

/// Noise traffic dropped at the source and by the whitelist filter.
pub fn is_noise_destination(ip: IpAddr) -> bool {
    is_multicast(ip) || is_broadcast(ip) || is_ssdp(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1918_and_loopback_are_internal() {
        assert!(is_internal("10.0.0.5".parse().unwrap(), &[]));
        assert!(is_internal("192.168.1.20".parse().unwrap(), &[]));
        assert!(is_internal("172.16.9.1".parse().unwrap(), &[]));
        assert!(is_internal("127.0.0.1".parse().unwrap(), &[]));
        assert!(!is_internal("104.18.32.7".parse().unwrap(), &[]));
    }

    #[test]
    fn configured_local_prefix_is_internal() {
        let nets = vec!["100.90.0.0/16".parse().unwrap()];
        assert!(is_internal("100.90.4.2".parse().unwrap(), &nets));
        assert!(!is_internal("100.91.4.2".parse().unwrap(), &nets));
    }

    #[test]
    fn noise_destinations() {
        assert!(is_noise_destination("224.0.0.251".parse().unwrap()));
        assert!(is_noise_destination("239.255.255.250".parse().unwrap()));
        assert!(is_noise_destination("255.255.255.255".parse().unwrap()));
        assert!(!is_noise_destination("8.8.8.8".parse().unwrap()));
    }
}
