//! Per-event feature extraction.
//!
//! The feature list is fixed at model-load time; a bundle whose dimension
//! does not match [`FEATURE_DIM`] is rejected. Changing the vector means
//! retraining.

use shadow_core::{FlowEvent, Protocol};

/// `[dst_port, bytes_sent, bytes_received, log1p(duration_ms),
/// sni_entropy, tld_rank, proto_onehot × 6]`
pub const FEATURE_DIM: usize = 12;

pub fn extract(event: &FlowEvent) -> [f64; FEATURE_DIM] {
    let mut out = [0.0; FEATURE_DIM];
    out[0] = event.destination_port as f64;
    out[1] = event.bytes_sent as f64;
    out[2] = event.bytes_received as f64;
    out[3] = event.duration_ms().ln_1p();
    out[4] = event
        .sni()
        .or_else(|| event.host())
        .map(shannon_entropy)
        .unwrap_or(0.0);
    out[5] = event
        .sni()
        .or_else(|| event.host())
        .map(tld_rank)
        .unwrap_or(0.0);

    let proto_slot = match event.protocol {
        Protocol::Tcp => Some(0),
        Protocol::Udp => Some(1),
        Protocol::Icmp => Some(2),
        Protocol::Http => Some(3),
        Protocol::Https => Some(4),
        Protocol::Dns => Some(5),
        Protocol::Other => None,
    };
    if let Some(slot) = proto_slot {
        out[6 + slot] = 1.0;
    }
    out
}

/// Shannon entropy of the byte distribution, in bits.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for b in s.bytes() {
        counts[b as usize] += 1;
    }
    let len = s.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Rank of the top-level domain: common commercial TLDs rank low,
/// AI-ecosystem and exotic TLDs rank higher.
pub fn tld_rank(domain: &str) -> f64 {
    let tld = domain
        .trim_end_matches('.')
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match tld.as_str() {
        "com" => 1.0,
        "org" => 2.0,
        "net" => 2.0,
        "edu" | "gov" => 2.0,
        "io" => 4.0,
        "co" => 4.0,
        "dev" => 5.0,
        "app" => 5.0,
        "ai" => 7.0,
        "sh" => 7.0,
        "" => 0.0,
        _ => 10.0,
    }
}
