//! Deep inspection: HTTP Host, TLS SNI + JA3, DNS qname.
//!
//! All parsers are best-effort over a single packet's payload; a value
//! that does not parse is simply absent from the flow's metadata.

const HTTP_METHODS: &[&str] = &["GET ", "POST ", "PUT ", "HEAD ", "DELETE ", "OPTIONS ", "PATCH "];

/// Extracted HTTP request fields.
#[derive(Debug, Default, PartialEq)]
pub struct HttpInfo {
    pub host: Option<String>,
    pub user_agent: Option<String>,
}

/// Extract `Host` and `User-Agent` from a cleartext HTTP request.
pub fn sniff_http(payload: &[u8]) -> Option<HttpInfo> {
    let text = std::str::from_utf8(payload).ok()?;
    if !HTTP_METHODS.iter().any(|m| text.starts_with(m)) {
        return None;
    }

    let mut info = HttpInfo::default();
    for line in text.split("\r\n").skip(1).take(32) {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("host") {
            info.host = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("user-agent") {
            info.user_agent = Some(value.to_string());
        }
    }
    (info.host.is_some() || info.user_agent.is_some()).then_some(info)
}

/// Parsed TLS ClientHello fields.
#[derive(Debug, PartialEq)]
pub struct TlsClientHello {
    pub sni: Option<String>,
    pub ja3: String,
}

// GREASE values (0x0a0a, 0x1a1a, ... 0xfafa) are excluded from JA3.
fn is_grease(v: u16) -> bool {
    (v & 0x0f0f) == 0x0a0a && (v >> 12) == ((v >> 4) & 0x0f)
}

fn be16(b: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*b.get(off)?, *b.get(off + 1)?]))
}

/// Parse a TLS ClientHello and compute its JA3 fingerprint
/// (`md5(version,ciphers,extensions,curves,point_formats)`).
pub fn parse_tls_client_hello(payload: &[u8]) -> Option<TlsClientHello> {
    // TLS record: handshake content type, version, length.
    if payload.len() < 5 || payload[0] != 22 {
        return None;
    }
    let record_len = be16(payload, 3)? as usize;
    let record = payload.get(5..5 + record_len.min(payload.len() - 5))?;

    // Handshake header: ClientHello type.
    if record.len() < 4 || record[0] != 1 {
        return None;
    }
    let body = record.get(4..)?;
    if body.len() < 34 {
        return None;
    }
    let client_version = be16(body, 0)?;
    let mut off = 2 + 32; // version + random

    // Session id
    let sid_len = *body.get(off)? as usize;
    off += 1 + sid_len;

    // Cipher suites
    let ciphers_len = be16(body, off)? as usize;
    off += 2;
    let cipher_bytes = body.get(off..off + ciphers_len)?;
    off += ciphers_len;
    let ciphers: Vec<u16> = cipher_bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .filter(|v| !is_grease(*v))
        .collect();

    // Compression methods
    let comp_len = *body.get(off)? as usize;
    off += 1 + comp_len;

    // Extensions
    let mut ext_ids: Vec<u16> = Vec::new();
    let mut curves: Vec<u16> = Vec::new();
    let mut point_formats: Vec<u8> = Vec::new();
    let mut sni = None;

    if off + 2 <= body.len() {
        let ext_total = be16(body, off)? as usize;
        off += 2;
        let mut ext = body.get(off..off + ext_total.min(body.len() - off))?;

        while ext.len() >= 4 {
            let ext_type = be16(ext, 0)?;
            let ext_len = be16(ext, 2)? as usize;
            let data = ext.get(4..4 + ext_len)?;

            if !is_grease(ext_type) {
                ext_ids.push(ext_type);
            }
            match ext_type {
                // server_name
                0 => {
                    if data.len() >= 5 && data[2] == 0 {
                        let name_len = be16(data, 3)? as usize;
                        if let Some(name) = data.get(5..5 + name_len) {
                            sni = std::str::from_utf8(name).ok().map(str::to_string);
                        }
                    }
                }
                // supported_groups
                10 => {
                    if data.len() >= 2 {
                        let list_len = be16(data, 0)? as usize;
                        if let Some(list) = data.get(2..2 + list_len) {
                            curves = list
                                .chunks_exact(2)
                                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                                .filter(|v| !is_grease(*v))
                                .collect();
                        }
                    }
                }
                // ec_point_formats
                11 => {
                    if !data.is_empty() {
                        let list_len = data[0] as usize;
                        if let Some(list) = data.get(1..1 + list_len) {
                            point_formats = list.to_vec();
                        }
                    }
                }
                _ => {}
            }
            ext = &ext[4 + ext_len..];
        }
    }

    let join = |vals: &[u16]| {
        vals.iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("-")
    };
    let fmt_join = point_formats
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-");

    let ja3_input = format!(
        "{},{},{},{},{}",
        client_version,
        join(&ciphers),
        join(&ext_ids),
        join(&curves),
        fmt_join
    );
    let ja3 = format!("{:x}", md5::compute(ja3_input.as_bytes()));

    Some(TlsClientHello { sni, ja3 })
}

/// Extract the query name from a DNS message.
pub fn parse_dns_qname(payload: &[u8]) -> Option<String> {
    if payload.len() < 13 {
        return None;
    }
    let qdcount = be16(payload, 4)?;
    if qdcount == 0 {
        return None;
    }

    let mut labels = Vec::new();
    let mut off = 12;
    loop {
        let len = *payload.get(off)? as usize;
        if len == 0 {
            break;
        }
        // Compression pointers never appear in the first question name.
        if len & 0xc0 != 0 {
            return None;
        }
        let label = payload.get(off + 1..off + 1 + len)?;
        labels.push(std::str::from_utf8(label).ok()?.to_string());
        off += 1 + len;
        if labels.len() > 32 {
            return None;
        }
    }
    (!labels.is_empty()).then(|| labels.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_host_and_user_agent() {
        let payload =
            b"GET /v1/chat HTTP/1.1\r\nHost: api.openai.com\r\nUser-Agent: python-requests/2.31\r\n\r\n";
        let info = sniff_http(payload).unwrap();
        assert_eq!(info.host.as_deref(), Some("api.openai.com"));
        assert_eq!(info.user_agent.as_deref(), Some("python-requests/2.31"));

        assert!(sniff_http(b"\x16\x03\x01randomtls").is_none());
    }

    /// Minimal ClientHello with one cipher, SNI, groups, and point formats.
    fn client_hello(host: &str) -> Vec<u8> {
        let mut exts = Vec::new();

        // server_name
        let name = host.as_bytes();
        let mut sni_data = Vec::new();
        sni_data.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        sni_data.push(0);
        sni_data.extend_from_slice(&(name.len() as u16).to_be_bytes());
        sni_data.extend_from_slice(name);
        exts.extend_from_slice(&0u16.to_be_bytes());
        exts.extend_from_slice(&(sni_data.len() as u16).to_be_bytes());
        exts.extend_from_slice(&sni_data);

        // supported_groups: x25519 (29), secp256r1 (23)
        let groups: &[u8] = &[0, 4, 0, 29, 0, 23];
        exts.extend_from_slice(&10u16.to_be_bytes());
        exts.extend_from_slice(&(groups.len() as u16).to_be_bytes());
        exts.extend_from_slice(groups);

        // ec_point_formats: uncompressed
        let formats: &[u8] = &[1, 0];
        exts.extend_from_slice(&11u16.to_be_bytes());
        exts.extend_from_slice(&(formats.len() as u16).to_be_bytes());
        exts.extend_from_slice(formats);

        let mut body = Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes()); // TLS 1.2
        body.extend_from_slice(&[0u8; 32]); // random
        body.push(0); // empty session id
        body.extend_from_slice(&4u16.to_be_bytes()); // two ciphers
        body.extend_from_slice(&0x1301u16.to_be_bytes());
        body.extend_from_slice(&0x1302u16.to_be_bytes());
        body.push(1); // one compression method
        body.push(0);
        body.extend_from_slice(&(exts.len() as u16).to_be_bytes());
        body.extend_from_slice(&exts);

        let mut hs = vec![1, 0, 0, 0];
        let len = (body.len() as u32).to_be_bytes();
        hs[1..4].copy_from_slice(&len[1..4]);
        hs.extend_from_slice(&body);

        let mut record = vec![22, 3, 1];
        record.extend_from_slice(&(hs.len() as u16).to_be_bytes());
        record.extend_from_slice(&hs);
        record
    }

    #[test]
    fn tls_client_hello_sni_and_ja3() {
        let hello = client_hello("api.anthropic.com");
        let parsed = parse_tls_client_hello(&hello).unwrap();
        assert_eq!(parsed.sni.as_deref(), Some("api.anthropic.com"));
        assert_eq!(parsed.ja3.len(), 32);

        // JA3 is input-stable: same hello, same hash.
        let again = parse_tls_client_hello(&hello).unwrap();
        assert_eq!(parsed.ja3, again.ja3);

        // Expected digest for "771,4865-4866,0-10-11,29-23,0".
        let expected = format!("{:x}", md5::compute("771,4865-4866,0-10-11,29-23,0"));
        assert_eq!(parsed.ja3, expected);
    }

    #[test]
    fn grease_values_are_excluded_from_ja3() {
        let mut hello = client_hello("x.example");
        // Swap the second cipher (0x1302) for GREASE 0x1a1a.
        let pos = hello
            .windows(2)
            .position(|w| w == [0x13, 0x02])
            .unwrap();
        hello[pos] = 0x1a;
        hello[pos + 1] = 0x1a;

        let parsed = parse_tls_client_hello(&hello).unwrap();
        let expected = format!("{:x}", md5::compute("771,4865,0-10-11,29-23,0"));
        assert_eq!(parsed.ja3, expected);
    }

    #[test]
    fn dns_qname_parses_labels() {
        let mut msg = vec![0u8; 12];
        msg[5] = 1; // qdcount = 1
        for label in ["api", "openai", "com"] {
            msg.push(label.len() as u8);
            msg.extend_from_slice(label.as_bytes());
        }
        msg.push(0);
        msg.extend_from_slice(&[0, 1, 0, 1]); // qtype A, qclass IN

        assert_eq!(parse_dns_qname(&msg).as_deref(), Some("api.openai.com"));
        assert!(parse_dns_qname(&[0u8; 4]).is_none());
    }
}
