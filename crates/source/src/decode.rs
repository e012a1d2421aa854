//! Ethernet/IP/transport frame decoding.
//!
//! Pulls just enough out of a raw frame to key the flow table and hand
//! the transport payload to the deep inspectors. Anything unparseable is
//! silently dropped at the source.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// One decoded frame, borrowing the payload from the capture buffer.
#[derive(Debug)]
pub struct Packet<'a> {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub ip_proto: u8,
    /// Total IP packet length (header + payload), for byte accounting.
    pub wire_len: u64,
    /// Transport payload (empty for ICMP and header-only segments).
    pub payload: &'a [u8],
}

fn be16(b: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*b.get(off)?, *b.get(off + 1)?]))
}

/// Decode an ethernet frame down to the transport payload.
pub fn parse_frame(frame: &[u8]) -> Option<Packet<'_>> {
    if frame.len() < 14 {
        return None;
    }
    let mut ethertype = be16(frame, 12)?;
    let mut offset = 14;

    // Single 802.1Q tag is common on mirrored ports.
    if ethertype == ETHERTYPE_VLAN {
        ethertype = be16(frame, 16)?;
        offset = 18;
    }

    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(&frame[offset..]),
        ETHERTYPE_IPV6 => parse_ipv6(&frame[offset..]),
        _ => None,
    }
}

fn parse_ipv4(packet: &[u8]) -> Option<Packet<'_>> {
    if packet.len() < 20 || packet[0] >> 4 != 4 {
        return None;
    }
    let ihl = ((packet[0] & 0x0f) as usize) * 4;
    if ihl < 20 || packet.len() < ihl {
        return None;
    }
    let total_len = be16(packet, 2)? as usize;
    let proto = packet[9];
    let src = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
    let dst = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);

    let end = total_len.clamp(ihl, packet.len());
    parse_transport(
        IpAddr::V4(src),
        IpAddr::V4(dst),
        proto,
        total_len as u64,
        &packet[ihl..end],
    )
}

fn parse_ipv6(packet: &[u8]) -> Option<Packet<'_>> {
    if packet.len() < 40 || packet[0] >> 4 != 6 {
        return None;
    }
    let payload_len = be16(packet, 4)? as usize;
    let next_header = packet[6];
    let mut src = [0u8; 16];
    src.copy_from_slice(&packet[8..24]);
    let mut dst = [0u8; 16];
    dst.copy_from_slice(&packet[24..40]);

    let end = (40 + payload_len).min(packet.len());
    parse_transport(
        IpAddr::V6(Ipv6Addr::from(src)),
        IpAddr::V6(Ipv6Addr::from(dst)),
        next_header,
        (40 + payload_len) as u64,
        &packet[40..end],
    )
}

fn parse_transport<'a>(
    src_ip: IpAddr,
    dst_ip: IpAddr,
    proto: u8,
    wire_len: u64,
    segment: &'a [u8],
) -> Option<Packet<'a>> {
    match proto {
        IPPROTO_TCP => {
            if segment.len() < 20 {
                return None;
            }
            let data_off = ((segment[12] >> 4) as usize) * 4;
            if data_off < 20 || segment.len() < data_off {
                return None;
            }
            Some(Packet {
                src_ip,
                dst_ip,
                src_port: be16(segment, 0)?,
                dst_port: be16(segment, 2)?,
                ip_proto: proto,
                wire_len,
                payload: &segment[data_off..],
            })
        }
        IPPROTO_UDP => {
            if segment.len() < 8 {
                return None;
            }
            Some(Packet {
                src_ip,
                dst_ip,
                src_port: be16(segment, 0)?,
                dst_port: be16(segment, 2)?,
                ip_proto: proto,
                wire_len,
                payload: &segment[8..],
            })
        }
        IPPROTO_ICMP => Some(Packet {
            src_ip,
            dst_ip,
            src_port: 0,
            dst_port: 0,
            ip_proto: proto,
            wire_len,
            payload: &[],
        }),
        _ => None,
    }
}
