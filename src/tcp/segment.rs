//! Wire-level segment helpers: header build/verify and sequence-number math.
use crate::tcp::flags;
use etherparse::{TcpHeader, TcpHeaderSlice};
use std::net::Ipv4Addr;
use std::time::Instant;

/// Window advertised on every outgoing segment. Flow control is not
/// negotiated, so the maximum unscaled window is used throughout.
const WINDOW: u16 = 65_535;

/// Serialize one segment: header carrying `seq`/`ack` and the given flag
/// bits, checksummed over the IPv4 pseudo-header for `src_ip`/`dst_ip`,
/// followed by `payload`.
///
/// The acknowledgment number is always written into the header; the peer
/// only interprets it when the ACK bit is among `fgs` (the close path sends
/// a bare FIN this way).
pub fn build(
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    fgs: u8,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    payload: &[u8],
) -> Vec<u8> {
    let mut header = TcpHeader::new(src_port, dst_port, seq, WINDOW);
    header.acknowledgment_number = ack;
    header.syn = fgs & flags::SYN != 0;
    header.ack = fgs & flags::ACK != 0;
    header.fin = fgs & flags::FIN != 0;
    header.checksum = header
        .calc_checksum_ipv4_raw(src_ip.octets(), dst_ip.octets(), payload)
        .unwrap();

    let mut segment = Vec::with_capacity(20 + payload.len());
    header.write(&mut segment).unwrap();
    segment.extend_from_slice(payload);
    segment
}

/// Recompute the pseudo-header checksum for a received segment and compare
/// it against the header field.
pub fn checksum_ok(tcp: &TcpHeaderSlice, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> bool {
    tcp.to_header()
        .calc_checksum_ipv4_raw(src_ip.octets(), dst_ip.octets(), payload)
        .map(|sum| sum == tcp.checksum())
        .unwrap_or(false)
}

/// `a < b` in TCP sequence space, where 32-bit sequence numbers wrap.
///
/// Plain integer comparison misbehaves near the wrap point; per RFC 1323 the
/// test is whether `b - a` is positive in 32-bit signed arithmetic.
///
/// # Examples
///
/// ```
/// use thinwire::tcp::is_seq_lt;
/// assert!(is_seq_lt(100, 200));
/// // 10 comes after 4_294_967_290 in sequence space
/// assert!(is_seq_lt(4_294_967_290, 10));
/// assert!(!is_seq_lt(200, 100));
/// ```
pub fn is_seq_lt(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

/// `a <= b` in TCP sequence space.
///
/// # Examples
///
/// ```
/// use thinwire::tcp::is_seq_lte;
/// assert!(is_seq_lte(100, 100));
/// assert!(is_seq_lte(4_294_967_290, 10));
/// assert!(!is_seq_lte(200, 100));
/// ```
pub fn is_seq_lte(a: u32, b: u32) -> bool {
    a == b || is_seq_lt(a, b)
}

/// A sent-but-unacknowledged segment, held for timeout replay.
///
/// The raw bytes are kept exactly as first transmitted; a timeout resends
/// them unchanged.
#[derive(Debug, Clone)]
pub struct Unacked {
    /// Segment bytes as handed to the network.
    pub segment: Vec<u8>,
    /// Where the segment was sent.
    pub dest: Ipv4Addr,
    /// When the primary transmission happened; source of the RTT sample.
    pub sent_at: Instant,
}
