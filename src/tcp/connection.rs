use crate::clock::Clock;
use crate::net::Network;
use crate::tcp::{flags, segment, segment::Unacked, MSS};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// RTO before the first RTT sample arrives.
const INITIAL_RTO: Duration = Duration::from_secs(1);
/// Slow-start threshold a fresh connection begins with.
const INITIAL_SSTHRESH: usize = 64 * MSS;
/// SRTT smoothing factor (1/8).
const ALPHA: f64 = 0.125;
/// RTT-deviation smoothing factor (1/4).
const BETA: f64 = 0.25;

/// Identity of one flow: (remote address, remote port, local address,
/// local port), fixed for the connection's lifetime. `src_*` is the peer as
/// seen on inbound segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub(crate) src_ip: Ipv4Addr,
    pub(crate) src_port: u16,
    pub(crate) dst_ip: Ipv4Addr,
    pub(crate) dst_port: u16,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} → {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

impl Key {
    pub fn new(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        Key {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }
}

/// Callback handed every in-order payload; an empty payload means the peer
/// closed its half of the stream.
pub type ReceiveCallback = Box<dyn FnMut(&mut Connection, &[u8])>;

/// Per-flow TCP state: send/receive cursors, the unacknowledged window, the
/// single retransmission deadline, RTT smoothing and congestion tracking.
///
/// All handlers for one connection run on the listener's event loop, one at
/// a time; nothing here is shared across threads.
pub struct Connection {
    pub(crate) id: u64,
    pub(crate) key: Key,
    net: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    /// Next sequence offset to transmit; doubles as the cumulative-ack
    /// cursor on the send side.
    pub(crate) send_next: u32,
    /// Next sequence offset expected from the peer; echoed as the ack
    /// number on every outgoing segment.
    pub(crate) recv_next: u32,
    /// Sent-but-unacknowledged segments keyed by starting sequence offset.
    outstanding: BTreeMap<u32, Unacked>,
    /// The one retransmission deadline for the whole outstanding window.
    deadline: Option<Instant>,
    pub(crate) rto: Duration,
    srtt: Option<Duration>,
    rttvar: Duration,
    pub(crate) cwnd: f64,
    pub(crate) ssthresh: f64,
    recv_cb: Option<ReceiveCallback>,
    // debugging
    pub(crate) created_at: Instant,
    pub(crate) bytes_received: usize,
    pub(crate) bytes_sent: usize,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("send_next", &self.send_next)
            .field("recv_next", &self.recv_next)
            .field("outstanding.len()", &self.outstanding.len())
            .field("deadline", &self.deadline)
            .field("rto", &self.rto)
            .field("srtt", &self.srtt)
            .field("rttvar", &self.rttvar)
            .field("cwnd", &self.cwnd)
            .field("ssthresh", &self.ssthresh)
            .finish()
    }
}

impl Connection {
    /// State for a flow whose SYN just arrived. The local sequence cursor is
    /// seeded from the peer's initial sequence number; the listener advances
    /// it past the SYN slot once the SYN+ACK is out.
    pub(crate) fn accept(
        id: u64,
        key: Key,
        peer_seq: u32,
        net: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let created_at = clock.now();
        Connection {
            id,
            key,
            net,
            clock,
            send_next: peer_seq,
            recv_next: peer_seq.wrapping_add(1),
            outstanding: BTreeMap::new(),
            deadline: None,
            rto: INITIAL_RTO,
            srtt: None,
            rttvar: Duration::ZERO,
            cwnd: MSS as f64,
            ssthresh: INITIAL_SSTHRESH as f64,
            recv_cb: None,
            created_at,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Register the application hook for in-order payloads. Called from the
    /// accept callback; an empty payload later signals end of stream.
    pub fn register_receive_callback(&mut self, cb: impl FnMut(&mut Connection, &[u8]) + 'static) {
        self.recv_cb = Some(Box::new(cb));
    }

    /// Process one inbound segment already routed to this connection.
    ///
    /// A new cumulative ack is absorbed before the FIN/data checks, and a
    /// FIN suppresses payload delivery even when the segment carries data.
    pub(crate) fn process_inbound(&mut self, seq: u32, ack: u32, fgs: u8, payload: &[u8]) {
        println!(
            "[#{}] {} RX: flags={} seq={} ack={} len={}",
            self.id,
            self.key,
            flags::flags_to_string(fgs),
            seq,
            ack,
            payload.len()
        );

        if segment::is_seq_lt(self.send_next, ack) {
            self.send_next = ack;
            self.deadline = None;
            // The lookup keys on the just-updated cursor, not on the start
            // of the segment the ack covers.
            if let Some(unacked) = self.outstanding.remove(&self.send_next) {
                let sample = self.clock.now().duration_since(unacked.sent_at);
                self.update_rtt(sample);
            }
            if self.cwnd < self.ssthresh {
                self.cwnd = (self.cwnd + MSS as f64).min(self.ssthresh);
            } else {
                self.cwnd += MSS as f64 * (MSS as f64 / self.cwnd);
            }
        }

        if fgs & flags::FIN != 0 {
            self.recv_next = self.recv_next.wrapping_add(1);
        } else if seq == self.recv_next && !payload.is_empty() {
            self.recv_next = self.recv_next.wrapping_add(payload.len() as u32);
            self.bytes_received += payload.len();
            self.deliver(payload);
            let ack_seg = self.build_segment(flags::ACK, &[]);
            let _ = self.net.send(&ack_seg, self.key.src_ip);
        }
        // Everything else is out of order or a duplicate: dropped, no reply.
    }

    /// Split `data` into MSS-sized chunks, transmit each at the current send
    /// cursor and record it for retransmission, then rearm the timer for the
    /// whole outstanding window.
    pub fn send(&mut self, data: &[u8]) {
        for chunk in data.chunks(MSS) {
            let seg = self.build_segment(flags::ACK, chunk);
            println!(
                "[#{}] {} TX: flags=-A--- seq={} ack={} len={}",
                self.id,
                self.key,
                self.send_next,
                self.recv_next,
                chunk.len()
            );
            let _ = self.net.send(&seg, self.key.src_ip);
            self.outstanding.insert(
                self.send_next,
                Unacked {
                    segment: seg,
                    dest: self.key.src_ip,
                    sent_at: self.clock.now(),
                },
            );
            self.send_next = self.send_next.wrapping_add(chunk.len() as u32);
            self.bytes_sent += chunk.len();
        }
        self.arm_timer();
    }

    /// Send a bare FIN at the current cursors and consume its sequence slot.
    /// The FIN itself is not retransmitted and nothing waits for its ack.
    pub fn close(&mut self) {
        let fin = self.build_segment(flags::FIN, &[]);
        println!(
            "[#{}] {} TX: flags=--F-- seq={} ack={} (close)",
            self.id, self.key, self.send_next, self.recv_next
        );
        let _ = self.net.send(&fin, self.key.src_ip);
        self.send_next = self.send_next.wrapping_add(1);
    }

    /// Retransmission deadline fired: back off, replay the entire
    /// unacknowledged window byte-for-byte, rearm, shrink the window.
    pub(crate) fn on_timeout(&mut self) {
        self.rto *= 2;
        println!(
            "[#{}] timeout: resending {} segment(s), rto backed off to {:?}",
            self.id,
            self.outstanding.len(),
            self.rto
        );
        for unacked in self.outstanding.values() {
            let _ = self.net.send(&unacked.segment, unacked.dest);
        }
        self.arm_timer();
        self.cwnd = (self.cwnd / 2.0).max(MSS as f64);
    }

    /// Jacobson/Karels smoothing. The deviation term uses the freshly
    /// updated estimate, and the result feeds the RTO directly, unclamped.
    pub(crate) fn update_rtt(&mut self, sample: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2;
            }
            Some(srtt) => {
                let sample_us = sample.as_micros() as f64;
                let srtt_us = (1.0 - ALPHA) * srtt.as_micros() as f64 + ALPHA * sample_us;
                let rttvar_us = (1.0 - BETA) * self.rttvar.as_micros() as f64
                    + BETA * (sample_us - srtt_us).abs();
                self.srtt = Some(Duration::from_micros(srtt_us as u64));
                self.rttvar = Duration::from_micros(rttvar_us as u64);
            }
        }
        self.rto = self.srtt.unwrap_or(sample) + 4 * self.rttvar;
        println!(
            "[#{}] rtt sample {:?} → srtt={:?} rttvar={:?} rto={:?}",
            self.id, sample, self.srtt, self.rttvar, self.rto
        );
    }

    /// Invoke the receive callback re-entrantly: the hook may call `send` or
    /// `close` on this same connection.
    fn deliver(&mut self, payload: &[u8]) {
        if let Some(mut cb) = self.recv_cb.take() {
            cb(self, payload);
            if self.recv_cb.is_none() {
                self.recv_cb = Some(cb);
            }
        }
    }

    /// End-of-stream notification; the listener calls this while processing
    /// the peer's FIN.
    pub(crate) fn signal_eof(&mut self) {
        self.deliver(&[]);
    }

    fn build_segment(&self, fgs: u8, payload: &[u8]) -> Vec<u8> {
        segment::build(
            self.key.dst_port,
            self.key.src_port,
            self.send_next,
            self.recv_next,
            fgs,
            self.key.dst_ip,
            self.key.src_ip,
            payload,
        )
    }

    /// (Re)arm the single per-connection timer; any previously scheduled
    /// deadline is superseded.
    fn arm_timer(&mut self) {
        self.deadline = Some(self.clock.now() + self.rto);
    }

    pub(crate) fn timer_expired(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |d| now >= d)
    }
}

/// Copyable view of a connection's externally observable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub id: u64,
    pub send_next: u32,
    pub recv_next: u32,
    pub rto: Duration,
    pub cwnd: f64,
    pub ssthresh: f64,
    pub outstanding: usize,
    pub timer_armed: bool,
    pub bytes_received: usize,
    pub bytes_sent: usize,
}

impl Connection {
    pub fn peek(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            send_next: self.send_next,
            recv_next: self.recv_next,
            rto: self.rto,
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            outstanding: self.outstanding.len(),
            timer_armed: self.deadline.is_some(),
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
        }
    }
}

#[cfg(test)]
impl Connection {
    pub fn set_ssthresh(&mut self, ssthresh: f64) {
        self.ssthresh = ssthresh;
    }

    pub fn outstanding_keys(&self) -> Vec<u32> {
        self.outstanding.keys().copied().collect()
    }
}
