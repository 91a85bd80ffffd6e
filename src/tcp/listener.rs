use crate::clock::Clock;
use crate::net::Network;
use crate::tcp::{flags, segment, Connection, Key, Snapshot};
use etherparse::TcpHeaderSlice;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Callback invoked once per accepted connection, before any data flows.
pub type AcceptCallback = Box<dyn FnMut(&mut Connection)>;

/// Port-bound demultiplexer: owns the connection table, runs the accept
/// handshake, routes everything else to the owning connection, and sweeps
/// retransmission deadlines.
///
/// Every entry point runs on the one event loop; the table is only ever
/// mutated here (insert on SYN, remove on FIN).
pub struct Listener {
    net: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    port: u16,
    connections: HashMap<Key, Connection>,
    accept_cb: Option<AcceptCallback>,
    conn_counter: u64,
}

impl Listener {
    pub fn new(net: Arc<dyn Network>, clock: Arc<dyn Clock>, port: u16) -> Self {
        Self {
            net,
            clock,
            port,
            connections: HashMap::new(),
            accept_cb: None,
            conn_counter: 0,
        }
    }

    /// Register the application hook that receives each newly accepted
    /// connection; the hook typically installs the receive callback.
    pub fn register_accept_callback(&mut self, cb: impl FnMut(&mut Connection) + 'static) {
        self.accept_cb = Some(Box::new(cb));
    }

    /// Receive hook for the network layer: one raw segment, addressed by the
    /// transport. Never fails toward the caller — anything malformed or
    /// misdirected is dropped here.
    pub fn handle_segment(&mut self, src_addr: Ipv4Addr, dst_addr: Ipv4Addr, raw: &[u8]) {
        let tcp = match TcpHeaderSlice::from_slice(raw) {
            Ok(h) => h,
            Err(_) => return,
        };
        if tcp.destination_port() != self.port {
            return;
        }
        let payload = &raw[tcp.slice().len()..];
        if !self.net.ignore_checksum() && !segment::checksum_ok(&tcp, src_addr, dst_addr, payload)
        {
            println!("discarding segment with bad checksum");
            return;
        }

        let key = Key::new(src_addr, tcp.source_port(), dst_addr, tcp.destination_port());
        let fgs = flags::header_to_flags(&tcp);
        let seq = tcp.sequence_number();
        let ack = tcp.acknowledgment_number();

        if fgs & flags::SYN != 0 {
            // Accept path. A SYN for an identity already in the table builds
            // a fresh connection and replaces the old entry.
            self.accept(key, seq, src_addr, dst_addr);
        } else if self.connections.contains_key(&key) {
            self.route(key, seq, ack, fgs, payload, src_addr, dst_addr);
        } else {
            println!(
                "{}:{} -> {}:{} segment for unknown connection",
                src_addr,
                tcp.source_port(),
                dst_addr,
                tcp.destination_port()
            );
        }
    }

    fn accept(&mut self, key: Key, peer_seq: u32, src_addr: Ipv4Addr, dst_addr: Ipv4Addr) {
        self.conn_counter += 1;
        let mut conn = Connection::accept(
            self.conn_counter,
            key,
            peer_seq,
            self.net.clone(),
            self.clock.clone(),
        );
        println!(
            "[#{}] {} accepted, isn={} (seeded from peer)",
            conn.id, key, peer_seq
        );

        // SYN+ACK at the seeded cursors, then consume the SYN's slot.
        let syn_ack = segment::build(
            key.dst_port,
            key.src_port,
            conn.send_next,
            conn.recv_next,
            flags::SYN | flags::ACK,
            dst_addr,
            src_addr,
            &[],
        );
        println!(
            "[#{}] {} TX: flags=SA--- seq={} ack={}",
            conn.id, key, conn.send_next, conn.recv_next
        );
        let _ = self.net.send(&syn_ack, src_addr);
        conn.send_next = conn.send_next.wrapping_add(1);

        self.connections.insert(key, conn);

        if let Some(mut cb) = self.accept_cb.take() {
            if let Some(conn) = self.connections.get_mut(&key) {
                cb(conn);
            }
            if self.accept_cb.is_none() {
                self.accept_cb = Some(cb);
            }
        }
    }

    fn route(
        &mut self,
        key: Key,
        seq: u32,
        ack: u32,
        fgs: u8,
        payload: &[u8],
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
    ) {
        let Some(conn) = self.connections.get_mut(&key) else {
            return;
        };
        conn.process_inbound(seq, ack, fgs, payload);

        if fgs & flags::FIN != 0 {
            // Passive close completes immediately: end-of-stream to the
            // application, FIN+ACK to the peer, entry gone — whether or not
            // our own outstanding data was ever acknowledged.
            conn.signal_eof();
            let fin_ack = segment::build(
                key.dst_port,
                key.src_port,
                conn.send_next,
                conn.recv_next,
                flags::FIN | flags::ACK,
                dst_addr,
                src_addr,
                &[],
            );
            println!(
                "[#{}] {} TX: flags=-AF-- seq={} ack={} (FIN+ACK)",
                conn.id, key, conn.send_next, conn.recv_next
            );
            let _ = self.net.send(&fin_ack, src_addr);

            let lifetime = self.clock.now().duration_since(conn.created_at);
            println!(
                "[#{}] closed after {:.2}s, {} bytes in / {} bytes out",
                conn.id,
                lifetime.as_secs_f64(),
                conn.bytes_received,
                conn.bytes_sent
            );
            self.connections.remove(&key);
        }
    }

    /// Fire the retransmission handler of every connection whose deadline
    /// has passed. Driven from the same loop as segment arrivals, so timer
    /// callbacks never interleave with inbound processing.
    pub fn poll_timers(&mut self) {
        let now = self.clock.now();
        for conn in self.connections.values_mut() {
            if conn.timer_expired(now) {
                conn.on_timeout();
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn peek_conn(&self, key: &Key) -> Option<Snapshot> {
        self.connections.get(key).map(|c| c.peek())
    }

    pub fn get_connection_mut(&mut self, key: &Key) -> Option<&mut Connection> {
        self.connections.get_mut(key)
    }

    pub fn force_rto_for(&mut self, key: &Key, rto: std::time::Duration) -> bool {
        match self.connections.get_mut(key) {
            Some(conn) => {
                conn.rto = rto;
                true
            }
            None => false,
        }
    }
}
