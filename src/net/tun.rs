use crate::net::Network;
use etherparse::{IpNumber, Ipv4HeaderSlice, PacketBuilder};
use std::io;
use std::net::Ipv4Addr;

/// IPv4-over-TUN transport. Outgoing segments are wrapped in an IPv4 header
/// sourced from `local_ip`; inbound datagrams are unwrapped and filtered down
/// to TCP before they reach the listener.
pub struct TunNet {
    iface: tun_tap::Iface,
    local_ip: Ipv4Addr,
}

impl TunNet {
    pub fn new(name: &str, local_ip: Ipv4Addr) -> io::Result<Self> {
        let iface = tun_tap::Iface::without_packet_info(name, tun_tap::Mode::Tun)?;
        Ok(Self { iface, local_ip })
    }

    /// Block for the next inbound TCP segment. Returns the datagram's source
    /// and destination addresses plus the segment bytes within `buf`, or
    /// `None` for traffic that is not TCP-over-IPv4.
    pub fn recv_segment<'a>(
        &self,
        buf: &'a mut [u8],
    ) -> io::Result<Option<(Ipv4Addr, Ipv4Addr, &'a [u8])>> {
        let n = self.iface.recv(buf)?;
        let ip = match Ipv4HeaderSlice::from_slice(&buf[..n]) {
            Ok(h) if h.protocol() == IpNumber::TCP => h,
            _ => return Ok(None),
        };
        let src = ip.source_addr();
        let dst = ip.destination_addr();
        let off = ip.slice().len();
        Ok(Some((src, dst, &buf[off..n])))
    }
}

impl Network for TunNet {
    fn send(&self, segment: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let builder = PacketBuilder::ipv4(self.local_ip.octets(), dst.octets(), 64);
        let mut pkt = Vec::with_capacity(20 + segment.len());
        builder.write(&mut pkt, IpNumber::TCP, segment).unwrap();
        self.iface.send(&pkt)
    }
}
