mod tun;

pub use self::tun::TunNet;

#[cfg(test)]
pub use self::mock::MockNet;

use std::io;
use std::net::Ipv4Addr;

/// Unreliable datagram transport underneath the TCP endpoint.
///
/// Delivery is fire-and-forget: no guarantee the segment arrives, none that
/// segments arrive in order. Inbound traffic reaches the endpoint through
/// [`crate::Listener::handle_segment`].
pub trait Network: Send + Sync {
    /// Hand one raw TCP segment to the transport for delivery to `dst`.
    fn send(&self, segment: &[u8], dst: Ipv4Addr) -> io::Result<usize>;

    /// When true the listener skips checksum validation on inbound segments.
    fn ignore_checksum(&self) -> bool {
        false
    }
}
