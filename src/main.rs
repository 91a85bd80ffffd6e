use std::env;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thinwire::clock::SystemClock;
use thinwire::net::TunNet;
use thinwire::tcp::Listener;

/// Echo server over a TUN interface:
///
///   thinwire [iface] [local-ip] [port]
///
/// Every accepted connection gets its payloads echoed straight back; end of
/// stream closes our side too.
fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let iface = args.next().unwrap_or_else(|| "tun0".to_string());
    let local_ip: Ipv4Addr = args
        .next()
        .unwrap_or_else(|| "10.0.0.1".to_string())
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad local ip: {e}")))?;
    let port: u16 = args
        .next()
        .unwrap_or_else(|| "7000".to_string())
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad port: {e}")))?;

    let net = Arc::new(TunNet::new(&iface, local_ip)?);
    let clock = Arc::new(SystemClock);
    let mut listener = Listener::new(net.clone(), clock, port);

    listener.register_accept_callback(|conn| {
        conn.register_receive_callback(|conn, data| {
            if data.is_empty() {
                conn.close();
            } else {
                conn.send(data);
            }
        });
    });

    println!("thinwire echo on {iface} {local_ip}:{port}");

    let mut buf = [0u8; 1504];
    let mut last_sweep = Instant::now();
    loop {
        if last_sweep.elapsed() > Duration::from_millis(100) {
            listener.poll_timers();
            last_sweep = Instant::now();
        }
        match net.recv_segment(&mut buf) {
            Ok(Some((src, dst, segment))) => listener.handle_segment(src, dst, segment),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}
