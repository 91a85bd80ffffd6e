use etherparse::TcpHeaderSlice;

///! TCP flag bits in their RFC 793 wire positions.
///
/// FIN flag - no more data from sender
pub const FIN: u8 = 1 << 0;
/// SYN flag - synchronize sequence numbers
pub const SYN: u8 = 1 << 1;
/// RST flag - reset the connection
pub const RST: u8 = 1 << 2;
/// PSH flag - push function
pub const PSH: u8 = 1 << 3;
/// ACK flag - acknowledgment field is significant
pub const ACK: u8 = 1 << 4;
/// URG flag - urgent pointer field is significant
pub const URG: u8 = 1 << 5;

/// Render a flags byte for log lines.
pub fn flags_to_string(flags: u8) -> String {
    format!(
        "{}{}{}{}{}",
        if flags & SYN != 0 { "S" } else { "-" },
        if flags & ACK != 0 { "A" } else { "-" },
        if flags & FIN != 0 { "F" } else { "-" },
        if flags & RST != 0 { "R" } else { "-" },
        if flags & PSH != 0 { "P" } else { "-" },
    )
}

/// Collapse a parsed header's flag bits into one byte.
pub fn header_to_flags(tcp: &TcpHeaderSlice) -> u8 {
    (tcp.fin() as u8) << 0
        | (tcp.syn() as u8) << 1
        | (tcp.rst() as u8) << 2
        | (tcp.psh() as u8) << 3
        | (tcp.ack() as u8) << 4
        | (tcp.urg() as u8) << 5
}
