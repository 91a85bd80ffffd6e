mod connection;
mod flags;
mod listener;
mod segment;

pub use self::connection::{Connection, Key, Snapshot};
pub use self::listener::Listener;
pub use self::segment::{is_seq_lt, is_seq_lte};

pub use self::flags::{flags_to_string, header_to_flags};
pub use self::flags::{ACK, FIN, PSH, RST, SYN, URG};

/// Largest payload placed in a single outgoing segment.
pub const MSS: usize = 1460;
