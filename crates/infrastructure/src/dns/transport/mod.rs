//! The four "send query bytes, receive reply bytes" wire strategies.

pub mod https;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use https::HttpsDnsTransport;
pub use tcp::TcpDnsTransport;
pub use tls::TlsDnsTransport;
pub use udp::UdpDnsTransport;

use netsonde_domain::NetError;
use std::io;

/// Transport-internal deadlines surface as an OS-level timeout so the
/// retry policy treats them as retryable, unlike a caller deadline.
pub(crate) fn os_timeout() -> NetError {
    NetError::Io(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"))
}
