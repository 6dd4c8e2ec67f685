//! The dialer chain: base TCP/UDP connect plus the resolving, timeout,
//! proxy and tracing decorators that stack on top of it.

pub mod resolve;
pub mod socks5;
pub mod tcp;
pub mod timeout;
pub mod trace;

pub use resolve::ResolveDialer;
pub use socks5::Socks5Dialer;
pub use tcp::SystemDialer;
pub use timeout::TimeoutDialer;
pub use trace::TraceDialer;
