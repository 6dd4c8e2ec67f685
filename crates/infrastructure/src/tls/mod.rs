//! TLS handshake orchestration over connections from the dialer chain.

pub mod dialer;
pub mod handshaker;

pub use dialer::NetTlsDialer;
pub use handshaker::RustlsHandshaker;
