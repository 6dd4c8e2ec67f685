//! HTTP round-tripping over the instrumented dialer chain.

pub mod transport;

pub use transport::NetHttpTransport;
