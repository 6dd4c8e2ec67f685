//! Netsonde Infrastructure Layer
//!
//! Concrete engines behind the application-layer ports: the DNS codec
//! and its four wire transports, the serial resolver and its decorator
//! stack, the dialer chain, the rustls handshaker, and the hyper-based
//! HTTP round-tripper. [`builder::Session`] wires the whole chain from
//! a [`builder::Config`].

pub mod builder;
pub mod dialer;
pub mod dns;
pub mod http;
pub mod tls;

pub use builder::{Config, Session, SessionStats};
