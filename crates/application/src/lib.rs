//! Netsonde Application Layer
//!
//! The capability ports every measurement component implements or consumes
//! (resolver, dialer, TLS, DNS transport, HTTP transport), plus the
//! per-measurement context threading the trace log, cancellation and
//! transaction identifiers through the stack as explicit arguments.
pub mod ctx;
pub mod ports;

pub use ctx::MeasureContext;
pub use ports::{
    BoxConn, Connection, Dialer, DnsTransport, HttpRequest, HttpResponse, HttpTransport, Network,
    Resolver, TlsConn, TlsDialer, TlsHandshakeParams, TlsHandshaker, TlsNegotiation,
};
