pub mod dialer;
pub mod dns;
pub mod http;
pub mod resolver;
pub mod tls;

pub use dialer::{BoxConn, Connection, Dialer, Network};
pub use dns::DnsTransport;
pub use http::{HttpRequest, HttpResponse, HttpTransport};
pub use resolver::Resolver;
pub use tls::{TlsConn, TlsDialer, TlsHandshakeParams, TlsHandshaker, TlsNegotiation};
