use crate::ctx::MeasureContext;
use async_trait::async_trait;
use netsonde_domain::NetError;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        }
    }
}

/// A stream owned by the caller once the dialer returns it. UDP sockets
/// are wrapped with connected-datagram semantics so instrumentation can
/// treat every transport uniformly.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

pub type BoxConn = Box<dyn Connection>;

impl Connection for BoxConn {
    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }
}

/// Establishes a connection to `address` (`host:port`; the host may be a
/// hostname when a resolving decorator sits in the chain).
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError>;
}
