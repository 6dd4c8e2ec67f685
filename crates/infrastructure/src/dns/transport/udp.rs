//! DNS over UDP (RFC 1035 §4.2.1). No framing; one socket per query.

use super::os_timeout;
use async_trait::async_trait;
use netsonde_application::{BoxConn, Dialer, DnsTransport, MeasureContext, Network};
use netsonde_domain::NetError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Maximum reply size we accept over UDP with EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh connected datagram socket per query through the
/// dialer chain, so DNS traffic is visible to the same instrumentation
/// as every other connection.
pub struct UdpDnsTransport {
    dialer: Arc<dyn Dialer + Send + Sync>,
    server_addr: SocketAddr,
}

impl UdpDnsTransport {
    pub fn new(dialer: Arc<dyn Dialer + Send + Sync>, server_addr: SocketAddr) -> Self {
        Self {
            dialer,
            server_addr,
        }
    }

    async fn exchange(&self, mut conn: BoxConn, query: &[u8]) -> Result<Vec<u8>, NetError> {
        conn.write_all(query).await?;
        let mut reply = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let n = conn.read(&mut reply).await?;
        reply.truncate(n);
        debug!(server = %self.server_addr, bytes_received = n, "udp reply received");
        Ok(reply)
    }
}

#[async_trait]
impl DnsTransport for UdpDnsTransport {
    async fn round_trip(&self, cx: &MeasureContext, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let address = self.server_addr.to_string();
        cx.bounded(async {
            // The per-query deadline covers the dial too, so a stalled
            // dial is a retryable timeout rather than an open-ended wait.
            tokio::time::timeout(QUERY_TIMEOUT, async {
                let conn = self.dialer.dial(cx, Network::Udp, &address).await?;
                self.exchange(conn, query).await
            })
            .await
            .map_err(|_| os_timeout())?
        })
        .await
    }

    fn requires_padding(&self) -> bool {
        false
    }

    fn network(&self) -> &'static str {
        "udp"
    }

    fn address(&self) -> String {
        self.server_addr.to_string()
    }
}
