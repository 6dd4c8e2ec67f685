//! DNS over TCP (RFC 1035 §4.2.2): 2-octet big-endian length prefix
//! before each message. One connection per query; pooling is a known
//! limitation.

use super::os_timeout;
use async_trait::async_trait;
use netsonde_application::{Connection, Dialer, DnsTransport, MeasureContext, Network};
use netsonde_domain::NetError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) async fn write_prefixed<C>(conn: &mut C, message: &[u8]) -> Result<(), NetError>
where
    C: Connection + ?Sized,
{
    if message.len() > u16::MAX as usize {
        return Err(NetError::Other(format!(
            "dns query too large for tcp framing: {} bytes",
            message.len()
        )));
    }
    conn.write_all(&(message.len() as u16).to_be_bytes()).await?;
    conn.write_all(message).await?;
    Ok(())
}

pub(crate) async fn read_prefixed<C>(conn: &mut C) -> Result<Vec<u8>, NetError>
where
    C: Connection + ?Sized,
{
    let mut prefix = [0u8; 2];
    conn.read_exact(&mut prefix).await?;
    let length = u16::from_be_bytes(prefix) as usize;
    let mut reply = vec![0u8; length];
    conn.read_exact(&mut reply).await?;
    Ok(reply)
}

pub struct TcpDnsTransport {
    dialer: Arc<dyn Dialer + Send + Sync>,
    server_addr: SocketAddr,
}

impl TcpDnsTransport {
    pub fn new(dialer: Arc<dyn Dialer + Send + Sync>, server_addr: SocketAddr) -> Self {
        Self {
            dialer,
            server_addr,
        }
    }
}

#[async_trait]
impl DnsTransport for TcpDnsTransport {
    async fn round_trip(&self, cx: &MeasureContext, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let address = self.server_addr.to_string();
        cx.bounded(async {
            // The per-query deadline covers the dial too, so a stalled
            // dial is a retryable timeout rather than an open-ended wait.
            tokio::time::timeout(QUERY_TIMEOUT, async {
                let mut conn = self.dialer.dial(cx, Network::Tcp, &address).await?;
                write_prefixed(&mut conn, query).await?;
                let reply = read_prefixed(&mut conn).await?;
                debug!(
                    server = %self.server_addr,
                    bytes_received = reply.len(),
                    "tcp reply received"
                );
                Ok(reply)
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
        "tcp"
    }

    fn address(&self) -> String {
        self.server_addr.to_string()
    }
}
