//! DNS over TLS (RFC 7858). Same framing as TCP, over a connection
//! obtained from the TLS dialer chain. Queries carry RFC 8467 padding.

use super::os_timeout;
use super::tcp::{read_prefixed, write_prefixed};
use async_trait::async_trait;
use netsonde_application::{DnsTransport, MeasureContext, TlsDialer};
use netsonde_domain::NetError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TlsDnsTransport {
    dialer: Arc<dyn TlsDialer + Send + Sync>,
    /// `host:port` of the upstream, port conventionally 853.
    address: String,
}

impl TlsDnsTransport {
    pub fn new(dialer: Arc<dyn TlsDialer + Send + Sync>, address: String) -> Self {
        Self { dialer, address }
    }
}

#[async_trait]
impl DnsTransport for TlsDnsTransport {
    async fn round_trip(&self, cx: &MeasureContext, query: &[u8]) -> Result<Vec<u8>, NetError> {
        cx.bounded(async {
            // The per-query deadline covers the dial too, so a stalled
            // dial is a retryable timeout rather than an open-ended wait.
            tokio::time::timeout(QUERY_TIMEOUT, async {
                let tls = self.dialer.dial_tls(cx, &self.address).await?;
                let mut conn = tls.conn;
                write_prefixed(&mut conn, query).await?;
                let reply = read_prefixed(&mut conn).await?;
                debug!(
                    server = %self.address,
                    bytes_received = reply.len(),
                    "dot reply received"
                );
                Ok(reply)
            })
            .await
            .map_err(|_| os_timeout())?
        })
        .await
    }

    fn requires_padding(&self) -> bool {
        true
    }

    fn network(&self) -> &'static str {
        "dot"
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}
