use crate::ctx::MeasureContext;
use async_trait::async_trait;
use netsonde_domain::NetError;

/// "Send encoded query bytes, receive reply bytes" over one of the four
/// wire strategies (UDP, TCP, DoT, DoH).
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn round_trip(&self, cx: &MeasureContext, query: &[u8]) -> Result<Vec<u8>, NetError>;

    /// Whether queries must carry EDNS0 padding (RFC 8467: mandatory for
    /// the encrypted transports, forbidden for UDP/TCP).
    fn requires_padding(&self) -> bool;

    /// Transport network for diagnostics, e.g. `udp`, `dot`, `doh`.
    fn network(&self) -> &'static str;

    /// The upstream server address or URL, for diagnostics.
    fn address(&self) -> String;
}
