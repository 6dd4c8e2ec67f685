use crate::ctx::MeasureContext;
use async_trait::async_trait;
use netsonde_domain::NetError;
use std::net::IpAddr;

/// Turns a hostname into an ordered list of addresses, A records before
/// AAAA records. Decorators (bogon handling, IDNA, caching, chaining,
/// tracing) all implement this same trait and forward to an inner
/// resolver.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError>;
}
