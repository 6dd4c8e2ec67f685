//! The platform resolver, used when no explicit DNS transport is
//! configured.

use async_trait::async_trait;
use netsonde_application::{MeasureContext, Resolver};
use netsonde_domain::NetError;
use std::net::IpAddr;

pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        // lookup_host wants host:port; the port is discarded below.
        let target = format!("{hostname}:0");
        let resolved = cx
            .bounded(async { Ok(tokio::net::lookup_host(target).await?) })
            .await?;

        // A records before AAAA records, matching the explicit
        // transports.
        let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) = resolved
            .map(|sa| sa.ip())
            .partition(|ip| ip.is_ipv4());
        let mut addresses = v4;
        addresses.extend(v6);
        if addresses.is_empty() {
            return Err(NetError::DnsNxdomain);
        }
        Ok(addresses)
    }
}
