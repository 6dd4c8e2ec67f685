//! Hostname-resolving dialer: turns `host:port` into per-address
//! connect attempts, tried in resolver order (IPv4 first).

use async_trait::async_trait;
use netsonde_application::{BoxConn, Dialer, MeasureContext, Network, Resolver};
use netsonde_domain::{parse_host_port, Failure, NetError};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

pub struct ResolveDialer {
    inner: Arc<dyn Dialer + Send + Sync>,
    resolver: Arc<dyn Resolver + Send + Sync>,
}

impl ResolveDialer {
    pub fn new(
        inner: Arc<dyn Dialer + Send + Sync>,
        resolver: Arc<dyn Resolver + Send + Sync>,
    ) -> Self {
        Self { inner, resolver }
    }
}

fn endpoint_for(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}

/// Reduces the per-address connect errors to one representative error:
/// the first already-classified error with an informative failure kind
/// wins, otherwise the very first error. Addresses are tried IPv4
/// first, so IPv4 failure reasons are preferred.
fn reduce_errors(mut errors: Vec<NetError>) -> NetError {
    debug_assert!(!errors.is_empty());
    let informative = errors.iter().position(|err| {
        matches!(
            err,
            NetError::Classified(classified)
                if !matches!(classified.failure, Failure::Unknown(_))
        )
    });
    match informative {
        Some(index) => errors.swap_remove(index),
        None => errors.swap_remove(0),
    }
}

#[async_trait]
impl Dialer for ResolveDialer {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError> {
        let (host, port) = parse_host_port(address)
            .ok_or_else(|| NetError::InvalidAddress(format!("not host:port: {address}")))?;

        // Literal IPs skip resolution entirely.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.inner.dial(cx, network, &endpoint_for(ip, port)).await;
        }

        let addresses = self.resolver.lookup_host(cx, host).await?;
        let mut errors = Vec::new();
        for ip in addresses {
            let endpoint = endpoint_for(ip, port);
            match self.inner.dial(cx, network, &endpoint).await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    debug!(endpoint = %endpoint, error = %err, "connect attempt failed");
                    errors.push(err);
                }
            }
        }
        if errors.is_empty() {
            return Err(NetError::DnsNoAnswer);
        }
        Err(reduce_errors(errors))
    }
}
