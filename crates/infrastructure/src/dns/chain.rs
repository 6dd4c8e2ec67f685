//! Fallback chaining: try a primary resolver, and on any failure hand
//! the lookup to a secondary. The caller sees the secondary's outcome,
//! success or failure.

use async_trait::async_trait;
use netsonde_application::{MeasureContext, Resolver};
use netsonde_domain::NetError;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

pub struct ChainResolver {
    primary: Arc<dyn Resolver + Send + Sync>,
    secondary: Arc<dyn Resolver + Send + Sync>,
}

impl ChainResolver {
    pub fn new(
        primary: Arc<dyn Resolver + Send + Sync>,
        secondary: Arc<dyn Resolver + Send + Sync>,
    ) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Resolver for ChainResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        match self.primary.lookup_host(cx, hostname).await {
            Ok(addresses) => Ok(addresses),
            Err(err) => {
                debug!(hostname, error = %err, "primary resolver failed, falling back");
                self.secondary.lookup_host(cx, hostname).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsonde_domain::TraceLog;

    fn test_context() -> MeasureContext {
        MeasureContext::new(Arc::new(TraceLog::new()))
    }

    struct FixedResolver(Result<Vec<IpAddr>, ()>);

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn lookup_host(
            &self,
            _cx: &MeasureContext,
            _hostname: &str,
        ) -> Result<Vec<IpAddr>, NetError> {
            match &self.0 {
                Ok(addresses) => Ok(addresses.clone()),
                Err(()) => Err(NetError::DnsServerFailure),
            }
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let chain = ChainResolver::new(
            Arc::new(FixedResolver(Ok(vec!["1.1.1.1".parse().unwrap()]))),
            Arc::new(FixedResolver(Err(()))),
        );
        let got = chain
            .lookup_host(&test_context(), "example.com")
            .await
            .unwrap();
        assert_eq!(got, vec!["1.1.1.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_fallback_outcome_is_returned() {
        let chain = ChainResolver::new(
            Arc::new(FixedResolver(Err(()))),
            Arc::new(FixedResolver(Ok(vec!["8.8.8.8".parse().unwrap()]))),
        );
        let got = chain
            .lookup_host(&test_context(), "example.com")
            .await
            .unwrap();
        assert_eq!(got, vec!["8.8.8.8".parse::<IpAddr>().unwrap()]);

        let chain = ChainResolver::new(
            Arc::new(FixedResolver(Err(()))),
            Arc::new(FixedResolver(Err(()))),
        );
        let err = chain
            .lookup_host(&test_context(), "example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::DnsServerFailure));
    }
}
