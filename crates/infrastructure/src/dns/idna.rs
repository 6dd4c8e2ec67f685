//! IDNA normalization: Unicode hostnames become Punycode before they
//! reach the wire. Fails closed, a name that cannot be converted is
//! never queried raw.

use async_trait::async_trait;
use netsonde_application::{MeasureContext, Resolver};
use netsonde_domain::NetError;
use std::net::IpAddr;
use std::sync::Arc;

pub struct IdnaResolver {
    inner: Arc<dyn Resolver + Send + Sync>,
}

impl IdnaResolver {
    pub fn new(inner: Arc<dyn Resolver + Send + Sync>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Resolver for IdnaResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        let ascii = idna::domain_to_ascii(hostname)
            .map_err(|e| NetError::Idna(format!("cannot convert {hostname:?}: {e}")))?;
        self.inner.lookup_host(cx, &ascii).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsonde_domain::TraceLog;
    use std::sync::Mutex;

    struct RecordingResolver {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Resolver for RecordingResolver {
        async fn lookup_host(
            &self,
            _cx: &MeasureContext,
            hostname: &str,
        ) -> Result<Vec<IpAddr>, NetError> {
            self.seen.lock().unwrap().push(hostname.to_string());
            Ok(vec!["93.184.216.34".parse().unwrap()])
        }
    }

    #[tokio::test]
    async fn test_unicode_is_punycoded() {
        let inner = Arc::new(RecordingResolver {
            seen: Mutex::new(Vec::new()),
        });
        let resolver = IdnaResolver::new(inner.clone());
        let cx = MeasureContext::new(Arc::new(TraceLog::new()));
        resolver.lookup_host(&cx, "яндекс.рф").await.unwrap();
        assert_eq!(
            inner.seen.lock().unwrap().as_slice(),
            ["xn--d1acpjx3f.xn--p1ai"]
        );
    }

    #[tokio::test]
    async fn test_ascii_passes_through() {
        let inner = Arc::new(RecordingResolver {
            seen: Mutex::new(Vec::new()),
        });
        let resolver = IdnaResolver::new(inner.clone());
        let cx = MeasureContext::new(Arc::new(TraceLog::new()));
        resolver.lookup_host(&cx, "example.com").await.unwrap();
        assert_eq!(inner.seen.lock().unwrap().as_slice(), ["example.com"]);
    }

    #[tokio::test]
    async fn test_invalid_name_fails_closed() {
        let inner = Arc::new(RecordingResolver {
            seen: Mutex::new(Vec::new()),
        });
        let resolver = IdnaResolver::new(inner.clone());
        let cx = MeasureContext::new(Arc::new(TraceLog::new()));
        let err = resolver
            .lookup_host(&cx, "xn--this-is-not-valid-punycode-\u{ffff}")
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Idna(_)));
        assert!(inner.seen.lock().unwrap().is_empty());
    }
}
