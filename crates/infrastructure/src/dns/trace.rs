//! The outermost resolver decorator: writes resolve-start/resolve-done
//! events, classifies outgoing errors under `resolve`, and applies the
//! bogon policy.
//!
//! Bogons are evidence of DNS interference on some networks and
//! ordinary internal infrastructure on others, so the policy is
//! configurable: either a dedicated failure, or the addresses pass
//! through with the done event tagged `contains_bogons`.

use async_trait::async_trait;
use netsonde_application::{MeasureContext, Resolver};
use netsonde_domain::{classify, is_bogon, Event, EventKind, NetError, Operation};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TraceResolver {
    inner: Arc<dyn Resolver + Send + Sync>,
    bogon_is_error: bool,
    bogons_seen: AtomicU64,
}

impl TraceResolver {
    pub fn new(inner: Arc<dyn Resolver + Send + Sync>, bogon_is_error: bool) -> Self {
        Self {
            inner,
            bogon_is_error,
            bogons_seen: AtomicU64::new(0),
        }
    }

    pub fn bogons_seen(&self) -> u64 {
        self.bogons_seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Resolver for TraceResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        let started = cx.elapsed();
        let mut start_event = Event::new(EventKind::ResolveStart, started);
        start_event.transaction_id = Some(cx.transaction_id());
        start_event.hostname = Some(hostname.to_string());
        cx.trace().push(start_event);

        let result = self.inner.lookup_host(cx, hostname).await;

        let now = cx.elapsed();
        let mut done_event = Event::new(EventKind::ResolveDone, now);
        done_event.transaction_id = Some(cx.transaction_id());
        done_event.hostname = Some(hostname.to_string());
        done_event.duration = Some(now - started);
        done_event.operation = Some(Operation::Resolve.as_str());

        let outcome = match result {
            Ok(addresses) => {
                let contains_bogons = addresses.iter().any(|ip| is_bogon(*ip));
                if contains_bogons {
                    self.bogons_seen.fetch_add(1, Ordering::Relaxed);
                    warn!(hostname, "dns reply contains bogon addresses");
                }
                done_event.addresses =
                    Some(addresses.iter().map(|ip| ip.to_string()).collect());
                done_event.contains_bogons = Some(contains_bogons);
                if contains_bogons && self.bogon_is_error {
                    Err(NetError::DnsBogon { addresses })
                } else {
                    Ok(addresses)
                }
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(addresses) => {
                debug!(hostname, count = addresses.len(), "resolve succeeded");
                cx.trace().push(done_event);
                Ok(addresses)
            }
            Err(err) => {
                let classified = classify(err, Operation::Resolve);
                done_event.failure = Some(classified.failure_string());
                cx.trace().push(done_event);
                Err(classified.into())
            }
        }
    }
}
