//! The serial resolver: one A lookup, then one AAAA lookup, each with a
//! bounded retry policy, over a single [`DnsTransport`].

use crate::dns::codec;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use netsonde_application::{DnsTransport, MeasureContext, Resolver};
use netsonde_domain::{Event, EventKind, NetError};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

const MAX_ATTEMPTS: usize = 3;

pub struct SerialResolver {
    transport: Arc<dyn DnsTransport + Send + Sync>,
    timeouts: AtomicU64,
}

impl SerialResolver {
    pub fn new(transport: Arc<dyn DnsTransport + Send + Sync>) -> Self {
        Self {
            transport,
            timeouts: AtomicU64::new(0),
        }
    }

    /// How many OS-level timeouts the retry loop has observed so far.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn network(&self) -> &'static str {
        self.transport.network()
    }

    pub fn address(&self) -> String {
        self.transport.address()
    }

    async fn lookup(
        &self,
        cx: &MeasureContext,
        hostname: &str,
        query_type: RecordType,
    ) -> Result<Vec<IpAddr>, NetError> {
        let query =
            codec::encode_query(hostname, query_type, self.transport.requires_padding())?;
        let reply = self.round_trip_with_retry(cx, &query).await?;
        codec::decode_reply(query_type, &reply)
    }

    /// At most [`MAX_ATTEMPTS`] round trips; only an OS-level timeout is
    /// retried, a caller-deadline expiry or any other failure aborts on
    /// the spot. Always returns the first observed error so the outer
    /// classifier still sees the original failure.
    async fn round_trip_with_retry(
        &self,
        cx: &MeasureContext,
        query: &[u8],
    ) -> Result<Vec<u8>, NetError> {
        let mut errors: Vec<NetError> = Vec::new();
        for attempt in 0..MAX_ATTEMPTS {
            let mut query_event = Event::new(EventKind::DnsQuery, cx.elapsed());
            query_event.transaction_id = Some(cx.transaction_id());
            query_event.dns_query = Some(query.to_vec());
            query_event.transport_network = Some(self.transport.network());
            query_event.transport_address = Some(self.transport.address());
            cx.trace().push(query_event);

            let started = cx.elapsed();
            match self.transport.round_trip(cx, query).await {
                Ok(reply) => {
                    let now = cx.elapsed();
                    let mut reply_event = Event::new(EventKind::DnsReply, now);
                    reply_event.transaction_id = Some(cx.transaction_id());
                    reply_event.duration = Some(now - started);
                    reply_event.dns_reply = Some(reply.clone());
                    reply_event.transport_network = Some(self.transport.network());
                    reply_event.transport_address = Some(self.transport.address());
                    cx.trace().push(reply_event);
                    return Ok(reply);
                }
                Err(err) => {
                    let retryable = err.is_os_timeout();
                    if retryable {
                        self.timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!(
                        attempt = attempt + 1,
                        retryable,
                        error = %err,
                        "dns round trip failed"
                    );
                    errors.push(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }
        // Non-empty by construction: the loop only exits after at least
        // one push.
        Err(errors.swap_remove(0))
    }
}

#[async_trait]
impl Resolver for SerialResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        let mut addresses = Vec::new();

        let a_result = self.lookup(cx, hostname, RecordType::A).await;
        if let Ok(found) = &a_result {
            addresses.extend_from_slice(found);
        }
        let aaaa_result = self.lookup(cx, hostname, RecordType::AAAA).await;
        if let Ok(found) = &aaaa_result {
            addresses.extend_from_slice(found);
        }

        if addresses.is_empty() {
            // Both failed. Report the A-lookup error; the AAAA error is
            // swallowed on purpose, changing this tie-break would change
            // measurement semantics.
            return Err(match a_result {
                Err(err) => err,
                Ok(_) => match aaaa_result {
                    Err(err) => err,
                    Ok(_) => NetError::DnsNoAnswer,
                },
            });
        }
        Ok(addresses)
    }
}
