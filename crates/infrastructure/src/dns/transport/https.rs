//! DNS over HTTPS (RFC 8484): POST with `application/dns-message`
//! bodies, through the instrumented HTTP transport so the nested query
//! shows up in the trace with its own transaction id.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::Method;
use netsonde_application::{DnsTransport, HttpTransport, MeasureContext};
use netsonde_domain::NetError;
use std::sync::Arc;
use tracing::debug;

const DNS_MESSAGE_MIME: &str = "application/dns-message";

pub struct HttpsDnsTransport {
    transport: Arc<dyn HttpTransport + Send + Sync>,
    url: String,
}

impl HttpsDnsTransport {
    pub fn new(transport: Arc<dyn HttpTransport + Send + Sync>, url: String) -> Self {
        Self { transport, url }
    }
}

#[async_trait]
impl DnsTransport for HttpsDnsTransport {
    async fn round_trip(&self, cx: &MeasureContext, query: &[u8]) -> Result<Vec<u8>, NetError> {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri(&self.url)
            .header(CONTENT_TYPE, DNS_MESSAGE_MIME)
            .header(ACCEPT, DNS_MESSAGE_MIME)
            .body(Bytes::copy_from_slice(query))
            .map_err(|e| NetError::Other(format!("doh request build failed: {e}")))?;

        let response = self.transport.round_trip(cx, request).await?;

        if !response.status().is_success() {
            return Err(NetError::Other(format!(
                "doh query failed with status {}",
                response.status().as_u16()
            )));
        }
        let content_type_ok = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == DNS_MESSAGE_MIME)
            .unwrap_or(false);
        if !content_type_ok {
            return Err(NetError::Other(
                "doh reply has missing or mismatched content-type".to_string(),
            ));
        }

        let body = response.into_body();
        debug!(url = %self.url, bytes_received = body.len(), "doh reply received");
        Ok(body.to_vec())
    }

    fn requires_padding(&self) -> bool {
        true
    }

    fn network(&self) -> &'static str {
        "doh"
    }

    fn address(&self) -> String {
        self.url.clone()
    }
}
