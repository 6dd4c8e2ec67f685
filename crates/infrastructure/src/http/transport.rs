//! The hyper-based HTTP round-tripper: one connection per host, chosen
//! protocol follows ALPN, bodies fully buffered with a capped snapshot
//! in the trace.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::{HOST, USER_AGENT};
use http::uri::Scheme;
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use netsonde_application::{
    Dialer, HttpRequest, HttpResponse, HttpTransport, MeasureContext, Network, TlsDialer,
};
use netsonde_domain::{classify, ClassifiedError, Event, EventKind, NetError, Operation};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Matches the probe's historical snapshot cap of 128 KiB.
pub const DEFAULT_SNAPSHOT_SIZE: usize = 1 << 17;

const DEFAULT_USER_AGENT: &str = concat!("netsonde/", env!("CARGO_PKG_VERSION"));

enum SendHandle {
    Http1(http1::SendRequest<Full<Bytes>>),
    Http2(http2::SendRequest<Full<Bytes>>),
}

impl SendHandle {
    async fn ready(&mut self) -> Result<(), hyper::Error> {
        match self {
            SendHandle::Http1(handle) => handle.ready().await,
            SendHandle::Http2(handle) => handle.ready().await,
        }
    }

    async fn send(
        &mut self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<hyper::body::Incoming>, hyper::Error> {
        match self {
            SendHandle::Http1(handle) => handle.send_request(request).await,
            SendHandle::Http2(handle) => handle.send_request(request).await,
        }
    }

    fn is_http2(&self) -> bool {
        matches!(self, SendHandle::Http2(_))
    }
}

/// Caller-owned with an explicit lifetime: create once per session,
/// dropped with it. One connection per host keeps the trace quiet and
/// plays well with upstreams that rate-limit per connection.
pub struct NetHttpTransport {
    dialer: Arc<dyn Dialer + Send + Sync>,
    tls_dialer: Arc<dyn TlsDialer + Send + Sync>,
    pool: DashMap<String, Arc<Mutex<Option<SendHandle>>>>,
    snapshot_size: usize,
    user_agent: String,
}

impl NetHttpTransport {
    pub fn new(
        dialer: Arc<dyn Dialer + Send + Sync>,
        tls_dialer: Arc<dyn TlsDialer + Send + Sync>,
    ) -> Self {
        Self {
            dialer,
            tls_dialer,
            pool: DashMap::new(),
            snapshot_size: DEFAULT_SNAPSHOT_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_snapshot_size(mut self, snapshot_size: usize) -> Self {
        self.snapshot_size = snapshot_size;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    async fn connect(
        &self,
        cx: &MeasureContext,
        host: &str,
        port: u16,
        is_tls: bool,
    ) -> Result<SendHandle, NetError> {
        let endpoint = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let handle = if is_tls {
            let tls = self.tls_dialer.dial_tls(cx, &endpoint).await?;
            let use_h2 = tls.negotiation.negotiated_protocol.as_deref() == Some("h2");
            if use_h2 {
                let (send, conn) =
                    http2::handshake(TokioExecutor::new(), TokioIo::new(tls.conn))
                        .await
                        .map_err(from_hyper)?;
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!(error = %err, "http2 connection ended");
                    }
                });
                SendHandle::Http2(send)
            } else {
                let (send, conn) = http1::handshake(TokioIo::new(tls.conn))
                    .await
                    .map_err(from_hyper)?;
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!(error = %err, "http1 connection ended");
                    }
                });
                SendHandle::Http1(send)
            }
        } else {
            let conn = self.dialer.dial(cx, Network::Tcp, &endpoint).await?;
            let (send, conn) = http1::handshake(TokioIo::new(conn))
                .await
                .map_err(from_hyper)?;
            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    debug!(error = %err, "http1 connection ended");
                }
            });
            SendHandle::Http1(send)
        };
        Ok(handle)
    }

    /// Fills in the default User-Agent only when the caller set none;
    /// an explicitly empty header suppresses the User-Agent entirely.
    fn normalize_user_agent(&self, request: &mut HttpRequest) {
        match request.headers().get(USER_AGENT) {
            None => {
                if let Ok(value) = self.user_agent.parse() {
                    request.headers_mut().insert(USER_AGENT, value);
                }
            }
            Some(value) if value.is_empty() => {
                request.headers_mut().remove(USER_AGENT);
            }
            Some(_) => {}
        }
    }

    async fn round_trip_inner(
        &self,
        cx: &MeasureContext,
        request: HttpRequest,
    ) -> Result<HttpResponse, NetError> {
        let uri = request.uri().clone();
        let (key, host, port, is_tls) = endpoint_of(&uri)?;

        // One slot per host, dialed under the slot lock, so two round
        // trips racing on a cold pool cannot both open a connection to
        // the same upstream.
        let slot = self.pool.entry(key).or_default().clone();
        let mut guard = slot.lock().await;
        // A connection the peer already closed is replaced, not reused.
        let reusable = match guard.as_mut() {
            Some(handle) => handle.ready().await.is_ok(),
            None => false,
        };
        if !reusable {
            *guard = Some(self.connect(cx, &host, port, is_tls).await?);
        }
        let handle = match guard.as_mut() {
            Some(handle) => handle,
            None => {
                return Err(NetError::Other(
                    "http connection slot unexpectedly empty".to_string(),
                ))
            }
        };

        let (parts, body) = request.into_parts();
        let mut hyper_request = http::Request::from_parts(parts, Full::new(body));
        if handle.is_http2() {
            // h2 carries the authority in the :authority pseudo-header,
            // derived from the full URI.
        } else {
            if let Some(authority) = uri.authority() {
                if let Ok(value) = authority.as_str().parse() {
                    hyper_request.headers_mut().insert(HOST, value);
                }
            }
            // Connection-level http1 wants an origin-form target.
            let mut target = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
                .to_string();
            if target.is_empty() {
                target = "/".to_string();
            }
            *hyper_request.uri_mut() = target
                .parse()
                .map_err(|_| NetError::InvalidAddress(format!("bad request target: {target}")))?;
        }

        let send_future = handle.send(hyper_request);

        let mut headers_event = Event::new(EventKind::HttpHeadersWritten, cx.elapsed());
        headers_event.transaction_id = Some(cx.transaction_id());
        cx.trace().push(headers_event);

        let response = cx
            .bounded(async { send_future.await.map_err(from_hyper) })
            .await?;

        let mut first_byte_event = Event::new(EventKind::HttpResponseFirstByte, cx.elapsed());
        first_byte_event.transaction_id = Some(cx.transaction_id());
        cx.trace().push(first_byte_event);

        let (parts, body) = response.into_parts();
        let collected = cx
            .bounded(async { body.collect().await.map_err(from_hyper) })
            .await?;
        Ok(http::Response::from_parts(parts, collected.to_bytes()))
    }
}

#[async_trait]
impl HttpTransport for NetHttpTransport {
    async fn round_trip(
        &self,
        cx: &MeasureContext,
        mut request: HttpRequest,
    ) -> Result<HttpResponse, NetError> {
        // Each round trip gets its own transaction id, so a DoH lookup
        // nested under an HTTP measurement is distinguishable from the
        // request it serves.
        let cx = cx.child_transaction();
        self.normalize_user_agent(&mut request);

        let started = cx.elapsed();
        let mut start_event = Event::new(EventKind::HttpRoundTripStart, started);
        start_event.transaction_id = Some(cx.transaction_id());
        start_event.http_method = Some(request.method().to_string());
        start_event.http_url = Some(request.uri().to_string());
        start_event.http_request_headers = Some(header_pairs(request.headers()));
        if !request.body().is_empty() {
            let cap = self.snapshot_size.min(request.body().len());
            start_event.http_body_snapshot = Some(request.body()[..cap].to_vec());
            start_event.body_is_truncated = Some(request.body().len() > cap);
        }
        cx.trace().push(start_event);

        let result = self.round_trip_inner(&cx, request).await;

        let now = cx.elapsed();
        let mut done_event = Event::new(EventKind::HttpRoundTripDone, now);
        done_event.transaction_id = Some(cx.transaction_id());
        done_event.duration = Some(now - started);
        done_event.operation = Some(Operation::HttpRoundTrip.as_str());

        match result {
            Ok(response) => {
                done_event.http_status = Some(response.status().as_u16());
                done_event.http_response_headers = Some(header_pairs(response.headers()));
                let cap = self.snapshot_size.min(response.body().len());
                done_event.http_body_snapshot = Some(response.body()[..cap].to_vec());
                done_event.body_is_truncated = Some(response.body().len() > cap);
                cx.trace().push(done_event);
                Ok(response)
            }
            Err(err) => {
                let classified = classify(err, Operation::HttpRoundTrip);
                done_event.failure = Some(classified.failure_string());
                cx.trace().push(done_event);
                Err(classified.into())
            }
        }
    }
}

fn endpoint_of(uri: &Uri) -> Result<(String, String, u16, bool), NetError> {
    let scheme = uri.scheme().cloned().unwrap_or(Scheme::HTTP);
    let is_tls = scheme == Scheme::HTTPS;
    let host = uri
        .host()
        .ok_or_else(|| NetError::InvalidAddress(format!("url without host: {uri}")))?
        .to_string();
    let port = uri.port_u16().unwrap_or(if is_tls { 443 } else { 80 });
    let key = format!("{scheme}://{host}:{port}");
    Ok((key, host, port, is_tls))
}

fn header_pairs(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Digs a classified error back out of hyper's error chain, so a
/// connect or TLS failure keeps its original major operation.
fn from_hyper(err: hyper::Error) -> NetError {
    let mut source = std::error::Error::source(&err);
    while let Some(current) = source {
        if let Some(classified) = current.downcast_ref::<ClassifiedError>() {
            return NetError::Classified(classified.clone());
        }
        source = current.source();
    }
    if err.is_timeout() {
        warn!(error = %err, "http round trip timed out");
    }
    NetError::Other(err.to_string())
}
