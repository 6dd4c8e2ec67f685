//! Connect tracing plus the transparent connection proxy that times and
//! reports every read, write and close.

use async_trait::async_trait;
use netsonde_application::{BoxConn, Connection, Dialer, MeasureContext, Network};
use netsonde_domain::{classify, Event, EventKind, NetError, Operation, TraceLog};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Session-wide wire byte counters, shared by every measured
/// connection when byte counting is enabled.
#[derive(Debug, Default)]
pub struct ByteCounters {
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
}

pub struct TraceDialer {
    inner: Arc<dyn Dialer + Send + Sync>,
    counters: Option<Arc<ByteCounters>>,
}

impl TraceDialer {
    pub fn new(inner: Arc<dyn Dialer + Send + Sync>) -> Self {
        Self {
            inner,
            counters: None,
        }
    }

    pub fn with_byte_counters(mut self, counters: Arc<ByteCounters>) -> Self {
        self.counters = Some(counters);
        self
    }
}

#[async_trait]
impl Dialer for TraceDialer {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError> {
        let started = cx.elapsed();
        let result = self.inner.dial(cx, network, address).await;

        let now = cx.elapsed();
        let mut event = Event::new(EventKind::Connect, now);
        event.transaction_id = Some(cx.transaction_id());
        event.duration = Some(now - started);
        event.operation = Some(Operation::Connect.as_str());
        event.transport_network = Some(network.as_str());
        event.address = Some(address.to_string());

        match result {
            Ok(conn) => {
                cx.trace().push(event);
                Ok(Box::new(MeasuredConn {
                    remote: conn.peer_addr(),
                    inner: conn,
                    trace: cx.trace_handle(),
                    transaction_id: cx.transaction_id(),
                    counters: self.counters.clone(),
                    read_started: None,
                    write_started: None,
                }))
            }
            Err(err) => {
                let classified = classify(err, Operation::Connect);
                event.failure = Some(classified.failure_string());
                cx.trace().push(event);
                Err(classified.into())
            }
        }
    }
}

/// Shares the connection with the caller by design: a transparent
/// proxy, not a second owner.
pub struct MeasuredConn {
    inner: BoxConn,
    trace: Arc<TraceLog>,
    transaction_id: u64,
    remote: Option<SocketAddr>,
    counters: Option<Arc<ByteCounters>>,
    read_started: Option<Duration>,
    write_started: Option<Duration>,
}

impl MeasuredConn {
    fn push_io_event(
        &self,
        kind: EventKind,
        started: Option<Duration>,
        num_bytes: Option<usize>,
        failure: Option<String>,
    ) {
        let now = self.trace.elapsed();
        let mut event = Event::new(kind, now);
        event.transaction_id = Some(self.transaction_id);
        event.duration = started.map(|s| now - s);
        event.num_bytes = num_bytes;
        event.failure = failure;
        event.address = self.remote.map(|a| a.to_string());
        event.operation = Some(match kind {
            EventKind::Read => Operation::Read.as_str(),
            EventKind::Write => Operation::Write.as_str(),
            _ => Operation::Close.as_str(),
        });
        self.trace.push(event);
    }

    fn wrap_io_error(err: io::Error, operation: Operation) -> io::Error {
        let kind = err.kind();
        let classified = classify(NetError::Io(err), operation);
        io::Error::new(kind, classified)
    }
}

impl AsyncRead for MeasuredConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.read_started.is_none() {
            self.read_started = Some(self.trace.elapsed());
        }
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if let Some(counters) = &self.counters {
                    counters.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                }
                let started = self.read_started.take();
                self.push_io_event(EventKind::Read, started, Some(n), None);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                let err = Self::wrap_io_error(err, Operation::Read);
                let started = self.read_started.take();
                self.push_io_event(
                    EventKind::Read,
                    started,
                    None,
                    Some(err.get_ref().map(|e| e.to_string()).unwrap_or_default()),
                );
                Poll::Ready(Err(err))
            }
        }
    }
}

impl AsyncWrite for MeasuredConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.write_started.is_none() {
            self.write_started = Some(self.trace.elapsed());
        }
        match Pin::new(&mut self.inner).poll_write(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(n)) => {
                if let Some(counters) = &self.counters {
                    counters.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                }
                let started = self.write_started.take();
                self.push_io_event(EventKind::Write, started, Some(n), None);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(err)) => {
                let err = Self::wrap_io_error(err, Operation::Write);
                let started = self.write_started.take();
                self.push_io_event(
                    EventKind::Write,
                    started,
                    None,
                    Some(err.get_ref().map(|e| e.to_string()).unwrap_or_default()),
                );
                Poll::Ready(Err(err))
            }
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::new(&mut self.inner).poll_shutdown(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                self.push_io_event(EventKind::Close, None, None, None);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                let err = Self::wrap_io_error(err, Operation::Close);
                self.push_io_event(
                    EventKind::Close,
                    None,
                    None,
                    Some(err.get_ref().map(|e| e.to_string()).unwrap_or_default()),
                );
                Poll::Ready(Err(err))
            }
        }
    }
}

impl Connection for MeasuredConn {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}
