//! The trace event model and the append-only event log.
//!
//! Every instrumentation decorator writes [`Event`]s to a shared
//! [`TraceLog`]; the excluded report layer reads the finished log with
//! [`TraceLog::read_all`] to build protocol-specific measurement records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What kind of observation an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ResolveStart,
    ResolveDone,
    DnsQuery,
    DnsReply,
    Connect,
    Read,
    Write,
    Close,
    TlsHandshakeStart,
    TlsHandshakeDone,
    HttpRoundTripStart,
    HttpRoundTripDone,
    HttpHeadersWritten,
    HttpResponseFirstByte,
}

/// One observation on the wire. Immutable once appended to a log.
///
/// `time` is the monotonic offset since the owning log was created; done
/// events additionally carry `duration`, computed from the same clock
/// reading as their start event. Only the fields relevant to `kind` are
/// set; everything else stays `None` and is omitted from JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Canonical failure string of the classified error, if the operation
    /// failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains_bogons: Option<bool>,
    /// Remote endpoint for connect/read/write/close events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_query: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_reply: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_network: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cipher_suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_negotiated_proto: Option<String>,
    /// DER-encoded peer certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_peer_certs: Option<Vec<Vec<u8>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request_headers: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_response_headers: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_body_snapshot: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_is_truncated: Option<bool>,
}

impl Event {
    pub fn new(kind: EventKind, time: Duration) -> Self {
        Self {
            kind,
            time,
            duration: None,
            failure: None,
            operation: None,
            transaction_id: None,
            hostname: None,
            addresses: None,
            contains_bogons: None,
            address: None,
            num_bytes: None,
            dns_query: None,
            dns_reply: None,
            transport_network: None,
            transport_address: None,
            tls_server_name: None,
            tls_version: None,
            tls_cipher_suite: None,
            tls_negotiated_proto: None,
            tls_peer_certs: None,
            http_method: None,
            http_url: None,
            http_status: None,
            http_request_headers: None,
            http_response_headers: None,
            http_body_snapshot: None,
            body_is_truncated: None,
        }
    }
}

/// Append-only, concurrency-safe sequence of events. One instance per
/// logical measurement, shared across every concurrent operation that
/// belongs to it. Writers hold the lock only for the append itself; nobody
/// performs I/O under the lock.
#[derive(Debug)]
pub struct TraceLog {
    begin: Instant,
    started_at: DateTime<Utc>,
    events: Mutex<Vec<Event>>,
    txn_counter: AtomicU64,
}

impl TraceLog {
    pub fn new() -> Self {
        Self {
            begin: Instant::now(),
            started_at: Utc::now(),
            events: Mutex::new(Vec::new()),
            txn_counter: AtomicU64::new(1),
        }
    }

    /// Allocates the next transaction identifier. The log owns the counter
    /// so every context sharing it gets globally distinct ids.
    pub fn next_transaction_id(&self) -> u64 {
        self.txn_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Wall-clock time at which this log (measurement) started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic offset since the log was created; the clock every event
    /// timestamp is taken from.
    pub fn elapsed(&self) -> Duration {
        self.begin.elapsed()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().expect("trace log poisoned").push(event);
    }

    /// Ordered snapshot of all events so far, without clearing. Safe to
    /// call repeatedly while the measurement progresses.
    pub fn read_all(&self) -> Vec<Event> {
        self.events.lock().expect("trace log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("trace log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A private per-operation log sharing this log's clock, so its event
    /// times stay comparable after [`TraceLog::append_all`] merges them
    /// back into the parent.
    pub fn scoped(&self) -> TraceLog {
        Self {
            begin: self.begin,
            started_at: self.started_at,
            events: Mutex::new(Vec::new()),
            txn_counter: AtomicU64::new(self.txn_counter.load(Ordering::Relaxed)),
        }
    }

    /// Removes and returns every event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().expect("trace log poisoned"))
    }

    /// Appends `events` in order, after anything already present.
    pub fn append_all(&self, events: Vec<Event>) {
        self.events
            .lock()
            .expect("trace log poisoned")
            .extend(events);
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}
