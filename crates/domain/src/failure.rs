use crate::errors::NetError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The operation a component was attempting when it failed.
///
/// The four major operations are the ones worth reporting to the caller:
/// when a classified error passes through an outer layer, the innermost
/// major operation wins and is never overwritten by an enclosing minor
/// operation (read/write/close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    Connect,
    TlsHandshake,
    HttpRoundTrip,
    Read,
    Write,
    Close,
}

impl Operation {
    pub fn is_major(self) -> bool {
        matches!(
            self,
            Operation::Resolve
                | Operation::Connect
                | Operation::TlsHandshake
                | Operation::HttpRoundTrip
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Connect => "connect",
            Operation::TlsHandshake => "tls_handshake",
            Operation::HttpRoundTrip => "http_round_trip",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of failure kinds. Downstream reporting code matches on
/// these strings, never on platform error messages.
///
/// `Unknown` carries an already-scrubbed message: it is only ever built by
/// the classifier after IP literals have been replaced with `[scrubbed]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    DnsBogon,
    DnsNxdomain,
    DnsServerFailure,
    Interrupted,
    Eof,
    ConnectionRefused,
    ConnectionReset,
    GenericTimeout,
    SslInvalidHostname,
    SslUnknownAuthority,
    SslInvalidCertificate,
    Unknown(String),
}

// Display carries the canonical failure string because it is what ends up
// in the archived measurement.
impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::DnsBogon => f.write_str("dns_bogon_error"),
            Failure::DnsNxdomain => f.write_str("dns_nxdomain_error"),
            Failure::DnsServerFailure => f.write_str("dns_server_failure"),
            Failure::Interrupted => f.write_str("interrupted"),
            Failure::Eof => f.write_str("eof_error"),
            Failure::ConnectionRefused => f.write_str("connection_refused"),
            Failure::ConnectionReset => f.write_str("connection_reset"),
            Failure::GenericTimeout => f.write_str("generic_timeout_error"),
            Failure::SslInvalidHostname => f.write_str("ssl_invalid_hostname"),
            Failure::SslUnknownAuthority => f.write_str("ssl_unknown_authority"),
            Failure::SslInvalidCertificate => f.write_str("ssl_invalid_certificate"),
            Failure::Unknown(message) => write!(f, "unknown_failure: {}", message),
        }
    }
}

/// A raw error wrapped with its failure kind and the operation that was
/// being attempted. This is the only error type that crosses the top of
/// the resolver/dialer/transport chain.
#[derive(Debug, Clone, Error)]
#[error("{failure}")]
pub struct ClassifiedError {
    pub failure: Failure,
    pub operation: Operation,
    #[source]
    source: Arc<NetError>,
}

impl ClassifiedError {
    pub fn new(failure: Failure, operation: Operation, source: NetError) -> Self {
        Self {
            failure,
            operation,
            source: Arc::new(source),
        }
    }

    pub(crate) fn with_operation(self, operation: Operation) -> Self {
        Self { operation, ..self }
    }

    /// The underlying error, for unwrapping.
    pub fn inner(&self) -> &NetError {
        &self.source
    }

    /// The canonical failure string, e.g. `connection_refused` or
    /// `unknown_failure: <scrubbed message>`.
    pub fn failure_string(&self) -> String {
        self.failure.to_string()
    }
}
