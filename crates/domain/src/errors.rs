use crate::failure::ClassifiedError;
use std::io;
use std::net::IpAddr;
use thiserror::Error;

/// What a TLS certificate error means, extracted at the TLS boundary so the
/// classifier does not need to know about the TLS library's error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsErrorKind {
    InvalidHostname,
    UnknownAuthority,
    InvalidCertificate,
    Other,
}

/// The raw error produced by any layer of the measurement core before it is
/// classified. Display strings matter: the classifier falls back to ordered
/// message-suffix heuristics, so the phrasing below mirrors the platform
/// wording those heuristics expect.
#[derive(Debug, Error)]
pub enum NetError {
    /// An error that already went through the classifier.
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error("dns lookup returned bogon addresses")]
    DnsBogon { addresses: Vec<IpAddr> },

    #[error("operation was interrupted")]
    Interrupted,

    /// The caller-supplied deadline expired. Distinct from an OS-level
    /// timed-out I/O error: only the latter is ever retried.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("no such host")]
    DnsNxdomain,

    /// Negative DNS response other than NXDOMAIN.
    #[error("dns query failed")]
    DnsServerFailure,

    /// Syntactically valid reply with zero records of the requested type.
    #[error("no response returned")]
    DnsNoAnswer,

    #[error("cannot decode dns message: {0}")]
    DnsDecode(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{message}")]
    Tls {
        kind: TlsErrorKind,
        message: String,
    },

    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),

    #[error("idna conversion failed: {0}")]
    Idna(String),

    #[error("{0}")]
    Other(String),
}

impl NetError {
    /// True when this error is (or wraps) an operating-system-level timed
    /// out I/O error. This is the only condition under which the resolver
    /// retry loop takes another attempt; a context-deadline expiry is not
    /// an OS timeout.
    pub fn is_os_timeout(&self) -> bool {
        match self {
            NetError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            NetError::Classified(wrapper) => wrapper.inner().is_os_timeout(),
            _ => false,
        }
    }

    /// True when this error is (or wraps) a caller cancellation.
    pub fn is_interrupted(&self) -> bool {
        match self {
            NetError::Interrupted => true,
            NetError::Classified(wrapper) => wrapper.inner().is_interrupted(),
            _ => false,
        }
    }
}
