//! The failure classifier.
//!
//! Converts a raw [`NetError`] plus the attempted [`Operation`] into a
//! [`ClassifiedError`] whose failure kind belongs to the closed taxonomy.
//! Resolution order, first match wins:
//!
//! 1. already classified → keep it (keep the innermost major operation);
//! 2. domain sentinels (bogon, cancellation);
//! 3. TLS certificate error kinds;
//! 4. I/O error kinds, then ordered message-suffix heuristics;
//! 5. fallback `unknown_failure` with the message scrubbed of IP literals.

use crate::errors::{NetError, TlsErrorKind};
use crate::failure::{ClassifiedError, Failure, Operation};
use crate::scrub::scrub;
use std::io;

/// Classifies `error` as a failure observed while attempting `operation`.
///
/// When `error` is already classified and carries a major operation, it is
/// returned unchanged, so an outer layer can never overwrite the innermost
/// major operation with its own.
pub fn classify(error: NetError, operation: Operation) -> ClassifiedError {
    if let NetError::Classified(wrapper) = error {
        if wrapper.operation.is_major() {
            return wrapper;
        }
        return wrapper.with_operation(operation);
    }
    let failure = failure_for(&error);
    ClassifiedError::new(failure, operation, error)
}

fn failure_for(error: &NetError) -> Failure {
    match error {
        NetError::DnsBogon { .. } => Failure::DnsBogon,
        NetError::Interrupted => Failure::Interrupted,
        NetError::DeadlineExceeded => Failure::GenericTimeout,
        NetError::DnsNxdomain => Failure::DnsNxdomain,
        NetError::DnsServerFailure => Failure::DnsServerFailure,
        NetError::Tls { kind, message } => match kind {
            TlsErrorKind::InvalidHostname => Failure::SslInvalidHostname,
            TlsErrorKind::UnknownAuthority => Failure::SslUnknownAuthority,
            TlsErrorKind::InvalidCertificate => Failure::SslInvalidCertificate,
            TlsErrorKind::Other => from_message(message),
        },
        NetError::Io(e) => from_io(e),
        _ => from_message(&error.to_string()),
    }
}

fn from_io(error: &io::Error) -> Failure {
    match error.kind() {
        io::ErrorKind::UnexpectedEof => Failure::Eof,
        io::ErrorKind::ConnectionRefused => Failure::ConnectionRefused,
        io::ErrorKind::ConnectionReset => Failure::ConnectionReset,
        io::ErrorKind::TimedOut => Failure::GenericTimeout,
        _ => from_message(&error.to_string()),
    }
}

/// Ordered, case-sensitive suffix heuristics on the platform message. The
/// order matches the stable behavior existing reports depend on.
fn from_message(message: &str) -> Failure {
    if message.ends_with("EOF") {
        return Failure::Eof;
    }
    if message.ends_with("connection refused") {
        return Failure::ConnectionRefused;
    }
    if message.ends_with("connection reset by peer") {
        return Failure::ConnectionReset;
    }
    if message.ends_with("context deadline exceeded")
        || message.ends_with("transaction is timed out")
        || message.ends_with("i/o timeout")
        || message.ends_with("TLS handshake timeout")
    {
        return Failure::GenericTimeout;
    }
    if message.ends_with("no such host") {
        return Failure::DnsNxdomain;
    }
    Failure::Unknown(scrub(message))
}

/// Safe-builder helpers: classifying "no error" never fabricates one.
pub trait ClassifyExt<T> {
    /// Classifies the error, if any, tagging it with `operation`.
    fn classify_err(self, operation: Operation) -> Result<T, NetError>;
}

impl<T> ClassifyExt<T> for Result<T, NetError> {
    fn classify_err(self, operation: Operation) -> Result<T, NetError> {
        self.map_err(|e| NetError::Classified(classify(e, operation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_canonical_failures() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, Failure::ConnectionRefused),
            (io::ErrorKind::ConnectionReset, Failure::ConnectionReset),
            (io::ErrorKind::UnexpectedEof, Failure::Eof),
            (io::ErrorKind::TimedOut, Failure::GenericTimeout),
        ];
        for (kind, want) in cases {
            let got = classify(NetError::Io(kind.into()), Operation::Connect);
            assert_eq!(got.failure, want);
            assert_eq!(got.operation, Operation::Connect);
        }
    }

    #[test]
    fn suffix_heuristics_apply_in_order() {
        let got = classify(
            NetError::Other("read: connection reset by peer".into()),
            Operation::Read,
        );
        assert_eq!(got.failure, Failure::ConnectionReset);
        let got = classify(NetError::Other("dial: i/o timeout".into()), Operation::Connect);
        assert_eq!(got.failure, Failure::GenericTimeout);
    }

    #[test]
    fn fallback_scrubs_addresses() {
        let got = classify(
            NetError::Other("unexpected FIN from 93.184.216.34:443".into()),
            Operation::Read,
        );
        assert_eq!(
            got.failure_string(),
            "unknown_failure: unexpected FIN from [scrubbed]"
        );
    }

    #[test]
    fn ok_results_pass_through_untouched() {
        let r: Result<u8, NetError> = Ok(7);
        assert_eq!(r.classify_err(Operation::Resolve).unwrap(), 7);
    }
}
