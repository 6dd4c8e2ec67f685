use netsonde_domain::{classify, ClassifyExt, Failure, NetError, Operation, TlsErrorKind};
use std::io;

#[test]
fn test_major_operation_survives_rewrapping() {
    let majors = [
        Operation::Resolve,
        Operation::Connect,
        Operation::TlsHandshake,
        Operation::HttpRoundTrip,
    ];
    let minors_and_majors = [
        Operation::Read,
        Operation::Write,
        Operation::Close,
        Operation::Connect,
        Operation::HttpRoundTrip,
    ];
    for inner_op in majors {
        for outer_op in minors_and_majors {
            let first = classify(NetError::Io(io::ErrorKind::ConnectionRefused.into()), inner_op);
            let second = classify(NetError::Classified(first), outer_op);
            assert_eq!(second.operation, inner_op, "outer {:?} must not win", outer_op);
            assert_eq!(second.failure, Failure::ConnectionRefused);
        }
    }
}

#[test]
fn test_minor_operation_is_overridden() {
    let first = classify(NetError::Io(io::ErrorKind::UnexpectedEof.into()), Operation::Read);
    let second = classify(NetError::Classified(first), Operation::Resolve);
    assert_eq!(second.operation, Operation::Resolve);
    assert_eq!(second.failure, Failure::Eof);
}

#[test]
fn test_sentinels() {
    let got = classify(
        NetError::DnsBogon {
            addresses: vec!["127.0.0.1".parse().unwrap()],
        },
        Operation::Resolve,
    );
    assert_eq!(got.failure, Failure::DnsBogon);
    assert_eq!(got.failure_string(), "dns_bogon_error");

    let got = classify(NetError::Interrupted, Operation::Connect);
    assert_eq!(got.failure, Failure::Interrupted);
}

#[test]
fn test_tls_certificate_kinds() {
    let cases = [
        (TlsErrorKind::InvalidHostname, Failure::SslInvalidHostname),
        (TlsErrorKind::UnknownAuthority, Failure::SslUnknownAuthority),
        (TlsErrorKind::InvalidCertificate, Failure::SslInvalidCertificate),
    ];
    for (kind, want) in cases {
        let got = classify(
            NetError::Tls {
                kind,
                message: "certificate verify failed".into(),
            },
            Operation::TlsHandshake,
        );
        assert_eq!(got.failure, want);
        assert_eq!(got.operation, Operation::TlsHandshake);
    }
}

#[test]
fn test_deadline_is_generic_timeout_but_not_os_timeout() {
    let err = NetError::DeadlineExceeded;
    assert!(!err.is_os_timeout());
    let got = classify(err, Operation::Resolve);
    assert_eq!(got.failure, Failure::GenericTimeout);

    let os = NetError::Io(io::ErrorKind::TimedOut.into());
    assert!(os.is_os_timeout());
}

#[test]
fn test_os_timeout_survives_classification() {
    let wrapped = NetError::Classified(classify(
        NetError::Io(io::ErrorKind::TimedOut.into()),
        Operation::Connect,
    ));
    assert!(wrapped.is_os_timeout());
}

#[test]
fn test_unknown_fallback_scrubs_example_from_the_field() {
    let got = classify(
        NetError::Other(
            "read tcp 10.0.2.15:56948->93.184.216.34:443: use of closed network connection".into(),
        ),
        Operation::Read,
    );
    assert_eq!(
        got.failure_string(),
        "unknown_failure: read tcp [scrubbed]->[scrubbed]: use of closed network connection"
    );
}

#[test]
fn test_nxdomain_suffix() {
    let got = classify(
        NetError::Other("lookup example.nonexistent: no such host".into()),
        Operation::Resolve,
    );
    assert_eq!(got.failure, Failure::DnsNxdomain);
}

#[test]
fn test_classify_ext_never_fabricates() {
    let ok: Result<&str, NetError> = Ok("fine");
    assert!(ok.classify_err(Operation::Connect).is_ok());

    let err: Result<&str, NetError> = Err(NetError::Interrupted);
    let got = err.classify_err(Operation::Connect).unwrap_err();
    assert!(matches!(got, NetError::Classified(_)));
}
