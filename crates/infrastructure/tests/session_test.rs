//! End-to-end chain tests: a session talking to in-process fixtures.

use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use netsonde_domain::{EventKind, Failure, NetError};
use netsonde_infrastructure::{Config, Session};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// Answers A queries with `answer` and AAAA queries with an empty
/// NoError response, like a zone with no IPv6 records.
async fn spawn_dns_server(answer: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let query = match Message::from_vec(&buf[..n]) {
                Ok(message) => message,
                Err(_) => continue,
            };
            let mut response = Message::new();
            response.set_id(query.id());
            response.set_message_type(MessageType::Response);
            response.set_response_code(ResponseCode::NoError);
            for q in query.queries() {
                response.add_query(q.clone());
                if q.query_type() == RecordType::A {
                    response.add_answer(Record::from_rdata(
                        q.name().clone(),
                        300,
                        RData::A(A(answer)),
                    ));
                }
            }
            let bytes = response.to_vec().unwrap();
            let _ = socket.send_to(&bytes, from).await;
        }
    });
    addr
}

fn session_with_dns(dns_addr: SocketAddr, bogon_is_error: bool) -> Session {
    Session::new(Config {
        resolver: format!("udp://{dns_addr}").parse().unwrap(),
        bogon_is_error,
        count_bytes: true,
        ..Config::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_udp_resolution_through_full_chain() {
    let dns_addr = spawn_dns_server(Ipv4Addr::new(93, 184, 216, 34)).await;
    let session = session_with_dns(dns_addr, true);
    let cx = session.context();

    let addresses = session
        .resolver()
        .lookup_host(&cx, "example.com")
        .await
        .unwrap();
    assert_eq!(addresses, vec!["93.184.216.34".parse::<std::net::IpAddr>().unwrap()]);

    let events = session.read_trace();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds[0], EventKind::ResolveStart);
    assert!(kinds.contains(&EventKind::DnsQuery));
    assert!(kinds.contains(&EventKind::DnsReply));
    assert_eq!(*kinds.last().unwrap(), EventKind::ResolveDone);

    let done = events.last().unwrap();
    assert_eq!(done.contains_bogons, Some(false));
    assert!(done.failure.is_none());

    // The DNS sockets went through the instrumented dialer.
    let stats = session.stats();
    assert!(stats.bytes_sent > 0);
    assert!(stats.bytes_received > 0);

    // The whole trace serializes; unset fields are omitted.
    let json = serde_json::to_string(&events).unwrap();
    assert!(json.contains("\"kind\":\"resolve_start\""));
    assert!(!json.contains("\"http_status\""));
}

#[tokio::test]
async fn test_bogon_reply_is_an_error_when_configured() {
    let dns_addr = spawn_dns_server(Ipv4Addr::LOCALHOST).await;
    let session = session_with_dns(dns_addr, true);
    let cx = session.context();

    let err = session
        .resolver()
        .lookup_host(&cx, "injected.example.com")
        .await
        .unwrap_err();
    match err {
        NetError::Classified(classified) => {
            assert_eq!(classified.failure, Failure::DnsBogon);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.stats().bogons_observed, 1);

    let done = session.read_trace().into_iter().last().unwrap();
    assert_eq!(done.kind, EventKind::ResolveDone);
    assert_eq!(done.failure.as_deref(), Some("dns_bogon_error"));
    assert_eq!(done.contains_bogons, Some(true));
}

#[tokio::test]
async fn test_bogon_reply_passes_as_warning_when_not() {
    let dns_addr = spawn_dns_server(Ipv4Addr::LOCALHOST).await;
    let session = session_with_dns(dns_addr, false);
    let cx = session.context();

    let addresses = session
        .resolver()
        .lookup_host(&cx, "internal.example.com")
        .await
        .unwrap();
    assert_eq!(addresses, vec!["127.0.0.1".parse::<std::net::IpAddr>().unwrap()]);

    let done = session.read_trace().into_iter().last().unwrap();
    assert_eq!(done.contains_bogons, Some(true));
    assert!(done.failure.is_none());
}

#[tokio::test]
async fn test_http_round_trip_against_local_server() {
    // Serve one plain-HTTP response; the hostname resolves through the
    // seeded cache to the loopback listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let mut seen = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            seen.extend_from_slice(&buf[..n]);
            if seen.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
                break;
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 8\r\n\r\nmeasured")
            .await
            .unwrap();
    });

    let session = Session::new(Config {
        dns_cache_seed: vec![("service.example.com".to_string(), vec![addr.ip()])],
        dns_cache_read_only: true,
        count_bytes: true,
        ..Config::default()
    })
    .unwrap();
    let cx = session.context();

    let request = http::Request::builder()
        .uri(format!("http://service.example.com:{}/probe", addr.port()))
        .body(Bytes::new())
        .unwrap();
    let response = session.round_trip(&cx, request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body().as_ref(), b"measured");

    let events = session.read_trace();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::HttpRoundTripStart));
    assert!(kinds.contains(&EventKind::ResolveStart));
    assert!(kinds.contains(&EventKind::Connect));
    assert!(kinds.contains(&EventKind::HttpRoundTripDone));

    // Start events precede their done events within each operation.
    let start_at = kinds
        .iter()
        .position(|k| *k == EventKind::HttpRoundTripStart)
        .unwrap();
    let done_at = kinds
        .iter()
        .position(|k| *k == EventKind::HttpRoundTripDone)
        .unwrap();
    assert!(start_at < done_at);
    assert!(events[done_at].time >= events[start_at].time);
    assert!(session.stats().bytes_received >= 8);
}

#[tokio::test]
async fn test_cancelled_lookup_reports_interrupted() {
    // A DNS server that never answers.
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dns_addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            if socket.recv_from(&mut buf).await.is_err() {
                return;
            }
        }
    });

    let session = session_with_dns(dns_addr, false);
    let cx = session.context();
    let cancel = cx.cancel_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = session
        .resolver()
        .lookup_host(&cx, "example.com")
        .await
        .unwrap_err();
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    match err {
        NetError::Classified(classified) => {
            assert_eq!(classified.failure, Failure::Interrupted);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
