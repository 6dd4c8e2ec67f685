//! Dial-then-handshake orchestration: SNI defaulting, ALPN defaulting,
//! handshake tracing and classification under `tls_handshake`.

use async_trait::async_trait;
use netsonde_application::{
    Dialer, MeasureContext, Network, TlsConn, TlsDialer, TlsHandshakeParams, TlsHandshaker,
};
use netsonde_domain::{classify, parse_host_port, Event, EventKind, NetError, Operation};
use std::sync::Arc;
use tracing::debug;

pub struct NetTlsDialer {
    dialer: Arc<dyn Dialer + Send + Sync>,
    handshaker: Arc<dyn TlsHandshaker + Send + Sync>,
    force_sni: Option<String>,
    alpn: Vec<Vec<u8>>,
}

impl NetTlsDialer {
    pub fn new(
        dialer: Arc<dyn Dialer + Send + Sync>,
        handshaker: Arc<dyn TlsHandshaker + Send + Sync>,
    ) -> Self {
        Self {
            dialer,
            handshaker,
            force_sni: None,
            alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
        }
    }

    /// Overrides the SNI for every handshake, regardless of the dialed
    /// hostname.
    pub fn with_force_sni(mut self, sni: String) -> Self {
        self.force_sni = Some(sni);
        self
    }

    pub fn with_alpn(mut self, alpn: Vec<Vec<u8>>) -> Self {
        self.alpn = alpn;
        self
    }
}

#[async_trait]
impl TlsDialer for NetTlsDialer {
    async fn dial_tls(&self, cx: &MeasureContext, address: &str) -> Result<TlsConn, NetError> {
        let (host, _port) = parse_host_port(address)
            .ok_or_else(|| NetError::InvalidAddress(format!("not host:port: {address}")))?;
        let server_name = self.force_sni.clone().unwrap_or_else(|| host.to_string());
        let params = TlsHandshakeParams {
            server_name: server_name.clone(),
            alpn: self.alpn.clone(),
        };

        let conn = self.dialer.dial(cx, Network::Tcp, address).await?;

        let started = cx.elapsed();
        let mut start_event = Event::new(EventKind::TlsHandshakeStart, started);
        start_event.transaction_id = Some(cx.transaction_id());
        start_event.address = Some(address.to_string());
        start_event.tls_server_name = Some(server_name.clone());
        cx.trace().push(start_event);

        let result = self.handshaker.handshake(cx, conn, &params).await;

        let now = cx.elapsed();
        let mut done_event = Event::new(EventKind::TlsHandshakeDone, now);
        done_event.transaction_id = Some(cx.transaction_id());
        done_event.duration = Some(now - started);
        done_event.operation = Some(Operation::TlsHandshake.as_str());
        done_event.address = Some(address.to_string());
        done_event.tls_server_name = Some(server_name);

        match result {
            Ok(tls) => {
                done_event.tls_version = tls.negotiation.version.clone();
                done_event.tls_cipher_suite = tls.negotiation.cipher_suite.clone();
                done_event.tls_negotiated_proto = tls.negotiation.negotiated_protocol.clone();
                done_event.tls_peer_certs = Some(tls.negotiation.peer_certificates.clone());
                cx.trace().push(done_event);
                debug!(address = %address, "tls dial complete");
                Ok(tls)
            }
            Err(err) => {
                let classified = classify(err, Operation::TlsHandshake);
                done_event.failure = Some(classified.failure_string());
                cx.trace().push(done_event);
                Err(classified.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsonde_application::{BoxConn, TlsNegotiation};
    use netsonde_domain::{Failure, TlsErrorKind, TraceLog};
    use std::sync::Mutex;

    fn test_context() -> MeasureContext {
        MeasureContext::new(Arc::new(TraceLog::new()))
    }

    struct NullDialer;

    #[async_trait]
    impl Dialer for NullDialer {
        async fn dial(
            &self,
            _cx: &MeasureContext,
            _network: Network,
            _address: &str,
        ) -> Result<BoxConn, NetError> {
            Ok(Box::new(tokio::io::duplex(64).0.into_conn()))
        }
    }

    /// Records the params it was handed and fails or succeeds on cue.
    struct ScriptedHandshaker {
        fail_with: Option<TlsErrorKind>,
        seen: Mutex<Vec<TlsHandshakeParams>>,
    }

    #[async_trait]
    impl TlsHandshaker for ScriptedHandshaker {
        async fn handshake(
            &self,
            _cx: &MeasureContext,
            conn: BoxConn,
            params: &TlsHandshakeParams,
        ) -> Result<TlsConn, NetError> {
            self.seen.lock().unwrap().push(params.clone());
            match self.fail_with {
                Some(kind) => Err(NetError::Tls {
                    kind,
                    message: "handshake failed".to_string(),
                }),
                None => Ok(TlsConn {
                    conn,
                    negotiation: TlsNegotiation {
                        server_name: params.server_name.clone(),
                        version: Some("TLSv1_3".to_string()),
                        cipher_suite: Some("TLS13_AES_128_GCM_SHA256".to_string()),
                        negotiated_protocol: Some("h2".to_string()),
                        peer_certificates: vec![vec![0x30, 0x82]],
                    },
                }),
            }
        }
    }

    trait IntoConn {
        fn into_conn(self) -> DuplexConn;
    }

    impl IntoConn for tokio::io::DuplexStream {
        fn into_conn(self) -> DuplexConn {
            DuplexConn(self)
        }
    }

    struct DuplexConn(tokio::io::DuplexStream);

    impl tokio::io::AsyncRead for DuplexConn {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl tokio::io::AsyncWrite for DuplexConn {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.0).poll_shutdown(cx)
        }
    }

    impl netsonde_application::Connection for DuplexConn {
        fn peer_addr(&self) -> Option<std::net::SocketAddr> {
            None
        }
    }

    #[tokio::test]
    async fn test_sni_defaults_to_dialed_host() {
        let handshaker = Arc::new(ScriptedHandshaker {
            fail_with: None,
            seen: Mutex::new(Vec::new()),
        });
        let dialer = NetTlsDialer::new(Arc::new(NullDialer), handshaker.clone());
        let cx = test_context();
        dialer.dial_tls(&cx, "example.com:443").await.unwrap();
        assert_eq!(handshaker.seen.lock().unwrap()[0].server_name, "example.com");
    }

    #[tokio::test]
    async fn test_forced_sni_wins() {
        let handshaker = Arc::new(ScriptedHandshaker {
            fail_with: None,
            seen: Mutex::new(Vec::new()),
        });
        let dialer = NetTlsDialer::new(Arc::new(NullDialer), handshaker.clone())
            .with_force_sni("decoy.example.org".to_string());
        let cx = test_context();
        dialer.dial_tls(&cx, "example.com:443").await.unwrap();
        assert_eq!(
            handshaker.seen.lock().unwrap()[0].server_name,
            "decoy.example.org"
        );
    }

    #[tokio::test]
    async fn test_handshake_events_carry_negotiation() {
        let handshaker = Arc::new(ScriptedHandshaker {
            fail_with: None,
            seen: Mutex::new(Vec::new()),
        });
        let dialer = NetTlsDialer::new(Arc::new(NullDialer), handshaker);
        let cx = test_context();
        dialer.dial_tls(&cx, "example.com:443").await.unwrap();
        let events = cx.trace().read_all();
        assert_eq!(events[0].kind, EventKind::TlsHandshakeStart);
        assert_eq!(events[1].kind, EventKind::TlsHandshakeDone);
        assert_eq!(events[1].tls_version.as_deref(), Some("TLSv1_3"));
        assert_eq!(events[1].tls_negotiated_proto.as_deref(), Some("h2"));
        assert!(events[1].tls_peer_certs.is_some());
    }

    #[tokio::test]
    async fn test_failure_classified_as_tls_handshake() {
        let handshaker = Arc::new(ScriptedHandshaker {
            fail_with: Some(TlsErrorKind::UnknownAuthority),
            seen: Mutex::new(Vec::new()),
        });
        let dialer = NetTlsDialer::new(Arc::new(NullDialer), handshaker);
        let cx = test_context();
        let err = dialer.dial_tls(&cx, "example.com:443").await.unwrap_err();
        match err {
            NetError::Classified(classified) => {
                assert_eq!(classified.failure, Failure::SslUnknownAuthority);
                assert_eq!(classified.operation, Operation::TlsHandshake);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let events = cx.trace().read_all();
        assert_eq!(
            events[1].failure.as_deref(),
            Some("ssl_unknown_authority")
        );
    }
}
