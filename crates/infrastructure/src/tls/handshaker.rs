//! The rustls-backed handshaker. Maps certificate failures onto the
//! TLS error kinds the classifier understands, before anything
//! platform-specific can leak upward.

use async_trait::async_trait;
use netsonde_application::{
    BoxConn, Connection, MeasureContext, TlsConn, TlsHandshakeParams, TlsHandshaker,
    TlsNegotiation,
};
use netsonde_domain::{NetError, TlsErrorKind};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{CertificateError, ClientConfig, RootCertStore};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Applied when the caller's context carries no deadline of its own.
const HANDSHAKE_CEILING: Duration = Duration::from_secs(10);

pub struct RustlsHandshaker {
    config: Arc<ClientConfig>,
}

impl RustlsHandshaker {
    /// Verifies against the Mozilla root program bundled with
    /// webpki-roots.
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
        }
    }

    /// Verifies against a caller-supplied PEM bundle instead of the
    /// built-in roots.
    pub fn with_ca_bundle(pem: &[u8]) -> Result<Self, NetError> {
        let mut roots = RootCertStore::empty();
        let mut reader = io::BufReader::new(pem);
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| NetError::Other(format!("bad ca bundle: {e}")))?;
            roots
                .add(cert)
                .map_err(|e| NetError::Other(format!("bad ca certificate: {e}")))?;
        }
        if roots.is_empty() {
            return Err(NetError::Other(
                "ca bundle contains no certificates".to_string(),
            ));
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Accepts any certificate. Only for measurements that explicitly
    /// opt out of verification.
    pub fn insecure_skip_verify() -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for RustlsHandshaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TlsHandshaker for RustlsHandshaker {
    async fn handshake(
        &self,
        cx: &MeasureContext,
        conn: BoxConn,
        params: &TlsHandshakeParams,
    ) -> Result<TlsConn, NetError> {
        let server_name = ServerName::try_from(params.server_name.clone())
            .map_err(|_| NetError::InvalidAddress(format!("bad sni: {}", params.server_name)))?;

        let mut config = (*self.config).clone();
        config.alpn_protocols = params.alpn.clone();
        let connector = TlsConnector::from(Arc::new(config));

        let bounded_cx = if cx.deadline().is_none() {
            cx.with_deadline_capped(HANDSHAKE_CEILING)
        } else {
            cx.clone()
        };

        // The connect future owns the plaintext connection; on failure
        // or cancellation dropping it closes the socket rather than
        // leaking it to the caller.
        let stream = bounded_cx
            .bounded(async {
                connector
                    .connect(server_name, conn)
                    .await
                    .map_err(map_handshake_error)
            })
            .await?;

        let negotiation = negotiation_of(&stream, &params.server_name);
        debug!(
            server_name = %params.server_name,
            version = negotiation.version.as_deref().unwrap_or("unknown"),
            "tls handshake complete"
        );
        Ok(TlsConn {
            conn: Box::new(RustlsConn(stream)),
            negotiation,
        })
    }
}

fn negotiation_of(stream: &TlsStream<BoxConn>, server_name: &str) -> TlsNegotiation {
    let (_, session) = stream.get_ref();
    TlsNegotiation {
        server_name: server_name.to_string(),
        version: session.protocol_version().map(|v| format!("{v:?}")),
        cipher_suite: session
            .negotiated_cipher_suite()
            .map(|s| format!("{:?}", s.suite())),
        negotiated_protocol: session
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned()),
        peer_certificates: session
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default(),
    }
}

/// Walks the handshake error's source chain looking for the rustls
/// certificate failure, so the classifier can tell an untrusted CA from
/// a name mismatch.
fn map_handshake_error(err: io::Error) -> NetError {
    let mut source: Option<&(dyn std::error::Error + 'static)> =
        err.get_ref().map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(current) = source {
        if let Some(tls_err) = current.downcast_ref::<rustls::Error>() {
            let kind = match tls_err {
                rustls::Error::InvalidCertificate(cert_err) => match cert_err {
                    CertificateError::NotValidForName => TlsErrorKind::InvalidHostname,
                    CertificateError::NotValidForNameContext { .. } => {
                        TlsErrorKind::InvalidHostname
                    }
                    CertificateError::UnknownIssuer => TlsErrorKind::UnknownAuthority,
                    _ => TlsErrorKind::InvalidCertificate,
                },
                _ => TlsErrorKind::Other,
            };
            return NetError::Tls {
                kind,
                message: tls_err.to_string(),
            };
        }
        source = current.source();
    }
    NetError::Io(err)
}

/// The skip-verification verifier behind the explicit insecure flag.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// A finished TLS session behind the [`Connection`] interface.
pub struct RustlsConn(pub TlsStream<BoxConn>);

impl AsyncRead for RustlsConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for RustlsConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl Connection for RustlsConn {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.get_ref().0.peer_addr()
    }
}
