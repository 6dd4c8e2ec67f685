use crate::ctx::MeasureContext;
use crate::ports::dialer::BoxConn;
use async_trait::async_trait;
use netsonde_domain::NetError;

/// What the client offers for a handshake.
#[derive(Debug, Clone)]
pub struct TlsHandshakeParams {
    /// SNI. Defaults to the dialed hostname when not overridden.
    pub server_name: String,
    /// ALPN offers, outermost preference first. Defaults to h2 then
    /// http/1.1 when unset.
    pub alpn: Vec<Vec<u8>>,
}

/// What the handshake actually negotiated, recorded in the trace.
#[derive(Debug, Clone, Default)]
pub struct TlsNegotiation {
    pub server_name: String,
    pub version: Option<String>,
    pub cipher_suite: Option<String>,
    pub negotiated_protocol: Option<String>,
    /// DER-encoded peer certificates.
    pub peer_certificates: Vec<Vec<u8>>,
}

/// An encrypted connection plus its handshake outcome.
#[derive(Debug)]
pub struct TlsConn {
    pub conn: BoxConn,
    pub negotiation: TlsNegotiation,
}

/// Performs the TLS handshake over an established plaintext connection.
/// On failure the implementation closes the plaintext connection rather
/// than leaking it back to the caller.
#[async_trait]
pub trait TlsHandshaker: Send + Sync {
    async fn handshake(
        &self,
        cx: &MeasureContext,
        conn: BoxConn,
        params: &TlsHandshakeParams,
    ) -> Result<TlsConn, NetError>;
}

/// Dials a plaintext connection and upgrades it to TLS.
#[async_trait]
pub trait TlsDialer: Send + Sync {
    async fn dial_tls(&self, cx: &MeasureContext, address: &str) -> Result<TlsConn, NetError>;
}
