//! SOCKS5 CONNECT proxying (RFC 1928), no authentication. The
//! negotiation runs in a background task so cancellation can abandon
//! it immediately; a connection that completes after the caller gave
//! up is dropped, which closes it.

use async_trait::async_trait;
use netsonde_application::{BoxConn, Dialer, MeasureContext, Network};
use netsonde_domain::{parse_host_port, NetError};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

pub struct Socks5Dialer {
    inner: Arc<dyn Dialer + Send + Sync>,
    proxy_address: String,
}

impl Socks5Dialer {
    pub fn new(inner: Arc<dyn Dialer + Send + Sync>, proxy_address: String) -> Self {
        Self {
            inner,
            proxy_address,
        }
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError> {
        if network != Network::Tcp {
            return Err(NetError::Other(
                "socks5 proxying supports tcp only".to_string(),
            ));
        }
        let (host, port) = parse_host_port(address)
            .ok_or_else(|| NetError::InvalidAddress(format!("not host:port: {address}")))?;

        let inner = self.inner.clone();
        let proxy = self.proxy_address.clone();
        let host = host.to_string();
        let task_cx = cx.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            // Bounding the whole negotiation means cancellation also
            // tears down this task instead of leaving it blocked on a
            // half-finished handshake.
            let result = task_cx
                .bounded(async {
                    let mut conn = inner.dial(&task_cx, Network::Tcp, &proxy).await?;
                    negotiate(&mut conn, &host, port).await?;
                    debug!(proxy = %proxy, "socks5 tunnel established");
                    Ok(conn)
                })
                .await;
            // Send failing means the caller was cancelled; the late
            // connection is dropped here.
            let _ = tx.send(result);
        });

        cx.bounded(async {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(NetError::Other("socks5 dial task aborted".to_string())),
            }
        })
        .await
    }
}

async fn negotiate(conn: &mut BoxConn, host: &str, port: u16) -> Result<(), NetError> {
    conn.write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH]).await?;

    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await?;
    if method != [SOCKS_VERSION, METHOD_NO_AUTH] {
        return Err(NetError::Other(format!(
            "socks5 proxy selected unsupported method {:#04x}",
            method[1]
        )));
    }

    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            if host.len() > 255 {
                return Err(NetError::InvalidAddress(format!(
                    "hostname too long for socks5: {host}"
                )));
            }
            request.push(ATYP_DOMAIN);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    conn.write_all(&request).await?;

    let mut header = [0u8; 4];
    conn.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(NetError::Other("socks5 proxy sent bad version".to_string()));
    }
    if header[1] != 0x00 {
        return Err(NetError::Other(format!(
            "socks5 connect failed with reply code {:#04x}",
            header[1]
        )));
    }
    // Drain the bound address the proxy reports; it is not useful here.
    let bound_len = match header[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            conn.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => {
            return Err(NetError::Other(format!(
                "socks5 proxy sent unknown address type {other:#04x}"
            )));
        }
    };
    let mut bound = vec![0u8; bound_len + 2];
    conn.read_exact(&mut bound).await?;
    Ok(())
}
