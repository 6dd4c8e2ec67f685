//! The bottom of the dialer chain: plain TCP connects and connected
//! UDP sockets. Expects a literal `ip:port`; hostname resolution is the
//! resolving decorator's job.

use async_trait::async_trait;
use netsonde_application::{BoxConn, Connection, Dialer, MeasureContext, Network};
use netsonde_domain::NetError;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

pub struct SystemDialer;

impl SystemDialer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for SystemDialer {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError> {
        let remote: SocketAddr = address
            .parse()
            .map_err(|_| NetError::InvalidAddress(format!("not an ip:port literal: {address}")))?;

        cx.bounded(async move {
            match network {
                Network::Tcp => {
                    let stream = TcpStream::connect(remote).await?;
                    stream.set_nodelay(true)?;
                    debug!(remote = %remote, "tcp connection established");
                    Ok(Box::new(TcpConn(stream)) as BoxConn)
                }
                Network::Udp => {
                    let bind_addr: SocketAddr = if remote.is_ipv4() {
                        SocketAddr::from(([0, 0, 0, 0], 0))
                    } else {
                        SocketAddr::from(([0u16; 8], 0))
                    };
                    let socket = UdpSocket::bind(bind_addr).await?;
                    socket.connect(remote).await?;
                    debug!(remote = %remote, "udp socket connected");
                    Ok(Box::new(UdpConn(socket)) as BoxConn)
                }
            }
        })
        .await
    }
}

pub struct TcpConn(pub TcpStream);

impl AsyncRead for TcpConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl Connection for TcpConn {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.peer_addr().ok()
    }
}

/// A connected datagram socket behind the stream-shaped [`Connection`]
/// interface, so the DNS transports and the instrumentation wrappers
/// treat UDP like any other connection.
pub struct UdpConn(pub UdpSocket);

impl AsyncRead for UdpConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.0.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Connection for UdpConn {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.peer_addr().ok()
    }
}
