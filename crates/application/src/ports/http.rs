use crate::ctx::MeasureContext;
use async_trait::async_trait;
use bytes::Bytes;
use netsonde_domain::NetError;

/// Requests and responses carry fully buffered bodies. Measurements want
/// the whole body for snapshotting anyway, so streaming buys nothing
/// here.
pub type HttpRequest = http::Request<Bytes>;
pub type HttpResponse = http::Response<Bytes>;

/// Executes a single HTTP round trip over connections obtained from the
/// configured TLS dialer, reusing an open connection per host where the
/// protocol allows it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn round_trip(
        &self,
        cx: &MeasureContext,
        request: HttpRequest,
    ) -> Result<HttpResponse, NetError>;
}
