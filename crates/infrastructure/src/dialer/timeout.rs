//! Caps every connect attempt at a fixed ceiling regardless of the
//! caller's own deadline.

use async_trait::async_trait;
use netsonde_application::{BoxConn, Dialer, MeasureContext, Network};
use netsonde_domain::NetError;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONNECT_CEILING: Duration = Duration::from_secs(30);

pub struct TimeoutDialer {
    inner: Arc<dyn Dialer + Send + Sync>,
    ceiling: Duration,
}

impl TimeoutDialer {
    pub fn new(inner: Arc<dyn Dialer + Send + Sync>) -> Self {
        Self::with_ceiling(inner, DEFAULT_CONNECT_CEILING)
    }

    pub fn with_ceiling(inner: Arc<dyn Dialer + Send + Sync>, ceiling: Duration) -> Self {
        Self { inner, ceiling }
    }
}

#[async_trait]
impl Dialer for TimeoutDialer {
    async fn dial(
        &self,
        cx: &MeasureContext,
        network: Network,
        address: &str,
    ) -> Result<BoxConn, NetError> {
        let capped = cx.with_deadline_capped(self.ceiling);
        self.inner.dial(&capped, network, address).await
    }
}
