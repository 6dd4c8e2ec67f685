//! Read-through DNS cache decorator. Only successful lookups are ever
//! stored; failures always fall through to the inner resolver on the
//! next call.

use async_trait::async_trait;
use dashmap::DashMap;
use netsonde_application::{MeasureContext, Resolver};
use netsonde_domain::NetError;
use rustc_hash::FxBuildHasher;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

pub struct CacheResolver {
    inner: Arc<dyn Resolver + Send + Sync>,
    entries: DashMap<String, Vec<IpAddr>, FxBuildHasher>,
    /// Pre-seeded caches can be frozen so measurements never mutate
    /// them.
    read_only: bool,
}

impl CacheResolver {
    pub fn new(inner: Arc<dyn Resolver + Send + Sync>) -> Self {
        Self {
            inner,
            entries: DashMap::with_hasher(FxBuildHasher),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn seed(&self, hostname: impl Into<String>, addresses: Vec<IpAddr>) {
        self.entries.insert(hostname.into(), addresses);
    }
}

#[async_trait]
impl Resolver for CacheResolver {
    async fn lookup_host(
        &self,
        cx: &MeasureContext,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, NetError> {
        if let Some(cached) = self.entries.get(hostname) {
            debug!(hostname, "dns cache hit");
            return Ok(cached.clone());
        }
        let addresses = self.inner.lookup_host(cx, hostname).await?;
        if !self.read_only {
            self.entries.insert(hostname.to_string(), addresses.clone());
        }
        Ok(addresses)
    }
}
