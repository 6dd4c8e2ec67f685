//! Session assembly: turns a [`Config`] into the composed
//! resolver/dialer/TLS/HTTP chain, owned explicitly by the caller for
//! the lifetime of a measurement session.

use crate::dialer::trace::ByteCounters;
use crate::dialer::{ResolveDialer, Socks5Dialer, SystemDialer, TimeoutDialer, TraceDialer};
use crate::dns::transport::{
    HttpsDnsTransport, TcpDnsTransport, TlsDnsTransport, UdpDnsTransport,
};
use crate::dns::{CacheResolver, IdnaResolver, SerialResolver, SystemResolver, TraceResolver};
use crate::http::NetHttpTransport;
use crate::tls::{NetTlsDialer, RustlsHandshaker};
use netsonde_application::{
    Dialer, HttpRequest, HttpResponse, HttpTransport, MeasureContext, Resolver, TlsDialer,
};
use netsonde_domain::{Event, NetError, ResolverEndpoint, TraceLog};
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// The recognized configuration surface.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the base resolver sends its queries.
    pub resolver: ResolverEndpoint,
    /// `socks5://HOST:PORT`; all outbound TCP connects tunnel through
    /// it when set.
    pub proxy_url: Option<String>,
    /// PEM bundle replacing the built-in roots.
    pub ca_bundle: Option<Vec<u8>>,
    /// SNI override for every TLS handshake.
    pub force_sni: Option<String>,
    pub insecure_skip_verify: bool,
    /// Whether a bogon in a DNS reply fails the lookup or merely tags
    /// the trace.
    pub bogon_is_error: bool,
    /// Pre-seeded DNS answers, `(hostname, addresses)`.
    pub dns_cache_seed: Vec<(String, Vec<IpAddr>)>,
    /// Freeze the cache to its seed; lookups never populate it.
    pub dns_cache_read_only: bool,
    pub enable_dns_cache: bool,
    pub count_bytes: bool,
    /// Cap on request/response body bytes captured in the trace.
    pub snapshot_size: usize,
    /// `None` uses the built-in default; `Some("")` suppresses the
    /// User-Agent header entirely.
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver: ResolverEndpoint::System,
            proxy_url: None,
            ca_bundle: None,
            force_sni: None,
            insecure_skip_verify: false,
            bogon_is_error: false,
            dns_cache_seed: Vec::new(),
            dns_cache_read_only: false,
            enable_dns_cache: false,
            count_bytes: false,
            snapshot_size: crate::http::transport::DEFAULT_SNAPSHOT_SIZE,
            user_agent: None,
        }
    }
}

/// Counters worth surfacing alongside the trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub dns_timeouts: u64,
    pub bogons_observed: u64,
}

/// One measurement session: a shared trace log plus the fully composed
/// chain behind the four capability interfaces. Dropping the session
/// closes any idle pooled connections.
pub struct Session {
    trace: Arc<TraceLog>,
    resolver: Arc<TraceResolver>,
    bootstrap_resolver: Arc<TraceResolver>,
    dialer: Arc<dyn Dialer + Send + Sync>,
    tls_dialer: Arc<dyn TlsDialer + Send + Sync>,
    http: Arc<NetHttpTransport>,
    counters: Arc<ByteCounters>,
    serial: Option<Arc<SerialResolver>>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self, NetError> {
        let trace = Arc::new(TraceLog::new());
        let counters = Arc::new(ByteCounters::default());

        let handshaker = Arc::new(if config.insecure_skip_verify {
            RustlsHandshaker::insecure_skip_verify()
        } else if let Some(pem) = &config.ca_bundle {
            RustlsHandshaker::with_ca_bundle(pem)?
        } else {
            RustlsHandshaker::new()
        });

        // Every real connect goes through this instrumented base.
        let mut traced_base = TraceDialer::new(Arc::new(SystemDialer::new()));
        if config.count_bytes {
            traced_base = traced_base.with_byte_counters(counters.clone());
        }
        let traced_base: Arc<dyn Dialer + Send + Sync> = Arc::new(traced_base);

        // Bootstrap stack: resolves DoT hostnames, DoH URLs and the
        // proxy address through the system resolver, so the configured
        // resolver never depends on itself.
        let bootstrap_resolver = Arc::new(TraceResolver::new(
            Arc::new(IdnaResolver::new(Arc::new(SystemResolver::new()))),
            config.bogon_is_error,
        ));
        let bootstrap_dialer: Arc<dyn Dialer + Send + Sync> = Arc::new(TimeoutDialer::new(
            Arc::new(ResolveDialer::new(
                traced_base.clone(),
                bootstrap_resolver.clone(),
            )),
        ));
        let bootstrap_tls: Arc<dyn TlsDialer + Send + Sync> = Arc::new(
            NetTlsDialer::new(bootstrap_dialer.clone(), handshaker.clone()),
        );

        let mut serial = None;
        let engine: Arc<dyn Resolver + Send + Sync> = match &config.resolver {
            ResolverEndpoint::System => {
                Arc::new(IdnaResolver::new(Arc::new(SystemResolver::new())))
            }
            ResolverEndpoint::Udp { addr } => {
                let transport = Arc::new(UdpDnsTransport::new(bootstrap_dialer.clone(), *addr));
                let resolver = Arc::new(SerialResolver::new(transport));
                serial = Some(resolver.clone());
                Arc::new(IdnaResolver::new(resolver))
            }
            ResolverEndpoint::Tcp { addr } => {
                let transport = Arc::new(TcpDnsTransport::new(bootstrap_dialer.clone(), *addr));
                let resolver = Arc::new(SerialResolver::new(transport));
                serial = Some(resolver.clone());
                Arc::new(IdnaResolver::new(resolver))
            }
            ResolverEndpoint::Tls {
                address,
                server_name,
            } => {
                let dot_dialer = Arc::new(
                    NetTlsDialer::new(bootstrap_dialer.clone(), handshaker.clone())
                        .with_force_sni(server_name.clone()),
                );
                let transport = Arc::new(TlsDnsTransport::new(dot_dialer, address.clone()));
                let resolver = Arc::new(SerialResolver::new(transport));
                serial = Some(resolver.clone());
                Arc::new(IdnaResolver::new(resolver))
            }
            ResolverEndpoint::Https { url } => {
                let doh_http = Arc::new(
                    NetHttpTransport::new(bootstrap_dialer.clone(), bootstrap_tls.clone())
                        .with_snapshot_size(config.snapshot_size),
                );
                let transport = Arc::new(HttpsDnsTransport::new(doh_http, url.clone()));
                let resolver = Arc::new(SerialResolver::new(transport));
                serial = Some(resolver.clone());
                Arc::new(IdnaResolver::new(resolver))
            }
        };

        let cached: Arc<dyn Resolver + Send + Sync> =
            if config.enable_dns_cache || !config.dns_cache_seed.is_empty() {
                let mut cache = CacheResolver::new(engine);
                if config.dns_cache_read_only {
                    cache = cache.read_only();
                }
                for (hostname, addresses) in &config.dns_cache_seed {
                    cache.seed(hostname.clone(), addresses.clone());
                }
                Arc::new(cache)
            } else {
                engine
            };
        let resolver = Arc::new(TraceResolver::new(cached, config.bogon_is_error));

        let resolving_dialer: Arc<dyn Dialer + Send + Sync> = Arc::new(TimeoutDialer::new(
            Arc::new(ResolveDialer::new(traced_base, resolver.clone())),
        ));
        let dialer: Arc<dyn Dialer + Send + Sync> = match &config.proxy_url {
            Some(proxy_url) => {
                let proxy_address = parse_socks5_url(proxy_url)?;
                debug!(proxy = %proxy_address, "tunneling tcp connects through socks5");
                Arc::new(Socks5Dialer::new(resolving_dialer, proxy_address))
            }
            None => resolving_dialer,
        };

        let mut tls_dialer = NetTlsDialer::new(dialer.clone(), handshaker);
        if let Some(sni) = &config.force_sni {
            tls_dialer = tls_dialer.with_force_sni(sni.clone());
        }
        let tls_dialer: Arc<dyn TlsDialer + Send + Sync> = Arc::new(tls_dialer);

        let mut http = NetHttpTransport::new(dialer.clone(), tls_dialer.clone())
            .with_snapshot_size(config.snapshot_size);
        if let Some(user_agent) = &config.user_agent {
            http = http.with_user_agent(user_agent.clone());
        }
        let http = Arc::new(http);

        Ok(Self {
            trace,
            resolver,
            bootstrap_resolver,
            dialer,
            tls_dialer,
            http,
            counters,
            serial,
        })
    }

    /// A fresh per-call context attached to this session's trace log.
    pub fn context(&self) -> MeasureContext {
        MeasureContext::new(self.trace.clone())
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// Ordered snapshot of every event recorded so far.
    pub fn read_trace(&self) -> Vec<Event> {
        self.trace.read_all()
    }

    pub fn resolver(&self) -> Arc<dyn Resolver + Send + Sync> {
        self.resolver.clone()
    }

    pub fn dialer(&self) -> Arc<dyn Dialer + Send + Sync> {
        self.dialer.clone()
    }

    pub fn tls_dialer(&self) -> Arc<dyn TlsDialer + Send + Sync> {
        self.tls_dialer.clone()
    }

    pub fn http_transport(&self) -> Arc<dyn HttpTransport + Send + Sync> {
        self.http.clone()
    }

    /// Convenience for the common case.
    pub async fn round_trip(
        &self,
        cx: &MeasureContext,
        request: HttpRequest,
    ) -> Result<HttpResponse, NetError> {
        self.http.round_trip(cx, request).await
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            dns_timeouts: self.serial.as_ref().map(|s| s.timeouts()).unwrap_or(0),
            bogons_observed: self.resolver.bogons_seen() + self.bootstrap_resolver.bogons_seen(),
        }
    }
}

fn parse_socks5_url(raw: &str) -> Result<String, NetError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| NetError::InvalidAddress(format!("bad proxy url {raw}: {e}")))?;
    if parsed.scheme() != "socks5" {
        return Err(NetError::InvalidAddress(format!(
            "unsupported proxy scheme: {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| NetError::InvalidAddress(format!("proxy url without host: {raw}")))?;
    let port = parsed.port().unwrap_or(1080);
    if host.contains(':') && !host.starts_with('[') {
        return Ok(format!("[{host}]:{port}"));
    }
    Ok(format!("{host}:{port}"))
}
