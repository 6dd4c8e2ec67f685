use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Where the base resolver sends its queries.
///
/// Parsed from the configuration surface: `system`, `udp://IP:PORT`,
/// `tcp://IP:PORT`, `dot://HOST:PORT` and `https://URL`. UDP and TCP
/// require an IP literal; DoT may carry a hostname, which the TLS dialer
/// resolves through its own (system) resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEndpoint {
    System,
    Udp { addr: SocketAddr },
    Tcp { addr: SocketAddr },
    Tls { address: String, server_name: String },
    Https { url: String },
}

impl ResolverEndpoint {
    pub fn network(&self) -> &'static str {
        match self {
            ResolverEndpoint::System => "system",
            ResolverEndpoint::Udp { .. } => "udp",
            ResolverEndpoint::Tcp { .. } => "tcp",
            ResolverEndpoint::Tls { .. } => "dot",
            ResolverEndpoint::Https { .. } => "doh",
        }
    }
}

/// Splits `host:port`, handling the `[v6]:port` bracket form.
pub fn parse_host_port(s: &str) -> Option<(&str, u16)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?.parse::<u16>().ok()?;
        return Some((host, port));
    }
    let (host, port_str) = s.rsplit_once(':')?;
    // A second colon means this is a bare IPv6 literal, not host:port.
    if host.contains(':') {
        return None;
    }
    let port = port_str.parse::<u16>().ok()?;
    Some((host, port))
}

impl FromStr for ResolverEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(ResolverEndpoint::System);
        }
        if let Some(addr_str) = s.strip_prefix("udp://") {
            let addr = addr_str
                .parse::<SocketAddr>()
                .map_err(|e| format!("invalid UDP resolver address '{}': {}", addr_str, e))?;
            return Ok(ResolverEndpoint::Udp { addr });
        }
        if let Some(addr_str) = s.strip_prefix("tcp://") {
            let addr = addr_str
                .parse::<SocketAddr>()
                .map_err(|e| format!("invalid TCP resolver address '{}': {}", addr_str, e))?;
            return Ok(ResolverEndpoint::Tcp { addr });
        }
        if let Some(rest) = s.strip_prefix("dot://").or_else(|| s.strip_prefix("tls://")) {
            if let Some((host, port)) = parse_host_port(rest) {
                let address = if host.contains(':') {
                    format!("[{}]:{}", host, port)
                } else {
                    format!("{}:{}", host, port)
                };
                return Ok(ResolverEndpoint::Tls {
                    address,
                    server_name: host.to_string(),
                });
            }
            // Bare host: default DoT port.
            if !rest.is_empty() && !rest.contains('/') {
                return Ok(ResolverEndpoint::Tls {
                    address: format!("{}:853", rest),
                    server_name: rest.to_string(),
                });
            }
            return Err(format!(
                "invalid DoT endpoint '{}'. Expected 'dot://HOST:PORT'",
                s
            ));
        }
        if s.starts_with("https://") {
            return Ok(ResolverEndpoint::Https { url: s.to_string() });
        }
        Err(format!(
            "invalid resolver endpoint '{}'. Expected: system, udp://IP:PORT, tcp://IP:PORT, dot://HOST:PORT, or https://URL",
            s
        ))
    }
}

impl fmt::Display for ResolverEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverEndpoint::System => f.write_str("system"),
            ResolverEndpoint::Udp { addr } => write!(f, "udp://{}", addr),
            ResolverEndpoint::Tcp { addr } => write!(f, "tcp://{}", addr),
            ResolverEndpoint::Tls { address, .. } => write!(f, "dot://{}", address),
            ResolverEndpoint::Https { url } => f.write_str(url),
        }
    }
}
