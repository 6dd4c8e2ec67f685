//! Bogon detection.
//!
//! A bogon is an address from a private, reserved or loopback range that
//! should never appear in a public DNS answer. Depending on the network it
//! is either evidence of DNS injection or a legitimate internal server,
//! which is why the resolver exposes both an error mode and a warn mode.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns true when `addr` belongs to a private/reserved/loopback range.
pub fn is_bogon(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_bogon_v4(v4),
        IpAddr::V6(v6) => is_bogon_v6(v6),
    }
}

fn is_bogon_v4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.is_documentation()
        || octets[0] == 0
        // Carrier-grade NAT, 100.64.0.0/10
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // IETF protocol assignments, 192.0.0.0/24
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
        // 6to4 relay anycast, 192.88.99.0/24
        || (octets[0] == 192 && octets[1] == 88 && octets[2] == 99)
        // Benchmarking, 198.18.0.0/15
        || (octets[0] == 198 && (octets[1] & 0xfe) == 18)
        // Multicast and reserved, 224.0.0.0/3
        || octets[0] >= 224
}

fn is_bogon_v6(addr: Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_bogon_v4(mapped);
    }
    let segments = addr.segments();
    addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_multicast()
        // Link-local, fe80::/10
        || (segments[0] & 0xffc0) == 0xfe80
        // Unique-local, fc00::/7
        || (segments[0] & 0xfe00) == 0xfc00
        // Discard-only, 100::/64
        || (segments[0] == 0x0100 && segments[1] == 0 && segments[2] == 0 && segments[3] == 0)
        // Documentation, 2001:db8::/32
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_is_bogon() {
        assert!(is_bogon("127.0.0.1".parse().unwrap()));
        assert!(is_bogon("::1".parse().unwrap()));
    }

    #[test]
    fn private_ranges_are_bogons() {
        assert!(is_bogon("10.1.2.3".parse().unwrap()));
        assert!(is_bogon("172.16.0.9".parse().unwrap()));
        assert!(is_bogon("192.168.1.1".parse().unwrap()));
        assert!(is_bogon("100.64.0.1".parse().unwrap()));
        assert!(is_bogon("fe80::1".parse().unwrap()));
        assert!(is_bogon("fd00::2".parse().unwrap()));
    }

    #[test]
    fn public_addresses_are_not_bogons() {
        assert!(!is_bogon("8.8.8.8".parse().unwrap()));
        assert!(!is_bogon("93.184.216.34".parse().unwrap()));
        assert!(!is_bogon("2606:4700:4700::1111".parse().unwrap()));
    }

    #[test]
    fn mapped_v4_is_checked_as_v4() {
        assert!(is_bogon("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_bogon("::ffff:8.8.4.4".parse().unwrap()));
    }
}
