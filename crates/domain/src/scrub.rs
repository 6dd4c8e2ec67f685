//! IP address scrubbing for failure strings.
//!
//! Measurement output must never leak the operator's local or NAT'd IP
//! address, so every message that can reach the `unknown_failure` fallback
//! is passed through [`scrub`] first. Both plain and `host:port` forms are
//! replaced with the literal token `[scrubbed]`.

use fancy_regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const SCRUBBED: &str = "[scrubbed]";

/// `a.b.c.d` optionally followed by `:port`, with lookarounds so we do not
/// chew into longer dotted tokens such as version strings.
static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?<![\d.])\d{1,3}(?:\.\d{1,3}){3}(?::\d{1,5})?(?![\d.])")
        .expect("ipv4 scrub pattern")
});

/// `[v6]` or `[v6]:port`.
static IPV6_BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[0-9a-fA-F:.]*:[0-9a-fA-F:.]*\](?::\d{1,5})?").expect("ipv6 bracket pattern")
});

/// Bare IPv6 literal: at least two colon-separated hextets, or a `::`
/// shorthand. The lookarounds stop us from matching inside longer
/// colon-separated sequences (e.g. certificate fingerprints).
static IPV6: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?<![0-9a-fA-F:])(?:(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}|(?:[0-9a-fA-F]{1,4}:)*[0-9a-fA-F]{0,4}::(?:[0-9a-fA-F]{1,4}:)*[0-9a-fA-F]{0,4})(?![0-9a-fA-F:])",
    )
    .expect("ipv6 scrub pattern")
});

/// Replaces every embedded IPv4 and IPv6 literal in `message` with
/// `[scrubbed]`.
pub fn scrub(message: &str) -> String {
    let scrubbed: Cow<'_, str> = IPV6_BRACKETED.replace_all(message, SCRUBBED);
    let scrubbed: Cow<'_, str> = IPV6.replace_all(&scrubbed, SCRUBBED);
    IPV4.replace_all(&scrubbed, SCRUBBED).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_ipv4_with_port() {
        assert_eq!(
            scrub("read tcp 10.0.2.15:56948->93.184.216.34:443: use of closed network connection"),
            "read tcp [scrubbed]->[scrubbed]: use of closed network connection"
        );
    }

    #[test]
    fn scrubs_bare_ipv4() {
        assert_eq!(scrub("dial 8.8.8.8 failed"), "dial [scrubbed] failed");
    }

    #[test]
    fn scrubs_bracketed_ipv6_with_port() {
        assert_eq!(
            scrub("handshake error from [2620:101:f000:780:9097:75b1:519f:dbb8]:58344: x"),
            "handshake error from [scrubbed]: x"
        );
    }

    #[test]
    fn scrubs_bare_ipv6() {
        assert_eq!(scrub("route to 2001:db8::1 lost"), "route to [scrubbed] lost");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(scrub("connection refused"), "connection refused");
    }
}
