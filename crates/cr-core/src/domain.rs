//! Domain validity predicate
//!
//! Every rule synthesized from a non-Clash dialect (hosts entries, `||`
//! anchors, URL anchors, bare lines) must pass [`is_valid_domain`] before it
//! is emitted. The predicate is deliberately strict: a rejected line costs
//! one missed rule, an accepted bogus one can block legitimate traffic.
//!
//! # Examples
//!
//! ```
//! use cr_core::domain::{is_valid_domain, normalize_domain};
//!
//! assert!(is_valid_domain("ads.example.com"));
//! assert!(!is_valid_domain("300x250"));
//! assert_eq!(normalize_domain(" Ads.Example.COM "), Some("ads.example.com".to_string()));
//! ```

const MIN_TLD_LEN: usize = 2;
const MAX_TLD_LEN: usize = 24;

/// Check a candidate hostname. Case-insensitive.
pub fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || !host.contains('.') {
        return false;
    }

    // IPv6 literals and host:port forms
    if host.contains(':') || is_ipv4_literal(host) {
        return false;
    }

    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return false;
    }

    for label in host.split('.') {
        if label.is_empty() || label.starts_with('-') || label.ends_with('-') {
            return false;
        }
    }

    let tld = match host.rsplit('.').next() {
        Some(tld) => tld,
        None => return false,
    };
    if tld.len() < MIN_TLD_LEN || tld.len() > MAX_TLD_LEN {
        return false;
    }
    if !tld.bytes().all(|b| b.is_ascii_alphabetic()) {
        return false;
    }

    // Size patterns such as `300x250.gif` lead with a digit
    !host.as_bytes()[0].is_ascii_digit()
}

/// Trim, strip surrounding dots, lower-case, and validate.
pub fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_ascii_lowercase();
    if is_valid_domain(&lowered) {
        Some(lowered)
    } else {
        None
    }
}

/// Dotted-quad IPv4 literal (`192.168.1.1`).
pub fn is_ipv4_literal(host: &str) -> bool {
    let mut octets = 0;
    for part in host.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || part.len() > 3 {
            return false;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u16>() {
            Ok(n) if n <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}
