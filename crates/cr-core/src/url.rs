//! Fast URL helpers for Adblock URL-anchor rules
//!
//! These functions avoid allocations and work directly on string slices.

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Web scheme of a URL-anchor rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// Fast scheme extraction without URL parsing.
/// Returns None for anything but `http://` and `https://`.
#[inline]
pub fn extract_scheme(url: &str) -> Option<Scheme> {
    let bytes = url.as_bytes();
    if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
        Some(Scheme::Https)
    } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
        Some(Scheme::Http)
    } else {
        None
    }
}

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2
        && bytes[colon_pos + 1] == b'/'
        && bytes[colon_pos + 2] == b'/'
    {
        return Some(colon_pos + 3);
    }

    None
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Fast host extraction without allocations.
/// Returns a slice into the original URL, which may be empty.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Get the start and end positions of the hostname in a URL.
///
/// The host ends at the first path, query, fragment or port delimiter, or at
/// an Adblock separator (`^`, `|`, `*`).
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' {
            break;
        }
    }

    let mut host_end = bytes.len();
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        if matches!(b, b'/' | b'?' | b'#' | b':' | b'^' | b'|' | b'*') {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}
