//! Constant-time comparisons for secret-adjacent strings.
//!
//! Both inputs are padded to the same length and compared in full, and the
//! result is combined with a length-equality check, so timing reveals neither
//! the position of the first difference nor whether the lengths matched.

use subtle::ConstantTimeEq;

const BEARER_PREFIX: &[u8] = b"Bearer ";

/// Compare two byte strings in time dependent only on the longer length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());

    let mut padded_a = vec![0u8; len];
    let mut padded_b = vec![0u8; len];
    padded_a[..a.len()].copy_from_slice(a);
    padded_b[..b.len()].copy_from_slice(b);

    let bytes_equal = padded_a.ct_eq(&padded_b);
    let lengths_equal = (a.len() as u64).ct_eq(&(b.len() as u64));

    (bytes_equal & lengths_equal).into()
}

/// [`constant_time_eq`] over UTF-8 strings.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Strip the `Bearer ` scheme from an Authorization header value.
///
/// The prefix is checked in constant time. Returns `None` when the scheme is
/// absent or nothing follows it.
pub fn strip_bearer(header: &str) -> Option<&str> {
    let bytes = header.as_bytes();
    let head = &bytes[..bytes.len().min(BEARER_PREFIX.len())];

    if !constant_time_eq(head, BEARER_PREFIX) {
        return None;
    }

    header
        .get(BEARER_PREFIX.len()..)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"org-acme", b"org-acme"));
        assert!(!constant_time_eq(b"org-acme", b"org-acmf"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_padding_does_not_hide_length_difference() {
        // "abc" padded with zeros equals "abc\0" byte-for-byte; the length check must catch it
        assert!(!constant_time_eq(b"abc", b"abc\0"));
        assert!(!constant_time_str_eq("org", "org-acme"));
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer a.b.c"), Some("a.b.c"));
        assert_eq!(strip_bearer("Bearer   a.b.c  "), Some("a.b.c"));
        assert_eq!(strip_bearer("bearer a.b.c"), None);
        assert_eq!(strip_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(strip_bearer("Bearer "), None);
        assert_eq!(strip_bearer("Bear"), None);
        assert_eq!(strip_bearer(""), None);
    }
}
