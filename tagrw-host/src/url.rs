//! URL normalization for user-typed write targets
//!
//! `normalize` is a best-effort canonicalizer, not a validator: it never
//! rejects input, it only reshapes it toward a schemed absolute URL.

/// Scheme prefixes accepted as-is (compared case-insensitively)
const KNOWN_SCHEMES: [&str; 4] = ["ftp://", "ftps://", "http://", "https://"];

/// Scheme prepended when the input has none
const DEFAULT_SCHEME: &str = "https";

/// Normalize free text into a schemed URL
///
/// Percent-escapes are decoded and all whitespace is removed, repeatedly,
/// until the value is stable. A bare `://` prefix gets `https` in front of
/// it, anything without a known scheme gets `https://`.
///
/// ```
/// use tagrw_host::url::normalize;
///
/// assert_eq!(normalize("example.com"), "https://example.com");
/// assert_eq!(normalize("://example.com"), "https://example.com");
/// assert_eq!(normalize("http://example.com"), "http://example.com");
/// ```
pub fn normalize(raw: &str) -> String {
    let mut value = raw.to_owned();
    loop {
        let next = decode_and_strip(&value);
        if next == value {
            break;
        }
        value = next;
    }

    if value.starts_with("://") {
        return format!("{}{}", DEFAULT_SCHEME, value);
    }
    if !has_known_scheme(&value) {
        return format!("{}://{}", DEFAULT_SCHEME, value);
    }
    value
}

/// Whether `value` starts with one of the accepted schemes
pub fn has_known_scheme(value: &str) -> bool {
    KNOWN_SCHEMES.iter().any(|scheme| {
        value
            .get(..scheme.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .unwrap_or(false)
    })
}

// Malformed escapes pass through untouched and invalid UTF-8 turns into
// U+FFFD, so this never fails. Each change strictly shortens the value.
fn decode_and_strip(value: &str) -> String {
    let decoded = urlencoding::decode_binary(value.as_bytes());
    String::from_utf8_lossy(&decoded)
        .chars()
        .filter(|c| !is_blank(*c))
        .collect()
}

// Unicode whitespace plus the byte order mark, which `char::is_whitespace`
// does not cover
fn is_blank(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}
