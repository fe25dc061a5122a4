//! Cache and content-sniffing headers.
//!
//! # Responsibilities
//! - Stamp the no-cache directives onto a response
//! - Build the `Content-Disposition` value for generated download names
//!
//! # Design Decisions
//! - Existing values are overwritten, never merged, so a handler cannot
//!   weaken the policy
//! - Download names are restricted to a safe character set before they are
//!   quoted into the header

use axum::http::{
    header::{CACHE_CONTROL, EXPIRES, PRAGMA, X_CONTENT_TYPE_OPTIONS},
    HeaderMap, HeaderValue,
};

pub const CACHE_CONTROL_VALUE: &str = "no-store, no-cache, must-revalidate, private";
pub const PRAGMA_VALUE: &str = "no-cache";
pub const EXPIRES_VALUE: &str = "0";
pub const NOSNIFF_VALUE: &str = "nosniff";

/// Overwrite the caching and sniffing headers of `headers`.
pub fn apply_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    headers.insert(PRAGMA, HeaderValue::from_static(PRAGMA_VALUE));
    headers.insert(EXPIRES, HeaderValue::from_static(EXPIRES_VALUE));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF_VALUE));
}

/// `attachment; filename="<name>"` for a server-generated name.
pub fn attachment(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => ch,
            _ => '_',
        })
        .collect();
    let safe = if safe.is_empty() { "download".to_string() } else { safe };
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_permissive_values() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
        apply_no_cache(&mut headers);

        assert_eq!(headers[CACHE_CONTROL], CACHE_CONTROL_VALUE);
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers.get_all(CACHE_CONTROL).iter().count(), 1);
    }

    #[test]
    fn attachment_names_are_sanitized() {
        assert_eq!(attachment("merged.pdf"), "attachment; filename=\"merged.pdf\"");
        assert_eq!(attachment("a\"b\r\n.pdf"), "attachment; filename=\"a_b__.pdf\"");
        assert_eq!(attachment(""), "attachment; filename=\"download\"");
    }
}
