//! Form body decoding
//!
//! Decodes `application/x-www-form-urlencoded` bodies into a flat
//! parameter map.

use std::collections::HashMap;

/// Media type of form-encoded bodies, also assumed when none is given
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Check whether a `Content-Type` value names a form-encoded body
///
/// Parameters such as `charset` are ignored.
pub fn is_form_urlencoded(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

/// Decode a form-encoded body
///
/// Pairs with an empty value are skipped. When a key repeats, the last
/// occurrence wins.
pub fn decode(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}
