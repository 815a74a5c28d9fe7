//! Environment snapshot
//!
//! The function host passes the whole request through environment
//! variables. Everything below `main` works on an owned [`Env`] value
//! instead of reading the process environment, so invocations can be
//! reproduced from a plain map.

use std::collections::HashMap;

use crate::error::RequestError;

/// Request method variable
pub const METHOD_KEY: &str = "REQ_METHOD";
/// Prefix shared by all header variables
pub const HEADER_PREFIX: &str = "REQ_HEADERS";
/// Prefix shared by all query parameter variables
pub const QUERY_PREFIX: &str = "REQ_QUERY";
/// Header variable carrying the original request URL
pub const ORIGINAL_URL_KEY: &str = "REQ_HEADERS_X-ORIGINAL-URL";
/// Path of the file holding the request body
pub const INPUT_PATH_KEY: &str = "req";
/// Path of the file the response envelope goes to
pub const OUTPUT_PATH_KEY: &str = "res";

/// Owned snapshot of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Capture the current process environment
    ///
    /// Values that are not valid UTF-8 are converted lossily.
    pub fn capture() -> Self {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Look up a variable the invocation cannot do without
    pub fn require(&self, key: &'static str) -> Result<&str, RequestError> {
        self.get(key).ok_or(RequestError::MissingField(key))
    }

    /// Iterate over variables whose name starts with `prefix`
    ///
    /// Yields the lower-cased remainder after the prefix and its separator
    /// character, paired with the value.
    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (String, &'a str)> + 'a {
        self.vars.iter().filter_map(move |(key, value)| {
            let rest = key.strip_prefix(prefix)?;
            let mut chars = rest.chars();
            chars.next();
            Some((chars.as_str().to_lowercase(), value.as_str()))
        })
    }

    /// Borrow the raw variable map
    pub const fn as_map(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
