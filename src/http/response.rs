//! Response envelope building and output
//!
//! The host expects exactly one JSON document per invocation:
//! `{"status": <int>, "body": <value>, "headers": {<name>: <value>}}`,
//! with `body` omitted when there is none.

use std::collections::BTreeMap;
use std::io;

use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::logger;
use crate::request::Request;

/// Written when an envelope cannot be serialized
const FALLBACK_ENVELOPE: &str =
    r#"{"status":500,"body":"Failed to serialize response","headers":{"content-type":"text/plain"}}"#;

/// Response envelope serialized as the sole invocation output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl Envelope {
    /// Envelope with no body and no headers
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    /// Envelope carrying a body and its content type
    pub fn with_body(status: StatusCode, body: Value, content_type: &str) -> Self {
        Self::new(status)
            .body(body)
            .header("content-type", content_type)
    }

    /// 302 envelope pointing at `location`, without a body
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::FOUND).header("location", location)
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            FALLBACK_ENVELOPE.to_string()
        })
    }
}

/// Write an envelope to the request's output handle
///
/// Returns the number of bytes written.
pub fn output(req: &mut Request, envelope: &Envelope) -> io::Result<usize> {
    let json = envelope.to_json();
    req.write(&json)?;
    req.record_sent(envelope.status, json.len());
    Ok(json.len())
}

/// Write `body` with the given status and content type
pub fn body_output(
    req: &mut Request,
    body: impl Into<Value>,
    status: StatusCode,
    content_type: &str,
) -> io::Result<usize> {
    output(req, &Envelope::with_body(status, body.into(), content_type))
}

/// Write a 302 redirect to `location`
pub fn redirect_output(req: &mut Request, location: &str) -> io::Result<usize> {
    output(req, &Envelope::redirect(location))
}
