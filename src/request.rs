//! Request built from the function host's environment
//!
//! A request holds the headers, query parameters and original URL the
//! host passed through environment variables, plus handles for the body
//! input file and the response output. The body and its decoded form
//! parameters are read lazily, at most once.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};

use hyper::Method;

use crate::env::{
    Env, HEADER_PREFIX, INPUT_PATH_KEY, METHOD_KEY, ORIGINAL_URL_KEY, OUTPUT_PATH_KEY,
    QUERY_PREFIX,
};
use crate::error::RequestError;
use crate::http::form;

/// Flat parameter map used for headers, query and form parameters
pub type Params = HashMap<String, String>;

pub struct Request {
    method: Method,
    headers: Params,
    query: Params,
    path: String,
    input: Option<Box<dyn Read>>,
    output: Box<dyn Write>,
    body: Option<String>,
    post: Option<Params>,
    sent: Option<Sent>,
}

/// Status and size of the envelope written for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub status: u16,
    pub bytes: usize,
}

impl Request {
    /// Build a request from an environment snapshot
    ///
    /// Opens the `req` file for reading when set, and the `res` file for
    /// writing when set (standard output otherwise).
    pub fn from_env(env: &Env) -> Result<Self, RequestError> {
        let method = parse_method(env.require(METHOD_KEY)?)?;
        let path = env.require(ORIGINAL_URL_KEY)?.to_string();

        let headers = env
            .prefixed(HEADER_PREFIX)
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        let query = env
            .prefixed(QUERY_PREFIX)
            .map(|(k, v)| (k, v.to_string()))
            .collect();

        let input = match env.get(INPUT_PATH_KEY) {
            Some(path) => Some(Box::new(open_input(path)?) as Box<dyn Read>),
            None => None,
        };
        let output = open_output(env.get(OUTPUT_PATH_KEY))?;

        Ok(Self {
            method,
            headers,
            query,
            path,
            input,
            output,
            body: None,
            post: None,
            sent: None,
        })
    }

    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Raw original URL as sent by the host
    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn headers(&self) -> &Params {
        &self.headers
    }

    /// Look up a header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    /// Query parameters (the `GET` mapping)
    pub const fn query(&self) -> &Params {
        &self.query
    }

    /// Body content type, form-encoded when the header is absent
    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or(form::FORM_URLENCODED)
    }

    /// Read the whole body, once
    ///
    /// Requests without an input handle have an empty body.
    pub fn body(&mut self) -> io::Result<&str> {
        if self.body.is_none() {
            let mut text = String::new();
            if let Some(input) = self.input.as_mut() {
                input.read_to_string(&mut text)?;
            }
            // the handle is spent once the body is memoized
            self.input = None;
            self.body = Some(text);
        }
        Ok(self.body.as_deref().unwrap_or_default())
    }

    /// Decoded form parameters (the `POST` mapping)
    ///
    /// Empty for bodies that are not form-encoded; those bodies are not
    /// read.
    pub fn post(&mut self) -> io::Result<&Params> {
        if self.post.is_none() {
            let params = if form::is_form_urlencoded(self.content_type()) {
                form::decode(self.body()?)
            } else {
                Params::new()
            };
            self.post = Some(params);
        }
        Ok(self.post.get_or_insert_with(Params::new))
    }

    /// Unified lookup over form and query parameters
    ///
    /// A non-empty form value wins; an empty or missing one falls back to
    /// the query parameter of the same name.
    pub fn get(&mut self, key: &str) -> io::Result<Option<&str>> {
        self.post()?;
        let post = self
            .post
            .as_ref()
            .and_then(|params| params.get(key))
            .filter(|value| !value.is_empty());
        Ok(post
            .or_else(|| self.query.get(key))
            .map(String::as_str))
    }

    /// Write raw text to the output handle
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }

    /// The envelope written so far, if any
    pub const fn sent(&self) -> Option<Sent> {
        self.sent
    }

    pub(crate) fn record_sent(&mut self, status: u16, bytes: usize) {
        self.sent = Some(Sent { status, bytes });
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("has_input", &self.input.is_some())
            .field("body", &self.body)
            .field("post", &self.post)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

/// Builder for requests that do not come from an environment snapshot
pub struct RequestBuilder {
    method: Method,
    headers: Params,
    query: Params,
    post: Option<Params>,
    path: String,
    input: Option<Box<dyn Read>>,
    output: Option<Box<dyn Write>>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Params::new(),
            query: Params::new(),
            post: None,
            path: "/".to_string(),
            input: None,
            output: None,
        }
    }
}

impl RequestBuilder {
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_lowercase(), value.into());
        self
    }

    /// Preset the decoded form parameters instead of decoding a body
    #[must_use]
    pub fn post(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.post
            .get_or_insert_with(Params::new)
            .insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn body(mut self, input: impl Read + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    #[must_use]
    pub fn output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn build(self) -> Request {
        Request {
            method: self.method,
            headers: self.headers,
            query: self.query,
            path: self.path,
            input: self.input,
            output: self.output.unwrap_or_else(|| Box::new(io::stdout())),
            body: None,
            post: self.post,
            sent: None,
        }
    }
}

fn parse_method(raw: &str) -> Result<Method, RequestError> {
    let upper = raw.to_uppercase();
    Method::from_bytes(upper.as_bytes()).map_err(|_| RequestError::InvalidMethod(raw.to_string()))
}

fn open_input(path: &str) -> Result<File, RequestError> {
    File::open(path).map_err(|source| RequestError::Io {
        path: path.to_string(),
        source,
    })
}

/// Open the response output, standard output when no path is given
pub(crate) fn open_output(path: Option<&str>) -> Result<Box<dyn Write>, RequestError> {
    match path {
        Some(path) => File::create(path)
            .map(|file| Box::new(file) as Box<dyn Write>)
            .map_err(|source| RequestError::Io {
                path: path.to_string(),
                source,
            }),
        None => Ok(Box::new(io::stdout())),
    }
}
