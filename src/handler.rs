//! Handler adaptation
//!
//! [`Function`] turns a plain `Fn(&mut Request) -> anyhow::Result<R>` into
//! a complete invocation: build the request from the environment, call the
//! handler, shape its reply into an envelope and write it out. Any error or
//! panic from the handler becomes a 500 envelope carrying the trace text.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use hyper::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{Config, LoggingConfig};
use crate::env::{Env, OUTPUT_PATH_KEY};
use crate::error::{InvocationResult, RequestError};
use crate::http::{body_output, redirect_output, Envelope};
use crate::json;
use crate::logger::{self, InvocationLogEntry};
use crate::request::{self, Request};

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";

/// Custom output step run with the request instead of a body reply
pub type CustomOutput = Box<dyn FnOnce(&mut Request) -> anyhow::Result<()>>;

/// What a handler hands back
pub enum Reply {
    /// 200 `text/plain`
    Text(String),
    /// 200 `application/json`
    Json(Value),
    /// Writes its own output, e.g. a redirect
    Custom(CustomOutput),
}

impl Reply {
    /// JSON reply from any serializable value
    ///
    /// Values serde cannot encode are sent as their debug string.
    pub fn json<T: Serialize + Debug + ?Sized>(value: &T) -> Self {
        Self::Json(json::to_value(value))
    }

    pub fn custom(output: impl FnOnce(&mut Request) -> anyhow::Result<()> + 'static) -> Self {
        Self::Custom(Box::new(output))
    }

    fn send(self, req: &mut Request) -> anyhow::Result<()> {
        match self {
            Self::Text(text) => {
                body_output(req, text, StatusCode::OK, TEXT_PLAIN)?;
            }
            Self::Json(value) => {
                body_output(req, value, StatusCode::OK, APPLICATION_JSON)?;
            }
            Self::Custom(output) => output(req)?,
        }
        Ok(())
    }
}

impl Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for Reply {
    fn from(map: Map<String, Value>) -> Self {
        Self::Json(Value::Object(map))
    }
}

impl<V: Serialize + Debug> From<HashMap<String, V>> for Reply {
    fn from(map: HashMap<String, V>) -> Self {
        Self::json(&map)
    }
}

impl<V: Serialize + Debug> From<BTreeMap<String, V>> for Reply {
    fn from(map: BTreeMap<String, V>) -> Self {
        Self::json(&map)
    }
}

/// Reply that redirects to `location` with a 302
pub fn redirect(location: impl Into<String>) -> Reply {
    let location = location.into();
    Reply::custom(move |req| {
        redirect_output(req, &location)?;
        Ok(())
    })
}

/// A handler wrapped for invocation by the function host
pub struct Function<F> {
    handler: F,
    logging: LoggingConfig,
}

impl<F, R> Function<F>
where
    F: Fn(&mut Request) -> anyhow::Result<R>,
    R: Into<Reply>,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.logging = config.logging;
        self
    }

    /// Run one invocation described by `env`
    ///
    /// Handler failures are answered with a 500 envelope and are not
    /// errors here. An error is returned only when the request cannot be
    /// built (a 500 envelope is still written) or the output cannot be
    /// written.
    pub fn invoke(&self, env: &Env) -> InvocationResult<()> {
        let mut req = match Request::from_env(env) {
            Ok(req) => req,
            Err(err) => {
                logger::log_request_error(&err);
                if let Err(write_err) = report_request_error(env, &err) {
                    logger::log_output_error(&write_err);
                }
                return Err(err.into());
            }
        };

        logger::log_invocation_start(req.method().as_str(), req.path());
        let started = Instant::now();
        let result = self.dispatch(&mut req);

        if let Err(ref err) = result {
            logger::log_output_error(err);
        }
        if self.logging.access_log {
            logger::log_access(&access_entry(&req, started), &self.logging.access_log_format);
        }
        result.map_err(Into::into)
    }

    /// Call the handler and deliver its reply, or the failure trace
    pub fn call(&self, req: &mut Request) -> io::Result<()> {
        self.dispatch(req)
    }

    fn dispatch(&self, req: &mut Request) -> io::Result<()> {
        let outcome = catch_panic(|| {
            let reply: Reply = (self.handler)(req)?.into();
            logger::log_debug(&format!("Handler replied with {reply:?}"));
            reply.send(req)
        });

        let trace = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => format_error(&err),
            Err(trace) => trace,
        };

        logger::log_handler_error(&trace);
        // the host reads exactly one envelope
        if req.sent().is_none() {
            body_output(req, trace, StatusCode::INTERNAL_SERVER_ERROR, TEXT_PLAIN)?;
        }
        Ok(())
    }
}

/// Process entry point: run `handler` against the process environment
///
/// Loads configuration, initialises logging and performs one invocation.
pub fn run<F, R>(handler: F) -> ExitCode
where
    F: Fn(&mut Request) -> anyhow::Result<R>,
    R: Into<Reply>,
{
    let env = Env::capture();
    let config = Config::from_env(&env).unwrap_or_else(|e| {
        logger::log_warning(&format!("Failed to load configuration, using defaults: {e}"));
        Config::default()
    });
    if let Err(e) = logger::init(&config.logging) {
        logger::log_warning(&format!("Failed to initialize log files: {e}"));
    }

    match Function::new(handler).with_config(config).invoke(&env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Write a 500 envelope for a request that could not be built
///
/// Goes to the `res` file when it can be opened, stdout otherwise.
fn report_request_error(env: &Env, err: &RequestError) -> io::Result<()> {
    let mut out = request::open_output(env.get(OUTPUT_PATH_KEY))
        .unwrap_or_else(|_| Box::new(io::stdout()));
    let envelope = Envelope::with_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        Value::String(err.to_string()),
        TEXT_PLAIN,
    );
    out.write_all(envelope.to_json().as_bytes())?;
    out.flush()
}

fn access_entry(req: &Request, started: Instant) -> InvocationLogEntry {
    let mut entry = InvocationLogEntry::new(req.method().to_string(), req.path().to_string());
    if let Some(sent) = req.sent() {
        entry.status = sent.status;
        entry.body_bytes = sent.bytes;
    }
    entry.remote_addr = req.header("x-forwarded-for").map(ToString::to_string);
    entry.referer = req.header("referer").map(ToString::to_string);
    entry.user_agent = req.header("user-agent").map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

/// Render an error with its cause chain, plus the backtrace when captured
fn format_error(err: &anyhow::Error) -> String {
    format!("{err:?}")
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Serializes swapping the process-wide panic hook; handlers must not
/// invoke another `Function` from inside their own call
static HOOK_LOCK: Mutex<()> = Mutex::new(());

/// Run `f`, turning a panic into its trace text
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    let _guard = HOOK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::capture();
        let trace = match backtrace.status() {
            BacktraceStatus::Captured => format!("{info}\n\nStack backtrace:\n{backtrace}"),
            _ => info.to_string(),
        };
        PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
    }));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(previous);

    result.map_err(|payload| {
        PANIC_TRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| panic_message(payload.as_ref()))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvocationError;
    use anyhow::{bail, Context};
    use serde_json::json;
    use std::path::Path;

    fn invocation_env(res: &Path, extra: &[(&str, &str)]) -> Env {
        let mut pairs = vec![
            ("REQ_METHOD".to_string(), "get".to_string()),
            ("REQ_HEADERS_X-ORIGINAL-URL".to_string(), "/api/hello".to_string()),
            ("res".to_string(), res.to_string_lossy().into_owned()),
        ];
        pairs.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
        Env::from_iter(pairs)
    }

    fn quiet<F, R>(handler: F) -> Function<F>
    where
        F: Fn(&mut Request) -> anyhow::Result<R>,
        R: Into<Reply>,
    {
        let mut config = Config::default();
        config.logging.access_log = false;
        Function::new(handler).with_config(config)
    }

    fn read_envelope(path: &Path) -> Value {
        let text = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_text_reply() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| Ok("hello"))
            .invoke(&invocation_env(&res, &[]))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&res).unwrap(),
            r#"{"status":200,"body":"hello","headers":{"content-type":"text/plain"}}"#
        );
    }

    #[test]
    fn test_json_reply() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| Ok(json!({"a": 1})))
            .invoke(&invocation_env(&res, &[]))
            .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 200);
        assert_eq!(envelope["body"], json!({"a": 1}));
        assert_eq!(envelope["headers"]["content-type"], "application/json");
    }

    #[test]
    fn test_hashmap_reply_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|req: &mut Request| {
            let mut map = HashMap::new();
            map.insert("path".to_string(), req.path().to_string());
            Ok(map)
        })
        .invoke(&invocation_env(&res, &[]))
        .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["body"], json!({"path": "/api/hello"}));
        assert_eq!(envelope["headers"]["content-type"], "application/json");
    }

    #[test]
    fn test_handler_error_becomes_500() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| -> anyhow::Result<Reply> {
            Err(anyhow::anyhow!("database unreachable")).context("loading profile")
        })
        .invoke(&invocation_env(&res, &[]))
        .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 500);
        assert_eq!(envelope["headers"]["content-type"], "text/plain");
        let body = envelope["body"].as_str().unwrap();
        assert!(body.contains("loading profile"));
        assert!(body.contains("database unreachable"));
    }

    #[test]
    fn test_handler_panic_becomes_500() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| -> anyhow::Result<String> { panic!("kaboom") })
            .invoke(&invocation_env(&res, &[]))
            .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 500);
        assert!(envelope["body"].as_str().unwrap().contains("kaboom"));
    }

    #[test]
    fn test_redirect_reply() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| Ok(redirect("/x")))
            .invoke(&invocation_env(&res, &[]))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&res).unwrap(),
            r#"{"status":302,"headers":{"location":"/x"}}"#
        );
    }

    #[test]
    fn test_custom_reply_controls_status() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| {
            Ok(Reply::custom(|req| {
                body_output(req, "<p>made</p>", StatusCode::CREATED, "text/html")?;
                Ok(())
            }))
        })
        .invoke(&invocation_env(&res, &[]))
        .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 201);
        assert_eq!(envelope["body"], "<p>made</p>");
        assert_eq!(envelope["headers"]["content-type"], "text/html");
    }

    #[test]
    fn test_form_body_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");
        let body = dir.path().join("req.txt");
        std::fs::write(&body, "name=Ada&city=").unwrap();

        let env = invocation_env(
            &res,
            &[
                ("req", body.to_str().unwrap()),
                ("REQ_METHOD", "post"),
                ("REQ_QUERY_CITY", "Paris"),
            ],
        );
        quiet(|req: &mut Request| {
            let name = req.get("name")?.unwrap_or("nobody").to_string();
            let city = req.get("city")?.unwrap_or("nowhere").to_string();
            Ok(format!("{} {name} from {city}", req.method()))
        })
        .invoke(&env)
        .unwrap();

        let envelope = read_envelope(&res);
        assert_eq!(envelope["body"], "POST Ada from Paris");
    }

    #[test]
    fn test_missing_field_writes_500_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");
        let env = Env::from_iter([
            ("REQ_HEADERS_X-ORIGINAL-URL", "/"),
            ("res", res.to_str().unwrap()),
        ]);

        let err = quiet(|_req: &mut Request| Ok("unreachable"))
            .invoke(&env)
            .unwrap_err();
        assert!(err.to_string().contains("REQ_METHOD"));

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 500);
        assert!(envelope["body"].as_str().unwrap().contains("REQ_METHOD"));
    }

    #[test]
    fn test_call_with_built_request() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");
        let mut req = Request::builder()
            .output(std::fs::File::create(&res).unwrap())
            .build();

        quiet(|_req: &mut Request| -> anyhow::Result<String> { bail!("nope") })
            .call(&mut req)
            .unwrap();

        let sent = req.sent().unwrap();
        assert_eq!(sent.status, 500);
        assert_eq!(sent.bytes, std::fs::read(&res).unwrap().len());
    }

    #[test]
    fn test_failure_after_output_keeps_single_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");

        quiet(|_req: &mut Request| {
            Ok(Reply::custom(|req| {
                redirect_output(req, "/x")?;
                bail!("after write")
            }))
        })
        .invoke(&invocation_env(&res, &[]))
        .unwrap();

        let text = std::fs::read_to_string(&res).unwrap();
        let envelope: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope["status"], 302);
        assert_eq!(envelope["headers"]["location"], "/x");
        assert!(envelope.get("body").is_none());
    }

    #[test]
    fn test_unopenable_output_path_errors_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("missing-dir").join("res.json");

        let err = quiet(|_req: &mut Request| Ok("unreachable"))
            .invoke(&invocation_env(&res, &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Request(RequestError::Io { .. })
        ));
        assert!(!res.exists());
    }

    #[test]
    fn test_unreadable_input_path_writes_500() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("res.json");
        let missing = dir.path().join("absent.txt");

        let err = quiet(|_req: &mut Request| Ok("unreachable"))
            .invoke(&invocation_env(&res, &[("req", missing.to_str().unwrap())]))
            .unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Request(RequestError::Io { .. })
        ));

        let envelope = read_envelope(&res);
        assert_eq!(envelope["status"], 500);
        assert_eq!(envelope["headers"]["content-type"], "text/plain");
        assert!(envelope["body"].as_str().unwrap().contains("absent.txt"));
    }

    #[test]
    fn test_panic_captured_after_clean_call() {
        assert_eq!(catch_panic(|| 7_u8), Ok(7));
        let result = catch_panic(|| -> u8 { panic!("second") });
        assert!(result.unwrap_err().contains("second"));
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "handler panicked: static");
        assert_eq!(
            panic_message(&String::from("owned")),
            "handler panicked: owned"
        );
        assert_eq!(panic_message(&42_u8), "handler panicked");
    }
}
