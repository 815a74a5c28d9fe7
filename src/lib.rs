//! Run plain Rust handlers under a function host that passes requests
//! through environment variables and files.
//!
//! ```no_run
//! use azfunc::{run, Request};
//!
//! fn main() -> std::process::ExitCode {
//!     run(|req: &mut Request| {
//!         let name = req.get("name")?.unwrap_or("world").to_string();
//!         Ok(format!("hello, {name}"))
//!     })
//! }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod http;
pub mod json;
pub mod logger;
pub mod request;

pub use crate::config::Config;
pub use crate::env::Env;
pub use crate::error::{InvocationError, RequestError};
pub use crate::handler::{redirect, run, Function, Reply};
pub use crate::http::{body_output, output, redirect_output, Envelope};
pub use crate::request::{Params, Request, RequestBuilder};
