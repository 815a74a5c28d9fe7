use std::process::ExitCode;

use anyhow::bail;
use azfunc::json::Iso8601;
use azfunc::{redirect, run, Reply, Request};
use chrono::Utc;
use serde_json::json;

fn main() -> ExitCode {
    run(echo)
}

/// Echo function: describes the request it was invoked with
fn echo(req: &mut Request) -> anyhow::Result<Reply> {
    if req.path().starts_with("/redirect") {
        let target = req.get("target")?.unwrap_or("/").to_string();
        return Ok(redirect(target));
    }

    if let Some(reason) = req.get("fail")? {
        bail!("failure requested: {reason}");
    }

    if req.get("format")? == Some("text") {
        let name = req.get("name")?.unwrap_or("world").to_string();
        return Ok(format!("hello, {name}").into());
    }

    let post = req.post()?.clone();
    Ok(json!({
        "method": req.method().as_str(),
        "path": req.path(),
        "query": req.query(),
        "post": post,
        "invoked_at": Iso8601(Utc::now()),
    })
    .into())
}
