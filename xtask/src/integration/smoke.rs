//! End-to-end session against the plugin binary.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{IntegrationError, Result};

const COOKIE: &str = "xtask-smoke";

/// Expected shape of one response.
#[derive(Debug, Clone, PartialEq)]
enum Expect {
    Result(Value),
    ErrorKind(&'static str),
}

/// Requests sent to the plugin, each paired with the response it must produce.
fn session(redis_url: &str, key: &str) -> Vec<(Value, Expect)> {
    vec![
        (
            json!({"id": 1, "method": "cache.Get", "params": {"key": key}}),
            Expect::ErrorKind("not_initialized"),
        ),
        (
            json!({"id": 2, "method": "cache.InitConnection", "params": {"uri": redis_url}}),
            Expect::Result(Value::Null),
        ),
        (
            json!({"id": 3, "method": "cache.Get", "params": {"key": key}}),
            Expect::ErrorKind("cache_miss"),
        ),
        (
            json!({"id": 4, "method": "cache.Set", "params": {"key": key, "value": "smoke", "ttl_ms": 60000}}),
            Expect::Result(Value::Null),
        ),
        (
            json!({"id": 5, "method": "cache.Get", "params": {"key": key}}),
            Expect::Result(json!("smoke")),
        ),
        (
            json!({"id": 6, "method": "cache.Close"}),
            Expect::Result(Value::Null),
        ),
    ]
}

fn check_handshake(line: &str) -> Result<()> {
    let handshake: Value = serde_json::from_str(line)?;
    if handshake["plugins"] == json!(["cache"]) && handshake["transport"] == json!("jsonl") {
        Ok(())
    } else {
        Err(IntegrationError::SmokeFailed(format!(
            "unexpected handshake: {line}"
        )))
    }
}

fn check_response(request: &Value, expect: &Expect, line: &str) -> Result<()> {
    let response: Value = serde_json::from_str(line)?;
    if response["id"] != request["id"] {
        return Err(IntegrationError::SmokeFailed(format!(
            "response id mismatch for {request}: {line}"
        )));
    }

    let ok = match expect {
        Expect::Result(value) => response.get("result") == Some(value),
        Expect::ErrorKind(kind) => response["error"]["kind"] == json!(kind),
    };

    if ok {
        Ok(())
    } else {
        Err(IntegrationError::SmokeFailed(format!(
            "{} expected {:?}, got {line}",
            request["method"], expect
        )))
    }
}

/// Builds and launches the plugin, then plays [`session`] against it.
pub async fn run(redis_url: &str, global: &crate::Global) -> Result<()> {
    let key = format!("smoke:cachebridge:{}", uuid::Uuid::new_v4());

    let mut child = Command::new("cargo")
        .args(["run", "-q", "-p", "cachebridge"])
        .env("CACHEBRIDGE_COOKIE_VALUE", COOKIE)
        .env("CACHEBRIDGE_PLUGIN_COOKIE", COOKIE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if global.is_verbose() {
            Stdio::inherit()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true)
        .spawn()?;

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(IntegrationError::SmokeFailed(
            "plugin stdio was not captured".to_string(),
        ));
    };
    let mut lines = BufReader::new(stdout).lines();

    let handshake = next_line(&mut lines).await?;
    check_handshake(&handshake)?;

    for (request, expect) in session(redis_url, &key) {
        stdin.write_all(format!("{request}\n").as_bytes()).await?;
        stdin.flush().await?;
        let line = next_line(&mut lines).await?;
        check_response(&request, &expect, &line)?;
    }

    drop(stdin);
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .map_err(|_| IntegrationError::SmokeFailed("plugin did not exit on EOF".to_string()))??;

    if status.success() {
        Ok(())
    } else {
        Err(IntegrationError::SmokeFailed(format!(
            "plugin exited with {status}"
        )))
    }
}

async fn next_line<R>(lines: &mut tokio::io::Lines<R>) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    // The first read includes compiling the plugin.
    tokio::time::timeout(Duration::from_secs(300), lines.next_line())
        .await
        .map_err(|_| IntegrationError::SmokeFailed("timed out waiting for plugin".to_string()))??
        .ok_or_else(|| IntegrationError::SmokeFailed("plugin closed stdout".to_string()))
}
