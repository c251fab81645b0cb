//! Integration test infrastructure.
//!
//! Runs the workspace test suites against a real Redis server in a
//! container, then drives the plugin binary end to end over its stdio
//! protocol.
//!
//! # Usage
//!
//! ```bash
//! # Start Redis, run the tests and the plugin smoke test, stop Redis
//! cargo xtask integration
//!
//! # Skip container management (assumes Redis is already running)
//! cargo xtask integration --no-docker
//!
//! # Publish the container on another port
//! cargo xtask integration --port 16379
//! ```

pub mod error;
mod smoke;

pub use error::{IntegrationError, Result};

use std::time::Duration;

use crate::containers::{
    detect_runtime, is_running, start_container, stop_container, wait_for_health,
    ContainerRuntime, ContainerSpec, REDIS_SPEC,
};
use crate::prelude::*;

/// Integration test command.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Run integration tests against a real Redis server.

This command starts a Redis container, runs the cachebridge test suites
with REDIS_URL pointing at it, runs a smoke session against the plugin
binary, and stops the container afterward.

Environment variables:
  REDIS_URL           - Redis URL to use with --no-docker (default: redis://localhost:6379)")]
pub struct IntegrationCommand {
    /// Skip Docker container management (assume Redis is already running).
    #[arg(long)]
    pub no_docker: bool,

    /// Keep the container running after tests complete.
    #[arg(long)]
    pub keep_containers: bool,

    /// Prefer Podman over Docker when both are installed.
    #[arg(long)]
    pub podman: bool,

    /// Host port the Redis container is published on.
    #[arg(long, default_value = "6379")]
    pub port: u16,

    /// Skip the plugin binary smoke test.
    #[arg(long)]
    pub skip_smoke: bool,

    /// Timeout in seconds for container health checks.
    #[arg(long, default_value = "30")]
    pub health_timeout: u64,
}

/// Main entry point for integration command.
pub async fn run(command: IntegrationCommand, global: crate::Global) -> Result<()> {
    let spec = REDIS_SPEC.on_host_port(command.port);
    let redis_url = if command.no_docker {
        std::env::var("REDIS_URL").unwrap_or_else(|_| REDIS_SPEC.redis_url())
    } else {
        spec.redis_url()
    };

    if !global.is_silent() {
        aprintln!("{}", p_b("Integration Tests"));
        aprintln!();
        aprintln!("{} Redis: {}", p_b("Config:"), redis_url);
        aprintln!();
    }

    let runtime = if command.no_docker {
        if !global.is_silent() {
            aprintln!(
                "{} {}",
                p_y("⚠️"),
                "Skipping Redis container management (--no-docker)"
            );
        }
        None
    } else {
        Some(detect_runtime(command.podman).await?)
    };

    let mut redis_started = false;
    if let Some(rt) = runtime {
        redis_started = start_redis_container(&spec, command.health_timeout, &global, rt).await?;
    }

    let outcome = run_suites(&redis_url, command.skip_smoke, &global).await;

    if let Some(rt) = runtime {
        if redis_started && !command.keep_containers {
            stop_redis_container(&spec, &global, rt).await;
        } else if redis_started && !global.is_silent() {
            aprintln!(
                "{} {}",
                p_y("⚠️"),
                "Containers left running (--keep-containers)"
            );
        }
    }

    aprintln!();
    match outcome {
        Ok(()) => {
            aprintln!("{} {}", p_g("✅"), p_g("All integration tests passed!"));
            Ok(())
        }
        Err(e) => {
            aprintln!("{} {}", p_r("❌"), p_r("Some integration tests failed"));
            Err(e)
        }
    }
}

async fn run_suites(redis_url: &str, skip_smoke: bool, global: &crate::Global) -> Result<()> {
    if !run_tests(redis_url, global).await? {
        return Err(IntegrationError::TestFailed(
            "One or more test suites failed".to_string(),
        ));
    }

    if skip_smoke {
        return Ok(());
    }

    if !global.is_silent() {
        aprintln!("{} {}", p_b("🔧"), p_b("Running plugin smoke test..."));
    }
    smoke::run(redis_url, global).await?;
    if !global.is_silent() {
        aprintln!("{} {}", p_g("✅"), "Plugin smoke test passed");
    }
    Ok(())
}

/// Runs the workspace test suites with `REDIS_URL` set.
async fn run_tests(redis_url: &str, global: &crate::Global) -> Result<bool> {
    if !global.is_silent() {
        aprintln!("{} {}", p_b("🔧"), p_b("Running test suites..."));
    }

    let mut cmd = tokio::process::Command::new("cargo");
    cmd.args(["test", "-p", "cachebridge_core", "-p", "cachebridge"])
        .env("REDIS_URL", redis_url);
    if global.is_verbose() {
        cmd.args(["--", "--nocapture"]);
    }

    let status = cmd.status().await?;

    if status.success() {
        if !global.is_silent() {
            aprintln!("{} {}", p_g("✅"), "Test suites passed");
        }
        Ok(true)
    } else {
        aprintln!("{} {}", p_r("❌"), "Test suites failed");
        Ok(false)
    }
}

/// Start the Redis container. Returns false if one was already running.
async fn start_redis_container(
    spec: &ContainerSpec,
    timeout_secs: u64,
    global: &crate::Global,
    runtime: ContainerRuntime,
) -> Result<bool> {
    if is_running(runtime, spec.name).await? {
        if !global.is_silent() {
            aprintln!("{} {}", p_y("⚠️"), "Redis container already running");
        }
        return Ok(false);
    }

    if !global.is_silent() {
        aprintln!("{} {}", p_b("🐳"), "Starting Redis container...");
    }

    start_container(runtime, spec).await?;

    if !global.is_silent() {
        aprintln!(
            "{} {}",
            p_b("⏳"),
            format!("Waiting for Redis health (max {}s)...", timeout_secs)
        );
    }

    wait_for_health(runtime, spec, Duration::from_secs(timeout_secs)).await?;

    if !global.is_silent() {
        aprintln!("{} {}", p_g("✅"), "Redis is ready");
    }

    Ok(true)
}

/// Stop the Redis container.
async fn stop_redis_container(spec: &ContainerSpec, global: &crate::Global, runtime: ContainerRuntime) {
    if !global.is_silent() {
        aprintln!("{} {}", p_b("🐳"), "Stopping Redis container...");
    }

    stop_container(runtime, spec.name).await;

    if !global.is_silent() {
        aprintln!("{} {}", p_g("✅"), "Redis container stopped");
    }
}
