//! CLI entry point for RunnerHost.
//!
//! This binary provides the `runnerhost` command with subcommands for
//! inspecting runner scripts, listing known runners and calling into them.

mod cli;
mod config;
mod host;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use runnerhost_sandbox::Runner;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::HostConfig;
use crate::host::Host;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cli = Cli::parse();
    let mut config = HostConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.sandbox.backend = backend;
    }

    let host = Host::open(&config).await?;
    let outcome = match cli.command {
        Commands::Inspect { file } => cmd_inspect(&host, &file).await,
        Commands::List { scan } => cmd_list(&host, &config, scan).await,
        Commands::Call { file, method, args } => cmd_call(&host, &file, &method, &args).await,
        Commands::Content { file, content_id } => cmd_content(&host, &file, &content_id).await,
    };
    host.close().await;
    outcome
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_inspect(host: &Host, file: &Path) -> Result<()> {
    let runner = load(host, file).await?;
    let handle = runner.handle();
    let methods = handle.rpc().backend().method_names().await?;

    print_json(&json!({
        "info": handle.info(),
        "environment": handle.environment().as_str(),
        "backend": handle.backend_kind().as_str(),
        "capabilities": handle.intents().capabilities().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        "authenticationMethod": handle.intents().authentication_method,
        "methods": methods,
    }))
}

async fn cmd_list(host: &Host, config: &HostConfig, scan: bool) -> Result<()> {
    if scan {
        let runners = host
            .loader
            .load_dir(&config.runners_dir)
            .await
            .with_context(|| format!("failed to scan {}", config.runners_dir.display()))?;
        info!(loaded = runners.len(), dir = %config.runners_dir.display(), "scan complete");
        for runner in runners {
            host.registry.publish(runner)?;
        }
    }

    let records = host.records.list(None).await?;
    if records.is_empty() {
        println!("No runners recorded. Try `runnerhost list --scan`.");
        return Ok(());
    }
    for record in records {
        let state = if host.registry.contains(&record.id) { "loaded" } else { "recorded" };
        println!(
            "{:<24} {:<8} v{:<6} {:<10} {} [{}]",
            record.id,
            record.environment,
            record.version,
            record.backend,
            state,
            record.intents.join(", ")
        );
    }
    Ok(())
}

async fn cmd_call(host: &Host, file: &Path, method: &str, args: &[String]) -> Result<()> {
    let runner = load(host, file).await?;
    let args: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
    let result = runner
        .handle()
        .rpc()
        .call::<Value, _>(method, &args)
        .await
        .with_context(|| format!("{}.{method} failed", runner.id()))?;
    print_json(&result.unwrap_or(Value::Null))
}

async fn cmd_content(host: &Host, file: &Path, content_id: &str) -> Result<()> {
    let runner = load(host, file).await?;
    let Some(source) = runner.as_source() else {
        bail!("runner `{}` is a {} runner, not a content source", runner.id(), runner.environment());
    };
    let content = source.get_content(content_id).await?;
    print_json(&content)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load(host: &Host, file: &Path) -> Result<std::sync::Arc<Runner>> {
    let runner = host
        .loader
        .load_file(file)
        .await
        .with_context(|| format!("failed to load {}", file.display()))?;
    Ok(host.registry.publish(runner)?)
}

/// JSON when it parses, otherwise the raw text as a string.
fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize the global tracing subscriber.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_as_json_or_text() {
        assert_eq!(parse_arg("42"), json!(42));
        assert_eq!(parse_arg(r#"{"a":[1]}"#), json!({ "a": [1] }));
        assert_eq!(parse_arg("\"quoted\""), json!("quoted"));
        assert_eq!(parse_arg("one piece"), json!("one piece"));
    }
}
