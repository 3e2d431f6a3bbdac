//! CLI argument definitions for RunnerHost.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runnerhost_sandbox::BackendKind;

/// RunnerHost -- load and drive sandboxed runner scripts.
#[derive(Parser)]
#[command(
    name = "runnerhost",
    version,
    about = "RunnerHost -- sandboxed content runners",
    long_about = "Boots runner scripts inside a script sandbox, classifies what they can do \
                  and calls into them through typed facades."
)]
pub struct Cli {
    /// Path to the host config file. Defaults to `runnerhost.toml` when present.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Sandbox backend, overriding the config file.
    #[arg(long, short, global = true, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a runner and print its identity, environment and capabilities.
    Inspect {
        /// Runner script; its file stem is the runner id.
        file: PathBuf,
    },

    /// List runners known to the host.
    List {
        /// Load every script in the runners directory first.
        #[arg(long, short)]
        scan: bool,
    },

    /// Call a runner method with JSON arguments and print the result.
    Call {
        file: PathBuf,
        method: String,
        /// Arguments, each parsed as JSON; anything that is not JSON is
        /// passed as a string.
        args: Vec<String>,
    },

    /// Fetch one content item from a source runner.
    Content {
        file: PathBuf,
        content_id: String,
    },
}

fn parse_backend(text: &str) -> Result<BackendKind, String> {
    BackendKind::parse(text).ok_or_else(|| format!("unknown backend `{text}` (expected in_process or isolated)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_collects_trailing_args() {
        let cli = Cli::parse_from(["runnerhost", "call", "demo.js", "getContent", "42", r#"{"a":1}"#]);
        match cli.command {
            Commands::Call { file, method, args } => {
                assert_eq!(file, PathBuf::from("demo.js"));
                assert_eq!(method, "getContent");
                assert_eq!(args, vec!["42".to_string(), r#"{"a":1}"#.to_string()]);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn backend_flag_is_global() {
        let cli = Cli::parse_from(["runnerhost", "list", "--backend", "isolated"]);
        assert_eq!(cli.backend, Some(BackendKind::Isolated));
        assert!(Cli::try_parse_from(["runnerhost", "--backend", "wasm", "list"]).is_err());
    }
}
