//! # runnerhost-sandbox
//!
//! The runner bridge: hosts untrusted runner scripts in isolated script
//! sandboxes and gives the rest of the application typed, role-shaped
//! access to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  RunnerRegistry / RunnerLoader                       │
//! ├──────────────────────────────────────────────────────┤
//! │  Facades: ContentSource · ContentTracker · Plugin    │
//! │  Classifier (environment + intents)                  │
//! ├──────────────────────────────────────────────────────┤
//! │  RpcChannel (host → guest)                           │
//! │  Reverse channels: store · network · log (guest →)   │
//! ├──────────────────────────────────────────────────────┤
//! │  SandboxBackend: in-process │ isolated (post-msg)    │
//! │  Codec (JSON) · Error translator                     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use runnerhost_sandbox::{HostServices, ReqwestClient, RunnerLoader, SandboxConfig};
//!
//! let config = SandboxConfig::default();
//! let http = Arc::new(ReqwestClient::new(&config)?);
//! let loader = RunnerLoader::new(config, HostServices::ephemeral("host", http));
//! let runner = loader.load_file("runners/demo.js".as_ref()).await?;
//! if let Some(source) = runner.as_source() {
//!     let content = source.get_content("42").await?;
//! }
//! ```

pub mod backend;
pub mod classify;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod handlers;
pub mod http;
pub mod intents;
pub mod loader;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod rpc;
pub mod runner;
pub mod testing;
pub mod translate;

mod js;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{BackendKind, BootScripts, SandboxBackend};
pub use classify::{Classification, RunnerEnvironment};
pub use config::SandboxConfig;
pub use error::{GuestFault, Result, SandboxError};
pub use facade::{ContentSource, ContentTracker, PluginRunner, Runner, RunnerHandle};
pub use handlers::{HostServices, ReverseChannel};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use intents::{AuthenticationMethod, Capability, RunnerIntents};
pub use loader::RunnerLoader;
pub use persistence::{EncryptedStore, KeyValueStore, MemoryStore};
pub use registry::RunnerRegistry;
pub use rpc::RpcChannel;
pub use runner::RunnerInfo;
