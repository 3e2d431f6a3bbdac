//! Role facades over a loaded runner.
//!
//! A [`RunnerHandle`] bundles the sandbox with what was learned at load
//! time. The role facades ([`ContentSource`], [`ContentTracker`],
//! [`PluginRunner`]) check intents before every optional call, so a
//! capability known to be absent fails fast with `MethodNotImplemented`
//! and no call reaches the guest.

mod plugin;
mod source;
mod tracker;

pub use plugin::PluginRunner;
pub use source::ContentSource;
pub use tracker::ContentTracker;

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{BackendKind, SandboxBackend};
use crate::classify::{Classification, RunnerEnvironment};
use crate::error::{Result, SandboxError};
use crate::intents::{AuthenticationMethod, Capability, RunnerIntents};
use crate::model::{Property, User};
use crate::rpc::RpcChannel;
use crate::runner::RunnerInfo;

/// A bootstrapped, classified runner.
#[derive(Clone)]
pub struct RunnerHandle {
    rpc: RpcChannel,
    info: RunnerInfo,
    environment: RunnerEnvironment,
    intents: RunnerIntents,
}

impl RunnerHandle {
    pub fn new(backend: Arc<dyn SandboxBackend>, info: RunnerInfo, classification: Classification) -> Self {
        Self {
            rpc: RpcChannel::new(backend),
            info,
            environment: classification.environment,
            intents: classification.intents,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &RunnerInfo {
        &self.info
    }

    pub fn environment(&self) -> RunnerEnvironment {
        self.environment
    }

    pub fn intents(&self) -> &RunnerIntents {
        &self.intents
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.rpc.backend().kind()
    }

    pub fn rpc(&self) -> &RpcChannel {
        &self.rpc
    }

    /// Fail fast unless the runner declared `capability`.
    pub fn require(&self, capability: Capability, method: &str) -> Result<()> {
        if self.intents.supports(capability) {
            Ok(())
        } else {
            Err(SandboxError::MethodNotImplemented {
                method: method.to_string(),
                capability: capability.to_string(),
            })
        }
    }

    fn require_auth(&self, method: AuthenticationMethod, name: &str) -> Result<()> {
        self.require(Capability::Authenticatable, name)?;
        if self.intents.authentication_method == method {
            Ok(())
        } else {
            Err(SandboxError::MethodNotImplemented {
                method: name.to_string(),
                capability: format!("{}:{}", Capability::Authenticatable, method.as_str()),
            })
        }
    }

    pub async fn shutdown(&self) {
        self.rpc.backend().shutdown().await;
    }

    // Operations shared by sources and trackers.

    pub async fn get_preference_menu(&self) -> Result<Option<Value>> {
        self.require(Capability::PreferenceMenuBuilder, "getPreferenceMenu")?;
        self.rpc.call("getPreferenceMenu", &()).await
    }

    pub async fn get_authenticated_user(&self) -> Result<Option<User>> {
        self.require(Capability::Authenticatable, "getAuthenticatedUser")?;
        self.rpc.call("getAuthenticatedUser", &()).await
    }

    pub async fn handle_basic_auth(&self, identifier: &str, password: &str) -> Result<()> {
        self.require_auth(AuthenticationMethod::Basic, "handleBasicAuth")?;
        self.rpc
            .call::<Value, _>("handleBasicAuth", &(identifier, password))
            .await
            .map(drop)
    }

    pub async fn get_web_auth_request_url(&self) -> Result<Option<Value>> {
        self.require_auth(AuthenticationMethod::Webview, "getWebAuthRequestURL")?;
        self.rpc.call("getWebAuthRequestURL", &()).await
    }

    pub async fn handle_user_sign_out(&self) -> Result<()> {
        self.require(Capability::Authenticatable, "handleUserSignOut")?;
        self.rpc.call_void("handleUserSignOut", &()).await
    }

    pub async fn get_tags(&self) -> Result<Vec<Property>> {
        self.require(Capability::HasTagsView, "getTags")?;
        Ok(self.rpc.call("getTags", &()).await?.unwrap_or_default())
    }
}

/// A published runner in its role.
#[derive(Clone)]
pub enum Runner {
    Source(ContentSource),
    Tracker(ContentTracker),
    Plugin(PluginRunner),
}

impl Runner {
    pub fn from_handle(handle: RunnerHandle) -> Result<Self> {
        match handle.environment() {
            RunnerEnvironment::Source => Ok(Self::Source(ContentSource::new(handle))),
            RunnerEnvironment::Tracker => Ok(Self::Tracker(ContentTracker::new(handle))),
            RunnerEnvironment::Plugin => Ok(Self::Plugin(PluginRunner::new(handle))),
            RunnerEnvironment::Unknown => Err(SandboxError::ClassificationFailed {
                runner_id: handle.id().to_string(),
            }),
        }
    }

    pub fn handle(&self) -> &RunnerHandle {
        match self {
            Self::Source(source) => source.handle(),
            Self::Tracker(tracker) => tracker.handle(),
            Self::Plugin(plugin) => plugin.handle(),
        }
    }

    pub fn id(&self) -> &str {
        self.handle().id()
    }

    pub fn environment(&self) -> RunnerEnvironment {
        self.handle().environment()
    }

    pub fn as_source(&self) -> Option<&ContentSource> {
        match self {
            Self::Source(source) => Some(source),
            _ => None,
        }
    }

    pub fn as_tracker(&self) -> Option<&ContentTracker> {
        match self {
            Self::Tracker(tracker) => Some(tracker),
            _ => None,
        }
    }

    pub fn as_plugin(&self) -> Option<&PluginRunner> {
        match self {
            Self::Plugin(plugin) => Some(plugin),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::RunnerHandle;
    use crate::backend::SandboxBackend;
    use crate::classify;
    use crate::runner::RunnerInfo;
    use crate::testing::RecordingBackend;

    /// Classify the recording backend's methods and wrap it in a handle.
    pub(crate) async fn handle(backend: RecordingBackend) -> (RunnerHandle, Arc<RecordingBackend>) {
        let backend = Arc::new(backend);
        let methods: HashSet<String> = backend.method_names().await.unwrap().into_iter().collect();
        let classification = classify::classify("test", &methods).unwrap();
        let info = RunnerInfo {
            id: "test".into(),
            name: "Test".into(),
            version: 1.0,
            min_supported_app_version: None,
            thumbnail: None,
            website: None,
            supported_languages: Vec::new(),
        };
        (RunnerHandle::new(backend.clone(), info, classification), backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use serde_json::json;

    #[tokio::test]
    async fn absent_preference_menu_never_reaches_guest() {
        let (handle, backend) = test_support::handle(RecordingBackend::new("test").with_method("getContent")).await;
        let err = handle.get_preference_menu().await.unwrap_err();
        assert!(matches!(err, SandboxError::MethodNotImplemented { .. }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn basic_auth_requires_basic_flow() {
        let (handle, backend) = test_support::handle(
            RecordingBackend::new("test")
                .with_method("getContent")
                .with_method("getAuthenticatedUser")
                .with_method("getWebAuthRequestURL"),
        ).await;
        let err = handle.handle_basic_auth("me", "pw").await.unwrap_err();
        assert!(matches!(err, SandboxError::MethodNotImplemented { .. }));
        assert_eq!(backend.calls_to("handleBasicAuth"), 0);
    }

    #[tokio::test]
    async fn authenticated_user_decodes() {
        let (handle, _) = test_support::handle(
            RecordingBackend::new("test")
                .with_method("getContent")
                .with_method("handleBasicAuth")
                .with_response("getAuthenticatedUser", json!({ "id": "1", "username": "reader" })),
        ).await;
        let user = handle.get_authenticated_user().await.unwrap().unwrap();
        assert_eq!(user.username, "reader");
        handle.handle_basic_auth("me", "pw").await.unwrap();
    }

    #[tokio::test]
    async fn runner_role_follows_environment() {
        let (handle, _) = test_support::handle(
            RecordingBackend::new("test")
                .with_method("getPluginActions")
                .with_method("runPluginAction"),
        ).await;
        let runner = Runner::from_handle(handle).unwrap();
        assert!(runner.as_plugin().is_some());
        assert!(runner.as_source().is_none());
        assert_eq!(runner.environment(), RunnerEnvironment::Plugin);
    }
}
