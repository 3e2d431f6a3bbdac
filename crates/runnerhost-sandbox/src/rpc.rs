//! Host → guest calls in their three shapes.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::backend::SandboxBackend;
use crate::codec;
use crate::error::{Result, SandboxError};

/// Typed call surface over one sandbox.
///
/// Arguments are passed as a serializable tuple: `()` for none, `("42",)`
/// for one, `(id, &progress)` for two.
#[derive(Clone)]
pub struct RpcChannel {
    backend: Arc<dyn SandboxBackend>,
}

impl RpcChannel {
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn SandboxBackend> {
        &self.backend
    }

    /// Optional hook: an absent method is a silent success.
    #[instrument(skip(self, args), fields(runner = %self.backend.runner_id()))]
    pub async fn call_void<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<()> {
        if !self.backend.has_method(method).await? {
            debug!("optional method absent; skipping");
            return Ok(());
        }
        let args = codec::encode_args(args)?;
        match self.backend.invoke(method, args).await {
            Ok(_) => Ok(()),
            // Removed between the check and the call.
            Err(SandboxError::MethodNotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// `None` when the guest answered `null` or `undefined`.
    #[instrument(skip(self, args), fields(runner = %self.backend.runner_id()))]
    pub async fn call<T, A>(&self, method: &str, args: &A) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        let args = codec::encode_args(args)?;
        match self.backend.invoke(method, args).await? {
            Some(value) => codec::decode_value(value).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`call`](Self::call), but no value is itself a decode failure.
    pub async fn call_required<T, A>(&self, method: &str, args: &A) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        self.call(method, args)
            .await?
            .ok_or_else(|| SandboxError::DecodeFailed {
                path: "$".into(),
                reason: format!("`{method}` returned no value"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use serde_json::{Value, json};

    fn channel(backend: RecordingBackend) -> (RpcChannel, Arc<RecordingBackend>) {
        let backend = Arc::new(backend);
        (RpcChannel::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn void_call_on_absent_method_is_a_no_op() {
        let (rpc, backend) = channel(RecordingBackend::new("r"));
        rpc.call_void("onChapterRead", &("c", "1")).await.unwrap();
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn void_call_passes_arguments() {
        let (rpc, backend) = channel(RecordingBackend::new("r").with_method("onChapterRead"));
        rpc.call_void("onChapterRead", &("c", "1")).await.unwrap();
        assert_eq!(backend.calls(), vec![("onChapterRead".to_string(), vec![json!("c"), json!("1")])]);
    }

    #[tokio::test]
    async fn decoded_call_on_absent_method_fails() {
        let (rpc, _) = channel(RecordingBackend::new("r"));
        let err = rpc.call::<Value, _>("getContent", &("42",)).await.unwrap_err();
        assert!(matches!(err, SandboxError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn null_is_no_value_not_a_decode_error() {
        let (rpc, _) = channel(RecordingBackend::new("r").with_response("getContent", Value::Null));
        let value: Option<Vec<String>> = rpc.call("getContent", &("42",)).await.unwrap();
        assert_eq!(value, None);

        let err = rpc
            .call_required::<Vec<String>, _>("getContent", &("42",))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::DecodeFailed { .. }));
    }

    #[tokio::test]
    async fn shape_mismatch_is_decode_failure() {
        let (rpc, _) = channel(RecordingBackend::new("r").with_response("count", json!("three")));
        let err = rpc.call::<u32, _>("count", &()).await.unwrap_err();
        assert!(matches!(err, SandboxError::DecodeFailed { path, .. } if path == "$"));
    }
}
