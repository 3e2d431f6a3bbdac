use std::ops::Deref;

use serde_json::Value;

use super::RunnerHandle;
use crate::error::Result;
use crate::model::PluginAction;

/// A general-purpose runner exposing named actions.
#[derive(Clone)]
pub struct PluginRunner {
    handle: RunnerHandle,
}

impl PluginRunner {
    pub(crate) fn new(handle: RunnerHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &RunnerHandle {
        &self.handle
    }

    pub async fn get_plugin_actions(&self) -> Result<Vec<PluginAction>> {
        Ok(self
            .rpc()
            .call("getPluginActions", &())
            .await?
            .unwrap_or_default())
    }

    pub async fn run_plugin_action(&self, action_id: &str, input: Option<&Value>) -> Result<Option<Value>> {
        self.rpc()
            .call("runPluginAction", &(action_id, input))
            .await
    }
}

impl Deref for PluginRunner {
    type Target = RunnerHandle;

    fn deref(&self) -> &RunnerHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::test_support;
    use crate::testing::RecordingBackend;
    use serde_json::json;

    #[tokio::test]
    async fn actions_and_run() {
        let (handle, backend) = test_support::handle(
            RecordingBackend::new("test")
                .with_response("getPluginActions", json!([{ "id": "clean", "title": "Clean cache" }]))
                .with_response("runPluginAction", json!({ "removed": 3 })),
        )
        .await;
        let plugin = PluginRunner::new(handle);
        let actions = plugin.get_plugin_actions().await.unwrap();
        assert_eq!(actions[0].id, "clean");

        let result = plugin.run_plugin_action("clean", None).await.unwrap();
        assert_eq!(result, Some(json!({ "removed": 3 })));
        assert_eq!(backend.calls()[1].1, vec![json!("clean"), Value::Null]);
    }
}
