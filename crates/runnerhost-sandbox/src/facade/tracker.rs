use std::ops::Deref;

use serde_json::Value;

use super::RunnerHandle;
use crate::error::Result;
use crate::intents::Capability;
use crate::model::{Content, DirectoryConfig, DirectoryRequest, Highlight, PagedResult, TrackItem};

/// A runner that tracks reading progress with an external service.
#[derive(Clone)]
pub struct ContentTracker {
    handle: RunnerHandle,
}

impl ContentTracker {
    pub(crate) fn new(handle: RunnerHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &RunnerHandle {
        &self.handle
    }

    pub async fn get_track_item(&self, id: &str) -> Result<TrackItem> {
        self.rpc().call_required("getTrackItem", &(id,)).await
    }

    pub async fn did_update_last_read_chapter(&self, id: &str, progress: &Value) -> Result<()> {
        self.rpc()
            .call_void("didUpdateLastReadChapter", &(id, progress))
            .await
    }

    /// Match local titles against the tracker's catalogue.
    pub async fn get_results_for_titles(&self, titles: &[String]) -> Result<Vec<Highlight>> {
        Ok(self
            .rpc()
            .call("getResultsForTitles", &(titles,))
            .await?
            .unwrap_or_default())
    }

    pub async fn did_submit_entry_form(&self, id: &str, form: &Value) -> Result<()> {
        self.rpc()
            .call_void("didSubmitEntryForm", &(id, form))
            .await
    }

    pub async fn begin_tracking(&self, ids: &[String]) -> Result<()> {
        self.require(Capability::TrackingLifecycle, "beginTracking")?;
        self.rpc().call_void("beginTracking", &(ids,)).await
    }

    pub async fn stop_tracking(&self, ids: &[String]) -> Result<()> {
        self.require(Capability::TrackingLifecycle, "stopTracking")?;
        self.rpc().call_void("stopTracking", &(ids,)).await
    }

    pub async fn get_directory(&self, request: &DirectoryRequest) -> Result<Option<PagedResult<Highlight>>> {
        self.require(Capability::DirectoryProvider, "getDirectory")?;
        self.rpc().call("getDirectory", &(request,)).await
    }

    pub async fn get_directory_config(&self, key: Option<&str>) -> Result<Option<DirectoryConfig>> {
        self.require(Capability::DirectoryProvider, "getDirectoryConfig")?;
        self.rpc().call("getDirectoryConfig", &(key,)).await
    }

    pub async fn get_full_information(&self, id: &str) -> Result<Option<Content>> {
        self.require(Capability::FullInformationProvider, "getFullInformation")?;
        self.rpc().call("getFullInformation", &(id,)).await
    }
}

impl Deref for ContentTracker {
    type Target = RunnerHandle;

    fn deref(&self) -> &RunnerHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use crate::facade::test_support;
    use crate::testing::RecordingBackend;
    use serde_json::json;

    fn tracker_backend() -> RecordingBackend {
        RecordingBackend::new("test")
            .with_response("getTrackItem", json!({ "id": "7", "title": "Tracked" }))
            .with_method("didUpdateLastReadChapter")
            .with_method("getResultsForTitles")
            .with_method("didSubmitEntryForm")
    }

    #[tokio::test]
    async fn required_calls_reach_guest() {
        let (handle, backend) = test_support::handle(tracker_backend()).await;
        let tracker = ContentTracker::new(handle);
        assert_eq!(tracker.get_track_item("7").await.unwrap().title, "Tracked");
        tracker
            .did_update_last_read_chapter("7", &json!({ "chapter": 3 }))
            .await
            .unwrap();
        assert!(tracker.get_results_for_titles(&["A".into()]).await.unwrap().is_empty());
        assert_eq!(backend.calls_to("didUpdateLastReadChapter"), 1);
    }

    #[tokio::test]
    async fn lifecycle_needs_both_methods() {
        let (handle, backend) = test_support::handle(tracker_backend().with_method("beginTracking")).await;
        let tracker = ContentTracker::new(handle);
        let err = tracker.begin_tracking(&["7".into()]).await.unwrap_err();
        assert!(matches!(err, SandboxError::MethodNotImplemented { .. }));
        assert_eq!(backend.calls_to("beginTracking"), 0);
    }
}
